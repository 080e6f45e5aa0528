//! ByteTrack 算法实现
//! ByteTrack: Simple and effective multi-object tracking
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU)
//! 3. 低分框救援丢失的轨迹
//! 4. 纯运动模型,无需外观特征

use anyhow::{ensure, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::kalman::{KalmanBoxFilter, KalmanParams};
use super::{TrackedObject, Tracker};
use crate::geometry::{compute_iou, BoxCoords};

/// ByteTrack 参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteTrackConfig {
    /// 最大允许丢失帧数
    pub max_lost_frames: u32,
    /// 高分检测阈值
    pub high_score_threshold: f32,
    /// 低分检测阈值 (用于救援)
    pub low_score_threshold: f32,
    /// 高分匹配 IOU 阈值
    pub high_iou_threshold: f32,
    /// 低分匹配 IOU 阈值
    pub low_iou_threshold: f32,
    /// 卡尔曼过程噪声
    pub kalman_process_noise: f32,
    /// 卡尔曼观测噪声 (越小越信任检测结果)
    pub kalman_obs_noise: f32,
    pub kalman_velocity_decay: f32,
    /// 静止判定阈值(像素)
    pub kalman_stationary_threshold: f32,
}

impl Default for ByteTrackConfig {
    fn default() -> Self {
        Self {
            max_lost_frames: 60, // 60帧(约2秒)
            high_score_threshold: 0.4,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.4,
            low_iou_threshold: 0.3,
            kalman_process_noise: 0.1,
            kalman_obs_noise: 0.5,
            kalman_velocity_decay: 0.95,
            kalman_stationary_threshold: 2.0,
        }
    }
}

impl ByteTrackConfig {
    fn kalman_params(&self) -> KalmanParams {
        KalmanParams {
            process_noise: self.kalman_process_noise,
            observation_noise: self.kalman_obs_noise,
            velocity_decay: self.kalman_velocity_decay,
            stationary_threshold: self.kalman_stationary_threshold,
        }
    }
}

/// 单条轨迹
#[derive(Clone)]
struct Track {
    id: u32,
    bbox: BoxCoords,
    kalman: KalmanBoxFilter,
    frames_lost: u32,
    score: f32,
}

impl Track {
    fn new(id: u32, bbox: BoxCoords, score: f32, params: KalmanParams) -> Self {
        let kalman = KalmanBoxFilter::new(&bbox, params);
        Self {
            id,
            bbox: kalman.state_box(),
            kalman,
            frames_lost: 0,
            score,
        }
    }

    fn predict(&mut self) {
        self.kalman.predict();
        self.bbox = self.kalman.state_box();
    }

    fn update(&mut self, bbox: &BoxCoords, score: f32) {
        self.kalman.update(bbox);
        self.bbox = self.kalman.state_box();
        self.frames_lost = 0;
        self.score = score;
    }
}

/// 一行跟踪器输入
#[derive(Clone, Copy)]
struct Candidate {
    index: usize,
    bbox: BoxCoords,
    score: f32,
}

/// ByteTrack 追踪器
pub struct ByteTracker {
    tracks: Vec<Track>,
    next_id: u32,
    config: ByteTrackConfig,
}

impl ByteTracker {
    pub fn new(config: ByteTrackConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &ByteTrackConfig {
        &self.config
    }

    /// IOU 贪心匹配, 返回 (候选下标, 轨迹下标)
    fn associate(
        &self,
        candidates: &[Candidate],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        if candidates.is_empty() || track_indices.is_empty() {
            return Vec::new();
        }

        let mut pairs = Vec::new();
        for (ci, cand) in candidates.iter().enumerate() {
            for (ti, &track_idx) in track_indices.iter().enumerate() {
                let predicted = self.tracks[track_idx].kalman.predicted_box();
                let iou = compute_iou(&cand.bbox, &predicted);
                if iou >= iou_threshold {
                    pairs.push((1.0 - iou, ci, ti));
                }
            }
        }

        // 按代价排序
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut used_cand = vec![false; candidates.len()];
        let mut used_track = vec![false; track_indices.len()];
        let mut assignments = Vec::new();
        for (_, ci, ti) in pairs {
            if !used_cand[ci] && !used_track[ti] {
                used_cand[ci] = true;
                used_track[ti] = true;
                assignments.push((ci, track_indices[ti]));
            }
        }
        assignments
    }

    /// 获取跟踪统计信息
    pub fn stats(&self) -> String {
        format!(
            "跟踪: {} 个 | 总ID: {}",
            self.tracks.len(),
            self.next_id - 1
        )
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(ByteTrackConfig::default())
    }
}

impl Tracker for ByteTracker {
    fn update(&mut self, detections: ArrayView2<f32>) -> Result<Vec<TrackedObject>> {
        ensure!(
            detections.ncols() == 5 || detections.nrows() == 0,
            "跟踪器输入应为 N x 5, 实际为 {:?}",
            detections.shape()
        );

        // 1. 所有轨迹先预测
        for track in &mut self.tracks {
            track.predict();
        }

        // 2. 分离高低分检测框
        let mut high = Vec::new();
        let mut low = Vec::new();
        for (index, row) in detections.outer_iter().enumerate() {
            let cand = Candidate {
                index,
                bbox: [row[0], row[1], row[2], row[3]],
                score: row[4],
            };
            if cand.score >= self.config.high_score_threshold {
                high.push(cand);
            } else if cand.score >= self.config.low_score_threshold {
                low.push(cand);
            }
        }

        let mut matched_track = vec![false; self.tracks.len()];

        // 3. 第一轮: 高分检测 + 所有轨迹
        let all: Vec<usize> = (0..self.tracks.len()).collect();
        let mut matched_high = vec![false; high.len()];
        for (ci, ti) in self.associate(&high, &all, self.config.high_iou_threshold) {
            matched_high[ci] = true;
            matched_track[ti] = true;
            self.tracks[ti].update(&high[ci].bbox, high[ci].score);
        }

        // 4. 第二轮: 低分检测 + 未匹配轨迹 (救援)
        let unmatched: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| !matched_track[i])
            .collect();
        for (ci, ti) in self.associate(&low, &unmatched, self.config.low_iou_threshold) {
            matched_track[ti] = true;
            self.tracks[ti].update(&low[ci].bbox, low[ci].score);
        }

        // 5. 未匹配轨迹 → 标记丢失
        for (track, matched) in self.tracks.iter_mut().zip(&matched_track) {
            if !matched {
                track.frames_lost += 1;
            }
        }

        // 6. 未匹配的高分检测 → 新建轨迹
        let params = self.config.kalman_params();
        for (cand, _) in high.iter().zip(&matched_high).filter(|(_, m)| !**m) {
            debug!("新轨迹: id={} det={}", self.next_id, cand.index);
            self.tracks
                .push(Track::new(self.next_id, cand.bbox, cand.score, params));
            self.next_id += 1;
        }

        // 7. 删除丢失太久的轨迹
        let max_lost = self.config.max_lost_frames;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        // 只输出本帧有观测的轨迹
        Ok(self
            .tracks
            .iter()
            .filter(|t| t.frames_lost == 0)
            .map(|t| TrackedObject {
                track_id: t.id,
                bbox: t.bbox,
                score: t.score,
            })
            .collect())
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
