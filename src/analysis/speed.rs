//! 速度估计 (Speed estimation)
//!
//! 相邻两次观测的框中心位移 (像素) × 每像素实际距离 (米) ÷ 帧间隔 → m/s → km/h,
//! 然后对最近 N 个瞬时速度做滑动平均以抑制抖动。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::geometry::{box_center, BoxCoords};

/// m/s → km/h
pub const KMH_PER_MPS: f32 = 3.6;

/// 默认平滑窗口
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

/// 位置历史上限
const MAX_HISTORY: usize = 30;

/// 单个跟踪的测速状态
#[derive(Clone, Debug, Default)]
struct SpeedState {
    /// 历史中心点 (最新在尾部)
    positions: VecDeque<(f32, f32)>,

    /// 最近的瞬时速度 (km/h)
    speeds: VecDeque<f32>,

    /// 平滑速度
    smoothed: Option<f32>,
}

pub struct SpeedEstimator {
    /// 每像素对应的实际距离 (米)
    pixel_distance: f32,

    fps: f32,

    window: usize,

    /// 输出平滑速度所需的最少样本数
    min_samples: usize,

    states: HashMap<u32, SpeedState>,
}

impl SpeedEstimator {
    pub fn new(pixel_distance: f32, fps: f32) -> Self {
        Self::with_smoothing(pixel_distance, fps, DEFAULT_SMOOTHING_WINDOW, 1)
    }

    /// `window` 至少为 1, `min_samples` 被限制在 `1..=window`
    pub fn with_smoothing(pixel_distance: f32, fps: f32, window: usize, min_samples: usize) -> Self {
        let window = window.max(1);
        Self {
            pixel_distance,
            fps,
            window,
            min_samples: min_samples.clamp(1, window),
            states: HashMap::new(),
        }
    }

    /// 更新并返回瞬时速度 (km/h); 首次观测没有上一帧可比较, 返回 `None`
    pub fn estimate_speed(&mut self, track_id: u32, bbox: &BoxCoords) -> Option<f32> {
        let center = box_center(bbox);
        let (pixel_distance, fps) = (self.pixel_distance, self.fps);
        let (window, min_samples) = (self.window, self.min_samples);
        let state = self.states.entry(track_id).or_default();

        let speed = state.positions.back().map(|&(px, py)| {
            let dx = center.0 - px;
            let dy = center.1 - py;
            let meters = (dx * dx + dy * dy).sqrt() * pixel_distance;
            // 帧间隔 1/fps 秒
            meters * fps * KMH_PER_MPS
        });

        state.positions.push_back(center);
        if state.positions.len() > MAX_HISTORY {
            state.positions.pop_front();
        }

        if let Some(speed) = speed {
            state.speeds.push_back(speed);
            if state.speeds.len() > window {
                state.speeds.pop_front();
            }
            state.smoothed = if state.speeds.len() >= min_samples {
                Some(state.speeds.iter().sum::<f32>() / state.speeds.len() as f32)
            } else {
                None
            };
        }

        speed
    }

    /// 平滑速度 (km/h), 样本不足或ID未知时返回 `None`
    pub fn get_smoothed_speed(&self, track_id: u32) -> Option<f32> {
        self.states.get(&track_id).and_then(|s| s.smoothed)
    }

    /// 最近记录的中心点
    pub fn last_position(&self, track_id: u32) -> Option<(f32, f32)> {
        self.states
            .get(&track_id)
            .and_then(|s| s.positions.back().copied())
    }

    pub fn history_len(&self, track_id: u32) -> usize {
        self.states
            .get(&track_id)
            .map_or(0, |s| s.positions.len())
    }

    /// 清除不在活跃集合中的跟踪, 返回删除数量
    pub fn reconcile(&mut self, active: &HashSet<u32>) -> usize {
        let before = self.states.len();
        self.states.retain(|id, _| active.contains(id));
        before - self.states.len()
    }

    pub fn contains(&self, track_id: u32) -> bool {
        self.states.contains_key(&track_id)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
