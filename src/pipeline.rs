//! 帧处理管线 (Frame pipeline)
//!
//! 每帧顺序:
//! 1. 检测筛选
//! 2. 无跟踪器: 直接输出检测结果
//! 3. 有跟踪器: 检测 → N x 5 输入 → 跟踪器更新
//! 4. 徘徊计数器进入下一帧
//! 5. 每条轨迹用 IOU 找回对应检测, 找不到则跳过
//! 6. 徘徊 / 测速, 收集活跃ID
//! 7. 两个管理器按活跃ID清理状态
//! 8. 绘制
//!
//! 跨帧状态严格依赖时间顺序, 同一视频流必须串行调用。

use std::collections::HashSet;
use std::time::Instant;

use anyhow::{Context, Result};
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::{LoiteringTracker, SpeedEstimator};
use crate::config::PipelineConfig;
use crate::detection::{find_best_match, DetectionSelector, DetectionSet};
use crate::geometry::{truncate_box, BoxCoords};
use crate::render::Annotator;
use crate::tracking::Tracker;

/// 徘徊检测关注的类别名
pub const PERSON_LABEL: &str = "person";

/// 单个待绘制目标
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Annotation {
    pub bbox: BoxCoords,
    pub class_id: usize,
    pub label: String,
    /// 置信度 [0, 1]
    pub score: f32,
    pub track_id: Option<u32>,
    pub loitering: bool,
    /// 平滑后的速度
    pub speed_kmh: Option<f32>,
}

impl Annotation {
    /// 框上方文字: 类别、置信度、速度
    pub fn top_text(&self) -> String {
        let percent = self.score * 100.0;
        match self.speed_kmh {
            Some(speed) => format!("{}: {:.1}% {:.1}km/h", self.label, percent, speed),
            None => format!("{}: {:.1}%", self.label, percent),
        }
    }

    /// 框下方文字: 跟踪ID
    pub fn bottom_text(&self) -> Option<String> {
        self.track_id.map(|id| format!("ID {}", id))
    }
}

/// 一帧的处理结果
#[derive(Clone, Debug, Default, Serialize)]
pub struct FrameAnnotations {
    /// 管线处理的帧序号, 从 0 开始
    pub frame_index: u64,
    /// 本帧筛选后的检测
    pub detections: DetectionSet,
    pub items: Vec<Annotation>,
}

pub struct FramePipeline {
    config: PipelineConfig,
    labels: Vec<String>,
    selector: DetectionSelector,
    tracker: Option<Box<dyn Tracker>>,
    loitering: LoiteringTracker,
    speed: SpeedEstimator,
    annotator: Annotator,

    /// person 在词表中的索引
    person_class: Option<usize>,
    /// 构建时根据词表决定, 运行期间不变
    loitering_enabled: bool,

    frames: u64,
    last_report: Instant,
}

impl FramePipeline {
    pub fn new(
        config: PipelineConfig,
        labels: Vec<String>,
        tracker: Option<Box<dyn Tracker>>,
    ) -> Result<Self> {
        config.validate().context("管线配置无效")?;

        let selector = DetectionSelector::new(
            &labels,
            &config.target_labels,
            config.visualization_params.score_thres,
            config.visualization_params.max_boxes_to_draw,
        );
        if selector.target_classes().is_empty() {
            warn!("⚠️ 目标类别均不在标签词表中, 不会输出任何检测");
        }

        let person_class = labels.iter().position(|l| l == PERSON_LABEL);
        let mut loitering_enabled = config.loitering_detection;
        if config.enable_person_only && person_class.is_none() {
            if loitering_enabled {
                warn!("⚠️ 标签词表中没有 {:?}, 徘徊检测已禁用", PERSON_LABEL);
            }
            loitering_enabled = false;
        }

        let loitering = LoiteringTracker::new(config.loitering_threshold, config.fps);
        let speed = SpeedEstimator::with_smoothing(
            config.pixel_distance,
            config.fps,
            config.speed_smoothing_window,
            config.speed_min_samples,
        );

        info!(
            "🎯 管线就绪: 目标类别 {:?} | 跟踪器: {} | 徘徊检测: {} | 测速: {}",
            selector.target_classes(),
            if tracker.is_some() { "启用" } else { "禁用" },
            loitering_enabled,
            config.speed_estimation
        );

        Ok(Self {
            config,
            labels,
            selector,
            tracker,
            loitering,
            speed,
            annotator: Annotator::new(),
            person_class,
            loitering_enabled,
            frames: 0,
            last_report: Instant::now(),
        })
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn loitering(&self) -> &LoiteringTracker {
        &self.loitering
    }

    pub fn speed(&self) -> &SpeedEstimator {
        &self.speed
    }

    pub fn loitering_enabled(&self) -> bool {
        self.loitering_enabled
    }

    pub fn has_tracker(&self) -> bool {
        self.tracker.is_some()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// 处理一帧并绘制标注
    pub fn annotate(&mut self, mut frame: RgbImage, raw: &[Vec<Vec<f32>>]) -> Result<RgbImage> {
        let annotations = self.process(frame.width(), frame.height(), raw)?;
        self.render(&mut frame, &annotations);
        Ok(frame)
    }

    /// 将已有的处理结果绘制到帧上
    pub fn render(&self, frame: &mut RgbImage, annotations: &FrameAnnotations) {
        self.annotator.draw(frame, annotations);
    }

    /// 处理一帧, 只产出标注数据
    pub fn process(
        &mut self,
        img_width: u32,
        img_height: u32,
        raw: &[Vec<Vec<f32>>],
    ) -> Result<FrameAnnotations> {
        let frame_index = self.frames;
        let detections = self.selector.select(raw, img_width, img_height);
        debug!("帧 {}: 筛选后 {} 个检测", frame_index, detections.len());

        let items = if self.tracker.is_some() {
            self.process_tracks(&detections)?
        } else {
            detections
                .iter()
                .map(|det| Annotation {
                    bbox: det.bbox,
                    class_id: det.class_id,
                    label: self.label_of(det.class_id),
                    score: det.score,
                    track_id: None,
                    loitering: false,
                    speed_kmh: None,
                })
                .collect()
        };

        self.frames += 1;
        self.report(items.len());

        Ok(FrameAnnotations {
            frame_index,
            detections,
            items,
        })
    }

    fn process_tracks(&mut self, detections: &DetectionSet) -> Result<Vec<Annotation>> {
        let Some(tracker) = self.tracker.as_mut() else {
            return Ok(Vec::new());
        };
        let input = detections.to_tracker_input();
        let tracks = tracker.update(input.view()).context("跟踪器更新失败")?;

        self.loitering.advance_frame();

        let mut active = HashSet::new();
        let mut items = Vec::with_capacity(tracks.len());
        for track in &tracks {
            let Some(idx) = find_best_match(&track.bbox, detections.as_slice()) else {
                debug!("轨迹 {} 未匹配到检测, 跳过", track.track_id);
                continue;
            };
            let class_id = detections.as_slice()[idx].class_id;
            active.insert(track.track_id);

            let mut loitering = false;
            if self.loitering_enabled && self.is_loitering_candidate(class_id) {
                let was = self.loitering.is_loitering(track.track_id);
                self.loitering.observe(track.track_id);
                loitering = self.loitering.is_loitering(track.track_id);
                if loitering && !was {
                    info!(
                        "🚨 徘徊: track={} 已停留 {:.1}s",
                        track.track_id,
                        self.loitering.dwell_seconds(track.track_id).unwrap_or_default()
                    );
                }
            }

            let bbox = truncate_box(&track.bbox);
            let speed_kmh = if self.config.speed_estimation {
                self.speed
                    .estimate_speed(track.track_id, &bbox)
                    .and_then(|_| self.speed.get_smoothed_speed(track.track_id))
            } else {
                None
            };

            items.push(Annotation {
                bbox,
                class_id,
                label: self.label_of(class_id),
                score: track.score,
                track_id: Some(track.track_id),
                loitering,
                speed_kmh,
            });
        }

        let dropped = self.loitering.reconcile(&active) + self.speed.reconcile(&active);
        if dropped > 0 {
            debug!("清理离开的轨迹状态: {} 条", dropped);
        }

        Ok(items)
    }

    fn is_loitering_candidate(&self, class_id: usize) -> bool {
        !self.config.enable_person_only || self.person_class == Some(class_id)
    }

    fn label_of(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", class_id))
    }

    /// 每60帧打印一次统计
    fn report(&mut self, objects: usize) {
        if self.frames % 60 != 0 {
            return;
        }
        let elapsed = self.last_report.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 { 60.0 / elapsed } else { 0.0 };
        self.last_report = Instant::now();
        info!(
            "📊 已处理 {} 帧 | {:.1} fps | 本帧目标 {} | 徘徊状态 {} | 测速状态 {}",
            self.frames,
            fps,
            objects,
            self.loitering.len(),
            self.speed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::ByteTracker;

    fn labels() -> Vec<String> {
        ["person", "car", "dog"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_untracked_path_emits_detections() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default(), labels(), None).unwrap();
        let raw = vec![
            vec![vec![0.1, 0.1, 0.5, 0.5, 0.9]],
            vec![vec![0.5, 0.5, 0.9, 0.9, 0.6]],
            vec![vec![0.2, 0.2, 0.3, 0.3, 0.99]],
        ];
        let out = pipeline.process(640, 640, &raw).unwrap();

        assert_eq!(out.items.len(), 2);
        assert_eq!(out.items[0].label, "person");
        assert_eq!(out.items[1].label, "car");
        assert!(out.items.iter().all(|i| i.track_id.is_none()));
        assert_eq!(pipeline.loitering().current_frame(), 0);
    }

    #[test]
    fn test_person_only_without_person_label_disables_loitering() {
        let config = PipelineConfig {
            loitering_detection: true,
            enable_person_only: true,
            target_labels: vec!["car".to_string()],
            ..Default::default()
        };
        let pipeline =
            FramePipeline::new(config, vec!["car".to_string(), "bus".to_string()], None).unwrap();
        assert!(!pipeline.loitering_enabled());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.fps = -1.0;
        assert!(FramePipeline::new(config, labels(), None).is_err());
    }

    #[test]
    fn test_annotation_texts() {
        let mut a = Annotation {
            bbox: [0.0; 4],
            class_id: 0,
            label: "person".to_string(),
            score: 0.875,
            track_id: Some(4),
            loitering: false,
            speed_kmh: None,
        };
        assert_eq!(a.top_text(), "person: 87.5%");
        assert_eq!(a.bottom_text().as_deref(), Some("ID 4"));
        a.speed_kmh = Some(12.34);
        assert_eq!(a.top_text(), "person: 87.5% 12.3km/h");
    }

    #[test]
    fn test_tracked_path_advances_frame_counter() {
        let tracker: Box<dyn Tracker> = Box::new(ByteTracker::default());
        let mut pipeline =
            FramePipeline::new(PipelineConfig::default(), labels(), Some(tracker)).unwrap();
        let raw = vec![vec![vec![0.1, 0.1, 0.5, 0.5, 0.9]]];
        for _ in 0..3 {
            let out = pipeline.process(100, 100, &raw).unwrap();
            assert_eq!(out.items.len(), 1);
            assert_eq!(out.items[0].track_id, Some(1));
        }
        assert_eq!(pipeline.loitering().current_frame(), 3);
        assert_eq!(pipeline.frames_processed(), 3);
    }
}
