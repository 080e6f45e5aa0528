//! 检测筛选器 (Detection Selector)
//! 职责: 原始模型输出 → 目标类别过滤 → 置信度过滤 → 按分数排序取 top-K

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::types::{Detection, DetectionSet};
use crate::geometry::{denormalize_box, letterbox_params};

/// 将目标类别名解析为类别索引
///
/// 词表中不存在的名称被忽略并告警。
pub fn resolve_target_classes(labels: &[String], target_labels: &[String]) -> BTreeSet<usize> {
    let classes: BTreeSet<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, label)| target_labels.contains(label))
        .map(|(idx, _)| idx)
        .collect();

    for target in target_labels {
        if !labels.contains(target) {
            warn!("⚠️ 目标类别 {:?} 不在标签词表中, 已忽略", target);
        }
    }

    classes
}

pub struct DetectionSelector {
    target_classes: BTreeSet<usize>,
    score_threshold: f32,
    max_boxes: usize,
}

impl DetectionSelector {
    pub fn new(
        labels: &[String],
        target_labels: &[String],
        score_threshold: f32,
        max_boxes: usize,
    ) -> Self {
        Self::with_classes(
            resolve_target_classes(labels, target_labels),
            score_threshold,
            max_boxes,
        )
    }

    pub fn with_classes(
        target_classes: BTreeSet<usize>,
        score_threshold: f32,
        max_boxes: usize,
    ) -> Self {
        Self {
            target_classes,
            score_threshold,
            max_boxes,
        }
    }

    pub fn target_classes(&self) -> &BTreeSet<usize> {
        &self.target_classes
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    pub fn max_boxes(&self) -> usize {
        self.max_boxes
    }

    /// 筛选一帧的检测结果
    ///
    /// 候选池按 "类别优先, 类内原始顺序" 插入, 随后稳定排序,
    /// 分数相同的检测保持先出现者在前。
    pub fn select(&self, raw: &[Vec<Vec<f32>>], img_width: u32, img_height: u32) -> DetectionSet {
        let (size, padding) = letterbox_params(img_height, img_width);

        let mut pool = Vec::new();
        for (class_id, class_dets) in raw.iter().enumerate() {
            if !self.target_classes.contains(&class_id) {
                continue;
            }
            for det in class_dets {
                if det.len() < 5 {
                    debug!("跳过格式错误的检测: class={} len={}", class_id, det.len());
                    continue;
                }
                let score = det[4];
                // NaN 不会通过比较
                if score >= self.score_threshold {
                    pool.push(Detection {
                        bbox: denormalize_box(&det[..4], size, padding, img_height, img_width),
                        class_id,
                        score,
                    });
                }
            }
        }

        // sort_by 为稳定排序
        pool.sort_by(|a, b| b.score.total_cmp(&a.score));
        pool.truncate(self.max_boxes);

        DetectionSet::from_sorted(pool)
    }
}
