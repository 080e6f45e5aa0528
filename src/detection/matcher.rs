//! 轨迹-检测关联 (Track Matcher)
//!
//! 跟踪器只输出几何信息与分数, 类别需要通过 IOU 从本帧检测结果中找回。

use super::types::Detection;
use crate::geometry::{compute_iou, BoxCoords};

/// 找到与跟踪框 IOU 最大的检测索引
///
/// 只在 IOU 严格大于当前最优时更新, 因此并列时取第一个; 最大 IOU 为 0 时返回 `None`。
pub fn find_best_match(track_box: &BoxCoords, detections: &[Detection]) -> Option<usize> {
    best_match_with_iou(track_box, detections).map(|(idx, _)| idx)
}

/// 同 [`find_best_match`], 附带匹配的 IOU
pub fn best_match_with_iou(track_box: &BoxCoords, detections: &[Detection]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    let mut best_iou = 0.0;

    for (idx, det) in detections.iter().enumerate() {
        let iou = compute_iou(track_box, &det.bbox);
        if iou > best_iou {
            best_iou = iou;
            best = Some((idx, iou));
        }
    }

    best
}
