//! 检测数据结构 (Detection data structures)

use ndarray::Array2;
use serde::Serialize;

use crate::geometry::BoxCoords;

/// 模型原始输出: 按类别索引, 每条为 `[c0, c1, c2, c3, score]` (归一化坐标)
pub type RawDetections = Vec<Vec<Vec<f32>>>;

/// 单个检测框 (已反归一化, 像素坐标)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoxCoords,
    pub class_id: usize,
    pub score: f32,
}

/// 过滤后的检测集合
///
/// 按置信度降序排列, 长度不超过 `max_boxes`, 所有条目都通过阈值且属于目标类别。
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    pub(crate) fn from_sorted(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Detection> {
        self.detections.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    pub fn boxes(&self) -> Vec<BoxCoords> {
        self.detections.iter().map(|d| d.bbox).collect()
    }

    pub fn class_ids(&self) -> Vec<usize> {
        self.detections.iter().map(|d| d.class_id).collect()
    }

    pub fn scores(&self) -> Vec<f32> {
        self.detections.iter().map(|d| d.score).collect()
    }

    /// 转换为跟踪器输入: N x 5, 每行 `[box(4), score]`
    pub fn to_tracker_input(&self) -> Array2<f32> {
        let mut rows = Array2::<f32>::zeros((self.detections.len(), 5));
        for (mut row, det) in rows.outer_iter_mut().zip(&self.detections) {
            row[0] = det.bbox[0];
            row[1] = det.bbox[1];
            row[2] = det.bbox[2];
            row[3] = det.bbox[3];
            row[4] = det.score;
        }
        rows
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}
