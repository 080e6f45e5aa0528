//! 多目标跟踪公共组件
//! Common components for multi-object tracking

pub mod bytetrack;
pub mod kalman;

use anyhow::Result;
use ndarray::ArrayView2;
use serde::Serialize;

use crate::geometry::BoxCoords;

pub use bytetrack::{ByteTrackConfig, ByteTracker};
pub use kalman::{KalmanBoxFilter, KalmanParams};

/// 跟踪对象 (统一的跟踪结果)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackedObject {
    /// 唯一跟踪ID
    pub track_id: u32,

    /// 当前边界框, 坐标顺序与输入检测相同
    pub bbox: BoxCoords,

    /// 最近一次匹配的检测置信度
    pub score: f32,
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
///
/// 所有跟踪算法都应实现此接口, 管线只依赖输入输出约定, 不关心内部分配策略。
pub trait Tracker {
    /// 更新跟踪器
    ///
    /// # 参数
    /// - `detections`: N x 5, 每行 `[box(4), score]`
    ///
    /// # 返回
    /// 当前帧的活跃跟踪
    fn update(&mut self, detections: ArrayView2<f32>) -> Result<Vec<TrackedObject>>;

    /// 重置跟踪器 (清除所有跟踪)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}
