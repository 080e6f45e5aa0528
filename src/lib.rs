#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod analysis; // 徘徊检测与测速
pub mod config; // 管线配置参数
pub mod detection; // 检测筛选与轨迹关联
pub mod geometry; // 框几何工具
pub mod pipeline; // 帧处理管线
pub mod render; // 帧标注绘制
pub mod tracking; // 多目标跟踪

pub use crate::analysis::{LoiteringTracker, SpeedEstimator};
pub use crate::config::{load_labels, PipelineConfig, VisualizationParams};
pub use crate::detection::{Detection, DetectionSelector, DetectionSet, RawDetections};
pub use crate::geometry::{compute_iou, denormalize_box, BoxCoords};
pub use crate::pipeline::{Annotation, FrameAnnotations, FramePipeline};
pub use crate::render::Annotator;
pub use crate::tracking::{ByteTrackConfig, ByteTracker, TrackedObject, Tracker};

/// 本地时间字符串, 用于输出目录命名
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}
