/// 检测系统 (Detection System)
///
/// - Selector: 原始输出过滤与排序
/// - Matcher:  跟踪框回溯到本帧检测
pub mod matcher;
pub mod selector;
pub mod types;

pub use matcher::{best_match_with_iou, find_best_match};
pub use selector::{resolve_target_classes, DetectionSelector};
pub use types::{Detection, DetectionSet, RawDetections};
