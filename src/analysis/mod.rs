//! 行为分析 (Behavioural analysis)
//!
//! 以跟踪ID为键的辅助状态, 各自由对应的管理器独占。
pub mod loitering;
pub mod speed;

pub use loitering::LoiteringTracker;
pub use speed::{SpeedEstimator, DEFAULT_SMOOTHING_WINDOW, KMH_PER_MPS};
