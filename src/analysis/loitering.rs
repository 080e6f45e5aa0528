//! 徘徊检测 (Loitering detection)
//!
//! 每个跟踪ID的状态: 未记录 → 已记录(起始帧) → 删除。
//! 起始帧一旦记录不再修改; ID 离开活跃集合后状态被删除, 重新出现时重新计时。

use std::collections::{HashMap, HashSet};

use tracing::debug;

pub struct LoiteringTracker {
    /// 徘徊时间阈值 (秒)
    threshold_seconds: f32,

    fps: f32,

    /// 阈值换算成帧数
    frame_threshold: f64,

    /// track_id → 起始帧
    track_start_frames: HashMap<u32, u64>,

    /// 当前帧号, 从 0 开始单调递增
    current_frame: u64,
}

impl LoiteringTracker {
    pub fn new(threshold_seconds: f32, fps: f32) -> Self {
        Self {
            threshold_seconds,
            fps,
            frame_threshold: threshold_seconds as f64 * fps as f64,
            track_start_frames: HashMap::new(),
            current_frame: 0,
        }
    }

    /// 进入下一帧, 每帧处理开始前调用一次
    pub fn advance_frame(&mut self) {
        self.current_frame += 1;
    }

    /// 首次观察到时记录起始帧, 之后调用无效果
    pub fn observe(&mut self, track_id: u32) {
        let current = self.current_frame;
        self.track_start_frames.entry(track_id).or_insert_with(|| {
            debug!("开始计时: track={} frame={}", track_id, current);
            current
        });
    }

    pub fn is_loitering(&self, track_id: u32) -> bool {
        match self.dwell_frames(track_id) {
            Some(frames) => frames as f64 > self.frame_threshold,
            None => false,
        }
    }

    /// 删除不在活跃集合中的所有跟踪, 返回删除数量
    pub fn reconcile(&mut self, active: &HashSet<u32>) -> usize {
        let before = self.track_start_frames.len();
        self.track_start_frames.retain(|id, _| active.contains(id));
        before - self.track_start_frames.len()
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn frame_threshold(&self) -> f64 {
        self.frame_threshold
    }

    pub fn threshold_seconds(&self) -> f32 {
        self.threshold_seconds
    }

    pub fn start_frame(&self, track_id: u32) -> Option<u64> {
        self.track_start_frames.get(&track_id).copied()
    }

    /// 已停留帧数
    pub fn dwell_frames(&self, track_id: u32) -> Option<u64> {
        self.start_frame(track_id)
            .map(|start| self.current_frame.saturating_sub(start))
    }

    /// 已停留秒数
    pub fn dwell_seconds(&self, track_id: u32) -> Option<f32> {
        self.dwell_frames(track_id)
            .map(|frames| frames as f32 / self.fps)
    }

    pub fn len(&self) -> usize {
        self.track_start_frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track_start_frames.is_empty()
    }
}
