//! 管线配置 - 通过JSON文件调整参数
//!
//! ```json
//! {
//!   "visualization_params": { "score_thres": 0.5, "max_boxes_to_draw": 50 },
//!   "loitering_threshold": 10.0,
//!   "fps": 30.0,
//!   "pixel_distance": 0.01,
//!   "target_labels": ["person", "car"]
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::DEFAULT_SMOOTHING_WINDOW;
use crate::tracking::ByteTrackConfig;

/// 可视化参数 (必填段)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VisualizationParams {
    /// 置信度阈值
    #[serde(default = "default_score_thres")]
    pub score_thres: f32,

    /// 每帧最多保留的检测数
    #[serde(default = "default_max_boxes")]
    pub max_boxes_to_draw: usize,
}

impl Default for VisualizationParams {
    fn default() -> Self {
        Self {
            score_thres: default_score_thres(),
            max_boxes_to_draw: default_max_boxes(),
        }
    }
}

/// 管线参数配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub visualization_params: VisualizationParams,

    // === 徘徊检测 ===
    /// 徘徊时间阈值 (秒)
    #[serde(default = "default_loitering_threshold")]
    pub loitering_threshold: f32,
    #[serde(default)]
    pub loitering_detection: bool,
    /// 只对 person 类别做徘徊检测
    #[serde(default)]
    pub enable_person_only: bool,

    // === 测速 ===
    #[serde(default = "default_fps")]
    pub fps: f32,
    /// 每像素实际距离 (米)
    #[serde(default = "default_pixel_distance")]
    pub pixel_distance: f32,
    #[serde(default)]
    pub speed_estimation: bool,
    #[serde(default = "default_smoothing_window")]
    pub speed_smoothing_window: usize,
    #[serde(default = "default_min_samples")]
    pub speed_min_samples: usize,

    /// 目标类别名
    #[serde(default = "default_target_labels")]
    pub target_labels: Vec<String>,

    // === 跟踪器 ===
    #[serde(default)]
    pub tracker: ByteTrackConfig,
}

fn default_score_thres() -> f32 {
    0.5
}

fn default_max_boxes() -> usize {
    50
}

fn default_loitering_threshold() -> f32 {
    10.0
}

fn default_fps() -> f32 {
    30.0
}

fn default_pixel_distance() -> f32 {
    0.01
}

fn default_smoothing_window() -> usize {
    DEFAULT_SMOOTHING_WINDOW
}

fn default_min_samples() -> usize {
    1
}

fn default_target_labels() -> Vec<String> {
    vec!["person".to_string(), "car".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            visualization_params: VisualizationParams::default(),
            loitering_threshold: default_loitering_threshold(),
            loitering_detection: false,
            enable_person_only: false,
            fps: default_fps(),
            pixel_distance: default_pixel_distance(),
            speed_estimation: false,
            speed_smoothing_window: default_smoothing_window(),
            speed_min_samples: default_min_samples(),
            target_labels: default_target_labels(),
            tracker: ByteTrackConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载并校验配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config = Self::from_json(&json)
            .with_context(|| format!("配置文件无效: {}", path.display()))?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("配置文件解析失败")?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("保存配置失败: {}", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let vis = &self.visualization_params;
        ensure!(
            (0.0..=1.0).contains(&vis.score_thres),
            "score_thres 必须位于 [0, 1], 实际为 {}",
            vis.score_thres
        );
        ensure!(vis.max_boxes_to_draw > 0, "max_boxes_to_draw 必须大于 0");
        ensure!(
            self.fps.is_finite() && self.fps > 0.0,
            "fps 必须为正数, 实际为 {}",
            self.fps
        );
        ensure!(
            self.loitering_threshold.is_finite() && self.loitering_threshold >= 0.0,
            "loitering_threshold 不能为负, 实际为 {}",
            self.loitering_threshold
        );
        ensure!(
            self.pixel_distance.is_finite() && self.pixel_distance >= 0.0,
            "pixel_distance 不能为负, 实际为 {}",
            self.pixel_distance
        );
        ensure!(
            self.speed_smoothing_window > 0,
            "speed_smoothing_window 必须大于 0"
        );
        ensure!(
            (1..=self.speed_smoothing_window).contains(&self.speed_min_samples),
            "speed_min_samples 必须位于 [1, {}]",
            self.speed_smoothing_window
        );
        ensure!(!self.target_labels.is_empty(), "target_labels 不能为空");
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前管线配置:");
        info!(
            "  置信度阈值: {:.2} | 最大检测数: {}",
            self.visualization_params.score_thres, self.visualization_params.max_boxes_to_draw
        );
        info!("  目标类别: {:?}", self.target_labels);
        info!(
            "  徘徊检测: {} (阈值 {:.1}s, 仅行人: {})",
            self.loitering_detection, self.loitering_threshold, self.enable_person_only
        );
        info!(
            "  测速: {} (fps {:.1}, {:.4} m/px, 平滑窗口 {})",
            self.speed_estimation, self.fps, self.pixel_distance, self.speed_smoothing_window
        );
    }
}

/// 读取标签词表: 每行一个类别名, 忽略空行
pub fn load_labels(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("读取标签文件失败: {}", path.display()))?;
    let labels: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    ensure!(!labels.is_empty(), "标签文件为空: {}", path.display());
    Ok(labels)
}
