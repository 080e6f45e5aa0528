//! 简化卡尔曼滤波器 (用于单个框的位置和尺寸平滑)
//!
//! 状态向量: [c0, c1, s0, s1, v_c0, v_c1, v_s0, v_s1]
//! 即中心点、尺寸及其速度; 协方差简化为对角阵。

use crate::geometry::BoxCoords;

/// 滤波参数
#[derive(Clone, Copy, Debug)]
pub struct KalmanParams {
    /// 过程噪声 (0.1-1.0, 越小越平滑)
    pub process_noise: f32,
    /// 观测噪声 (0.5-50.0, 越大越平滑)
    pub observation_noise: f32,
    /// 每帧速度保留比例
    pub velocity_decay: f32,
    /// 静止判定阈值 (像素/帧)
    pub stationary_threshold: f32,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            process_noise: 0.1,
            observation_noise: 0.5,
            velocity_decay: 0.95,
            stationary_threshold: 2.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    p: [f32; 8],
    params: KalmanParams,
    /// 连续静止帧数
    stationary_count: u32,
}

fn measure(bbox: &BoxCoords) -> [f32; 4] {
    [
        (bbox[0] + bbox[2]) / 2.0,
        (bbox[1] + bbox[3]) / 2.0,
        bbox[2] - bbox[0],
        bbox[3] - bbox[1],
    ]
}

fn to_box(c0: f32, c1: f32, s0: f32, s1: f32) -> BoxCoords {
    let s0 = s0.max(1.0);
    let s1 = s1.max(1.0);
    [c0 - s0 / 2.0, c1 - s1 / 2.0, c0 + s0 / 2.0, c1 + s1 / 2.0]
}

impl KalmanBoxFilter {
    pub fn new(bbox: &BoxCoords, params: KalmanParams) -> Self {
        let z = measure(bbox);
        Self {
            state: [z[0], z[1], z[2], z[3], 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            params,
            stationary_count: 0,
        }
    }

    fn center_speed(&self) -> f32 {
        self.state[4].hypot(self.state[5])
    }

    /// 预测下一帧 (匀速模型 + 速度衰减)
    pub fn predict(&mut self) {
        let stationary = self.center_speed() < self.params.stationary_threshold;

        let (pos_decay, size_decay) = if stationary {
            self.stationary_count += 1;
            // 连续静止3帧后大幅衰减
            let d = if self.stationary_count > 3 {
                0.7
            } else {
                self.params.velocity_decay
            };
            (d, d)
        } else {
            self.stationary_count = 0;
            (self.params.velocity_decay, 0.98)
        };

        self.state[4] *= pos_decay;
        self.state[5] *= pos_decay;
        self.state[6] *= size_decay;
        self.state[7] *= size_decay;

        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }

        let q = if stationary {
            self.params.process_noise * 0.5
        } else {
            self.params.process_noise
        };
        for p in self.p.iter_mut() {
            *p += q;
        }
    }

    /// 融合观测值, 观测噪声按残差大小自适应
    pub fn update(&mut self, bbox: &BoxCoords) {
        let z = measure(bbox);
        let mut y = [0.0f32; 4];
        for i in 0..4 {
            y[i] = z[i] - self.state[i];
        }

        let residual = y[0].hypot(y[1]);
        let r = if residual < self.params.stationary_threshold {
            self.params.observation_noise * 0.3
        } else if residual < 10.0 {
            self.params.observation_noise
        } else {
            // 大幅跳变: 更信任预测
            self.params.observation_noise * 3.0
        };
        let velocity_gain = if residual < self.params.stationary_threshold {
            0.3
        } else {
            1.0
        };

        for i in 0..4 {
            let k_pos = self.p[i] / (self.p[i] + r);
            let k_vel = self.p[i + 4] / (self.p[i + 4] + r * 10.0);

            self.state[i] += k_pos * y[i];
            self.state[i + 4] += k_vel * y[i] * velocity_gain;

            self.p[i] *= 1.0 - k_pos;
            self.p[i + 4] *= 1.0 - k_vel;
        }

        if residual >= self.params.stationary_threshold {
            self.stationary_count = 0;
        }
    }

    /// 当前状态对应的框
    pub fn state_box(&self) -> BoxCoords {
        to_box(self.state[0], self.state[1], self.state[2], self.state[3])
    }

    /// 下一帧预测框 (用于匹配)
    pub fn predicted_box(&self) -> BoxCoords {
        to_box(
            self.state[0] + self.state[4],
            self.state[1] + self.state[5],
            self.state[2] + self.state[6],
            self.state[3] + self.state[7],
        )
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }
}
