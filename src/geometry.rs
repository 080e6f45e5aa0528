//! 几何工具 (Geometry utilities)
//!
//! 所有框都使用检测器输出的坐标顺序 `[y_min, x_min, y_max, x_max]` (像素)。
//! IOU 与中心点计算对两个轴是对称的, 因此跟踪器和测速模块可以直接使用同一顺序。

/// 检测框坐标
pub type BoxCoords = [f32; 4];

/// 面积下限, 防止零面积框导致除零
const AREA_FLOOR: f32 = 1e-5;

/// 并集分母的平滑项
const UNION_EPS: f32 = 1e-5;

/// 计算 letterbox 参数: (参考边长, 单侧填充长度)
///
/// 推理前图像被补成 `max(h, w)` 的正方形, 短边两侧各补 `|h - w| / 2` 像素。
pub fn letterbox_params(img_height: u32, img_width: u32) -> (u32, u32) {
    let size = img_height.max(img_width);
    let padding = img_height.abs_diff(img_width) / 2;
    (size, padding)
}

/// 反归一化并去除 letterbox 填充
///
/// 每个坐标乘以 `size` 后截断为整数。奇数下标 (x) 在 `img_width != size` 时减去填充,
/// 偶数下标 (y) 在 `img_height != size` 时减去填充。
pub fn denormalize_box(
    bbox: &[f32],
    size: u32,
    padding: u32,
    img_height: u32,
    img_width: u32,
) -> BoxCoords {
    let mut out = [0.0; 4];
    for (i, (dst, &v)) in out.iter_mut().zip(bbox.iter()).enumerate() {
        let mut px = (v * size as f32) as i64;
        let is_x = i % 2 != 0;
        if (is_x && img_width != size) || (!is_x && img_height != size) {
            px -= padding as i64;
        }
        *dst = px as f32;
    }
    out
}

/// 计算两个框的 IOU (Intersection over Union)
///
/// 结果位于 `[0, 1]`; 任一轴上无重叠时交集为 0。
pub fn compute_iou(a: &BoxCoords, b: &BoxCoords) -> f32 {
    let lo0 = a[0].max(b[0]);
    let lo1 = a[1].max(b[1]);
    let hi0 = a[2].min(b[2]);
    let hi1 = a[3].min(b[3]);

    let inter = (hi0 - lo0).max(0.0) * (hi1 - lo1).max(0.0);
    let area_a = ((a[2] - a[0]) * (a[3] - a[1])).max(AREA_FLOOR);
    let area_b = ((b[2] - b[0]) * (b[3] - b[1])).max(AREA_FLOOR);

    inter / (area_a + area_b - inter + UNION_EPS)
}

/// 框中心点 (与框坐标同序)
pub fn box_center(bbox: &BoxCoords) -> (f32, f32) {
    ((bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0)
}

/// 坐标截断为整数像素
pub fn truncate_box(bbox: &BoxCoords) -> BoxCoords {
    bbox.map(f32::trunc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_params_landscape() {
        assert_eq!(letterbox_params(480, 640), (640, 80));
        assert_eq!(letterbox_params(640, 640), (640, 0));
        assert_eq!(letterbox_params(641, 640), (641, 0));
    }

    #[test]
    fn test_denormalize_landscape_only_shifts_y() {
        // 640x480: 宽边为参考边, 仅 y 坐标 (偶数下标) 去除填充
        let (size, pad) = letterbox_params(480, 640);
        let b = denormalize_box(&[0.25, 0.5, 0.75, 1.0], size, pad, 480, 640);
        assert_eq!(b, [80.0, 320.0, 400.0, 640.0]);
    }

    #[test]
    fn test_denormalize_portrait_only_shifts_x() {
        let (size, pad) = letterbox_params(640, 480);
        let b = denormalize_box(&[0.5, 0.25, 1.0, 0.75], size, pad, 640, 480);
        assert_eq!(b, [320.0, 80.0, 640.0, 400.0]);
    }

    #[test]
    fn test_denormalize_truncates() {
        let b = denormalize_box(&[0.1001, 0.2999, 0.5, 0.5], 100, 0, 100, 100);
        assert_eq!(b, [10.0, 29.0, 50.0, 50.0]);
    }

    #[test]
    fn test_iou_identical() {
        let a = [10.0, 10.0, 50.0, 60.0];
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_and_touching() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert_eq!(compute_iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        // 只共享一条边
        assert_eq!(compute_iou(&a, &[10.0, 0.0, 20.0, 10.0]), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [0.0, 5.0, 10.0, 15.0];
        // 交 50, 并 150
        assert!((compute_iou(&a, &b) - 1.0 / 3.0).abs() < 1e-5);
        assert!((compute_iou(&a, &b) - compute_iou(&b, &a)).abs() < 1e-7);
    }

    #[test]
    fn test_iou_degenerate_box_is_finite() {
        let a = [5.0, 5.0, 5.0, 5.0];
        let iou = compute_iou(&a, &a);
        assert!(iou.is_finite());
        assert!((0.0..=1.0).contains(&iou));
    }

    #[test]
    fn test_box_center() {
        assert_eq!(box_center(&[0.0, 10.0, 20.0, 30.0]), (10.0, 20.0));
    }
}
