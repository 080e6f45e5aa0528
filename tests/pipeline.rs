use anyhow::Result;
use image::RgbImage;
use ndarray::ArrayView2;
use sentinel_analytics::{
    ByteTracker, FramePipeline, PipelineConfig, RawDetections, TrackedObject, Tracker,
};

fn labels() -> Vec<String> {
    ["person", "car", "dog"].iter().map(|s| s.to_string()).collect()
}

/// 按类别生成一帧原始输出, 坐标为归一化 `[y1, x1, y2, x2]`
fn frame(person: &[[f32; 4]], car: &[[f32; 4]]) -> RawDetections {
    let row = |b: &[f32; 4]| vec![b[0], b[1], b[2], b[3], 0.9];
    vec![
        person.iter().map(row).collect(),
        car.iter().map(row).collect(),
        Vec::new(),
    ]
}

fn tracked_pipeline(config: PipelineConfig) -> FramePipeline {
    let tracker: Box<dyn Tracker> = Box::new(ByteTracker::default());
    FramePipeline::new(config, labels(), Some(tracker)).unwrap()
}

#[test]
fn test_stationary_person_becomes_loitering() {
    let config = PipelineConfig {
        loitering_detection: true,
        loitering_threshold: 1.0,
        fps: 10.0,
        ..Default::default()
    };
    let mut pipeline = tracked_pipeline(config);
    let raw = frame(&[[0.2, 0.2, 0.6, 0.4]], &[]);

    // 第 k 帧: current_frame = k, 起始帧 = 1, 停留 k - 1 帧, 阈值 10 帧
    for k in 1..=14u64 {
        let out = pipeline.process(100, 100, &raw).unwrap();
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].loitering, k - 1 > 10, "frame {}", k);
    }
}

#[test]
fn test_person_only_skips_other_classes() {
    let config = PipelineConfig {
        loitering_detection: true,
        enable_person_only: true,
        loitering_threshold: 0.0,
        fps: 10.0,
        ..Default::default()
    };
    let mut pipeline = tracked_pipeline(config);
    let raw = frame(&[[0.1, 0.1, 0.3, 0.2]], &[[0.6, 0.6, 0.9, 0.9]]);

    let mut last = Vec::new();
    for _ in 0..3 {
        last = pipeline.process(100, 100, &raw).unwrap().items;
    }
    assert_eq!(last.len(), 2);
    assert_eq!(pipeline.loitering().len(), 1);
    for item in &last {
        assert_eq!(item.loitering, item.label == "person");
    }
}

#[test]
fn test_departed_tracks_are_purged_from_both_managers() {
    let config = PipelineConfig {
        loitering_detection: true,
        speed_estimation: true,
        ..Default::default()
    };
    let mut pipeline = tracked_pipeline(config);
    let both = frame(&[[0.1, 0.1, 0.3, 0.2]], &[[0.6, 0.6, 0.9, 0.9]]);
    let person_only = frame(&[[0.1, 0.1, 0.3, 0.2]], &[]);

    pipeline.process(100, 100, &both).unwrap();
    pipeline.process(100, 100, &both).unwrap();
    assert_eq!(pipeline.loitering().len(), 2);
    assert_eq!(pipeline.speed().len(), 2);

    pipeline.process(100, 100, &person_only).unwrap();
    assert_eq!(pipeline.loitering().len(), 1);
    assert_eq!(pipeline.speed().len(), 1);

    // 空帧仍会推进计数并清理
    let before = pipeline.loitering().current_frame();
    let out = pipeline.process(100, 100, &frame(&[], &[])).unwrap();
    assert!(out.items.is_empty());
    assert_eq!(pipeline.loitering().current_frame(), before + 1);
    assert!(pipeline.loitering().is_empty());
    assert!(pipeline.speed().is_empty());
}

#[test]
fn test_speed_reported_from_second_frame() {
    let config = PipelineConfig {
        speed_estimation: true,
        fps: 10.0,
        pixel_distance: 0.05,
        ..Default::default()
    };
    let mut pipeline = tracked_pipeline(config);

    for k in 0..6 {
        let x = 0.10 + 0.02 * k as f32;
        let raw = frame(&[[0.2, x, 0.6, x + 0.2]], &[]);
        let out = pipeline.process(100, 100, &raw).unwrap();
        assert_eq!(out.items.len(), 1);
        let speed = out.items[0].speed_kmh;
        if k == 0 {
            assert!(speed.is_none());
        } else {
            assert!(speed.unwrap() > 0.0, "frame {}", k);
        }
    }
}

#[test]
fn test_speed_disabled_reports_nothing() {
    let mut pipeline = tracked_pipeline(PipelineConfig::default());
    let raw = frame(&[[0.2, 0.2, 0.6, 0.4]], &[]);
    for _ in 0..3 {
        let out = pipeline.process(100, 100, &raw).unwrap();
        assert!(out.items[0].speed_kmh.is_none());
    }
    assert!(pipeline.speed().is_empty());
}

/// 回显输入并额外输出一个远离所有检测的轨迹
struct EchoTracker;

impl Tracker for EchoTracker {
    fn update(&mut self, detections: ArrayView2<f32>) -> Result<Vec<TrackedObject>> {
        let mut tracks: Vec<TrackedObject> = detections
            .outer_iter()
            .enumerate()
            .map(|(i, row)| TrackedObject {
                track_id: 100 + i as u32,
                bbox: [row[0], row[1], row[2], row[3]],
                score: row[4],
            })
            .collect();
        tracks.push(TrackedObject {
            track_id: 999,
            bbox: [5000.0, 5000.0, 5010.0, 5010.0],
            score: 0.99,
        });
        Ok(tracks)
    }

    fn reset(&mut self) {}

    fn track_count(&self) -> usize {
        0
    }
}

#[test]
fn test_unmatched_track_is_skipped_and_not_active() {
    let config = PipelineConfig {
        loitering_detection: true,
        ..Default::default()
    };
    let tracker: Box<dyn Tracker> = Box::new(EchoTracker);
    let mut pipeline = FramePipeline::new(config, labels(), Some(tracker)).unwrap();

    let out = pipeline
        .process(100, 100, &frame(&[[0.1, 0.1, 0.3, 0.2]], &[[0.6, 0.6, 0.9, 0.9]]))
        .unwrap();

    let ids: Vec<Option<u32>> = out.items.iter().map(|i| i.track_id).collect();
    assert_eq!(ids, vec![Some(100), Some(101)]);
    assert_eq!(out.items[0].label, "person");
    assert_eq!(out.items[1].label, "car");
    assert!(pipeline.loitering().start_frame(999).is_none());
    assert_eq!(pipeline.loitering().len(), 2);
}

#[test]
fn test_annotate_keeps_frame_size() {
    let mut pipeline = tracked_pipeline(PipelineConfig::default());
    let img = RgbImage::new(160, 120);
    let raw = frame(&[[0.3, 0.3, 0.6, 0.5]], &[]);
    let out = pipeline.annotate(img, &raw).unwrap();
    assert_eq!(out.dimensions(), (160, 120));
    assert_eq!(pipeline.frames_processed(), 1);
}

#[test]
fn test_letterbox_padding_removed_for_landscape_frame() {
    let mut pipeline = FramePipeline::new(PipelineConfig::default(), labels(), None).unwrap();
    // 640x480: 参考边 640, y 方向上下各填充 80
    let raw = frame(&[[0.25, 0.5, 0.75, 1.0]], &[]);
    let out = pipeline.process(640, 480, &raw).unwrap();
    assert_eq!(out.items[0].bbox, [80.0, 320.0, 400.0, 640.0]);
}
