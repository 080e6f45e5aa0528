/// 数字卫兵 (Digital Sentinel)
///
/// 离线帧序列分析: 检测筛选 → 跟踪 → 徘徊检测 / 测速 → 标注输出
///
/// 系统架构:
/// 1. 采集线程: 图像解码 + 读取检测结果 (预读, 有界队列)
/// 2. 主线程:   按帧顺序串行执行分析管线并写出结果
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam_channel::{bounded, Sender};
use image::RgbImage;
use sentinel_analytics::{
    gen_time_string, load_labels, Annotator, ByteTracker, FramePipeline, PipelineConfig,
    RawDetections, Tracker,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 追踪算法
#[derive(Clone, Copy, Debug, ValueEnum)]
enum TrackerKind {
    Bytetrack,
    None,
}

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 检测后处理与行为分析", long_about = None)]
struct Args {
    /// 帧图像目录 (按文件名排序)
    #[arg(long)]
    frames: PathBuf,

    /// 原始检测结果 (JSONL, 每行一帧)
    #[arg(long)]
    detections: PathBuf,

    /// 标签词表 (每行一个类别名)
    #[arg(long)]
    labels: PathBuf,

    /// 管线配置 (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// 输出根目录
    #[arg(short, long, default_value = "runs")]
    output: PathBuf,

    /// 追踪算法
    #[arg(long, value_enum, default_value_t = TrackerKind::Bytetrack)]
    tracker: TrackerKind,

    /// 启用测速
    #[arg(long)]
    speed: bool,

    /// 启用徘徊检测
    #[arg(long)]
    loitering: bool,

    /// 徘徊检测仅针对行人
    #[arg(long)]
    person_only: bool,

    /// 覆盖配置中的帧率
    #[arg(long)]
    fps: Option<f32>,

    /// 标注字体 (TTF/OTF), 缺省时只画框
    #[arg(long)]
    font: Option<PathBuf>,
}

/// 采集线程 → 主线程
struct FrameJob {
    name: String,
    image: RgbImage,
    raw: RawDetections,
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("读取帧目录失败: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp"))
                .unwrap_or(false)
        })
        .collect();
    frames.sort();
    Ok(frames)
}

fn load_frames(frames: Vec<PathBuf>, detections: PathBuf, tx: Sender<Result<FrameJob>>) {
    let result = (|| -> Result<()> {
        let file = File::open(&detections)
            .with_context(|| format!("打开检测文件失败: {}", detections.display()))?;
        let mut lines = BufReader::new(file).lines();

        for (idx, path) in frames.iter().enumerate() {
            let Some(line) = lines.next() else {
                warn!("⚠️ 检测文件只有 {} 行, 剩余帧被忽略", idx);
                break;
            };
            let line = line.context("读取检测文件失败")?;
            let raw: RawDetections = serde_json::from_str(&line)
                .with_context(|| format!("第 {} 行检测结果解析失败", idx + 1))?;
            let image = image::open(path)
                .with_context(|| format!("图像解码失败: {}", path.display()))?
                .to_rgb8();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{:06}.png", idx));

            if tx.send(Ok(FrameJob { name, image, raw })).is_err() {
                // 主线程已退出
                return Ok(());
            }
        }
        Ok(())
    })();

    if let Err(e) = result {
        let _ = tx.send(Err(e));
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sentinel_analytics=info,sentinel=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::load(&args.config)?;
    config.speed_estimation |= args.speed;
    config.loitering_detection |= args.loitering;
    config.enable_person_only |= args.person_only;
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    config.validate().context("命令行参数与配置组合无效")?;
    config.print_summary();

    let labels = load_labels(&args.labels)?;
    info!("🏷️  标签: {} 个", labels.len());

    let tracker: Option<Box<dyn Tracker>> = match args.tracker {
        TrackerKind::Bytetrack => {
            info!("🎯 跟踪器: ByteTrack (高低分分开处理)");
            Some(Box::new(ByteTracker::new(config.tracker.clone())))
        }
        TrackerKind::None => {
            info!("🎯 跟踪器: 禁用");
            None
        }
    };

    let annotator = match &args.font {
        Some(path) => Annotator::with_font(Annotator::load_font(path)?),
        None => Annotator::new(),
    };
    let mut pipeline = FramePipeline::new(config, labels, tracker)?.with_annotator(annotator);

    let frames = list_frames(&args.frames)?;
    if frames.is_empty() {
        bail!("帧目录中没有图像: {}", args.frames.display());
    }

    let out_dir = args.output.join(gen_time_string("-"));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("创建输出目录失败: {}", out_dir.display()))?;
    let mut report = BufWriter::new(
        File::create(out_dir.join("annotations.jsonl")).context("创建标注文件失败")?,
    );

    info!("🚀 开始分析 {} 帧 → {}", frames.len(), out_dir.display());

    // 解码预读, 分析保持串行
    let (tx, rx) = bounded::<Result<FrameJob>>(8);
    let detections = args.detections.clone();
    let loader = thread::spawn(move || load_frames(frames, detections, tx));

    for job in rx {
        let job = job?;
        let (width, height) = (job.image.width(), job.image.height());
        let annotations = pipeline.process(width, height, &job.raw)?;

        let mut image = job.image;
        pipeline.render(&mut image, &annotations);
        image
            .save(out_dir.join(&job.name))
            .with_context(|| format!("保存标注帧失败: {}", job.name))?;

        serde_json::to_writer(&mut report, &annotations).context("写入标注失败")?;
        report.write_all(b"\n")?;
    }

    if loader.join().is_err() {
        error!("❌ 采集线程异常退出");
    }
    report.flush()?;

    info!(
        "✅ 完成: {} 帧 | 输出目录 {}",
        pipeline.frames_processed(),
        out_dir.display()
    );
    Ok(())
}
