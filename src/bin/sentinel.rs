/// 实时人员检测 (命令行)
///
/// 架构:
/// 1. 检测线程: 推流会话 (读帧 → 检测 → 标注 → 编码)
/// 2. 主线程:   接收事件, 打印进度, 保存标注帧
///
/// cargo run --bin sentinel --release -- --source demo.mp4 --output out/
use std::fs;
use std::path::Path;

use anyhow::Context;
use base64::Engine;
use clap::Parser;
use crowd_sentinel::config::{Args, SentinelConfig};
use crowd_sentinel::context::AppContext;
use crowd_sentinel::input::{open_source, SourceId, SourceKind};
use crowd_sentinel::pipeline::{FrameEvent, SessionOptions, StopSignal, StreamEvent, StreamingSession};
use mimalloc::MiMalloc;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 每隔多少帧打印一次进度
const PROGRESS_INTERVAL: u64 = 30;

fn main() -> anyhow::Result<()> {
    crowd_sentinel::init_tracing();
    let args = Args::parse();

    let settings = SentinelConfig {
        model_path: args.model.clone(),
        inference_size: args.inference_size,
        font_path: args.font.clone(),
        detection: args.detection_config()?,
        stream_target_fps: 0.0,
        ..Default::default()
    };
    let ctx = AppContext::new(settings, None);
    let invoker = ctx.ensure_detector()?;
    info!("📦 模型: {} ({})", invoker.name(), invoker.device());

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir).with_context(|| format!("无法创建输出目录 {}", dir.display()))?;
    }

    let id = SourceId::parse(&args.source);
    let source = open_source(&id)?;
    let info = source.info().clone();
    info!("📹 视频源: {}", info.id);
    info!("   分辨率: {}x{} | {:.1} fps", info.width, info.height, info.fps);
    if let Some(total) = info.total_frames {
        info!("   总帧数: {} ({:.1}s)", total, info.duration_secs());
    }

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        info!("🛑 收到 Ctrl-C, 正在停止...");
        handler_stop.stop();
    }) {
        warn!("⚠️  无法注册 Ctrl-C 处理: {}", e);
    }

    let options = SessionOptions {
        looping: args.looping,
        max_frames: args.max_frames,
        pacing: None,
        ..SessionOptions::from_context(&ctx)
    };
    let (tx, rx) = crossbeam_channel::bounded::<StreamEvent>(4);

    let summary = std::thread::scope(|s| -> anyhow::Result<_> {
        // 主线程提前返回时丢弃接收端, 检测线程随之退出
        let rx = rx;
        let worker = s.spawn(|| {
            let mut tx = tx;
            let mut session = StreamingSession::new(&ctx, options, stop);
            session.run_with(|| Ok(source), &mut tx)
        });

        let mut total_people = 0u64;
        let mut frames = 0u64;
        for event in rx.iter() {
            match event {
                StreamEvent::Frame(event) => {
                    frames += 1;
                    total_people += event.count as u64;
                    if let Some(dir) = &args.output {
                        save_frame(dir, &event)?;
                    }
                    if frames % PROGRESS_INTERVAL == 0 {
                        let average = total_people as f64 / frames as f64;
                        match (info.kind, info.total_frames) {
                            (SourceKind::File, Some(total)) if total > 0 => info!(
                                "📊 进度: {:.1}% | 帧 {}/{} | 平均 {:.1} 人",
                                (event.source_frame + 1) as f64 / total as f64 * 100.0,
                                event.source_frame + 1,
                                total,
                                average
                            ),
                            _ => info!(
                                "📊 帧 {} | 当前 {} 人 | {:.1} fps",
                                frames, event.count, event.fps
                            ),
                        }
                    }
                }
                StreamEvent::Error(event) => warn!("⚠️  {} ({})", event.error, event.cause),
            }
        }

        worker
            .join()
            .map_err(|_| anyhow::anyhow!("检测线程异常退出"))?
            .map_err(anyhow::Error::from)
    })?;

    println!();
    info!("✅ 检测完成");
    info!("   处理帧数: {}", summary.frames);
    info!("   累计人数: {}", summary.total_people);
    info!("   平均每帧: {:.2} 人", summary.average_people());
    if summary.loops > 0 {
        info!("   循环次数: {}", summary.loops);
    }
    if summary.skipped > 0 {
        info!("   跳过帧数: {}", summary.skipped);
    }
    Ok(())
}

fn save_frame(dir: &Path, event: &FrameEvent) -> anyhow::Result<()> {
    let jpeg = base64::engine::general_purpose::STANDARD
        .decode(&event.frame)
        .context("帧数据不是有效的 base64")?;
    let path = dir.join(format!("frame_{:06}.jpg", event.frame_number));
    fs::write(&path, jpeg).with_context(|| format!("无法写入 {}", path.display()))?;
    Ok(())
}
