//! 按需处理 - 单帧请求/响应、上传帧检测、整段视频统计
//!
//! 每次调用独立打开视频源,可与推流会话并发;
//! 与推流共用检测参数和共享状态,指标窗口使用上下文中的按需窗口。

use std::path::Path;
use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::processor::{FrameOptions, FrameProcessor, ProcessedFrame};
use crate::context::AppContext;
use crate::error::{Result, SentinelError};
use crate::input::{open_source, SourceHandle, SourceId, SourceInfo, SourceKind};

/// 单帧请求
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct FrameRequest {
    pub frame_number: u64,
    pub annotate: bool,
    pub show_overlay: bool,
}

impl Default for FrameRequest {
    fn default() -> Self {
        Self {
            frame_number: 0,
            annotate: true,
            show_overlay: true,
        }
    }
}

impl FrameRequest {
    fn options(&self) -> FrameOptions {
        FrameOptions {
            annotate: self.annotate,
            show_overlay: self.show_overlay,
        }
    }
}

/// 单帧结果
#[derive(Clone, Debug, Serialize)]
pub struct FrameResponse {
    #[serde(flatten)]
    pub result: ProcessedFrame,
    pub frame_number: u64, // 请求的帧号
    pub source_frame: u64, // 取模后实际读取的帧号
}

/// 视频信息
#[derive(Clone, Debug, Serialize)]
pub struct VideoInfo {
    pub total_frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub path: String,
}

impl VideoInfo {
    pub fn from_source(info: &SourceInfo, path: &Path) -> Self {
        Self {
            total_frames: info.total_frames.unwrap_or(0),
            fps: info.fps,
            width: info.width,
            height: info.height,
            duration: info.duration_secs(),
            path: path.display().to_string(),
        }
    }
}

/// 整段视频统计
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VideoAnalysis {
    pub total_frames: u64,
    pub fps: f64,
    pub sampled_frames: usize,
    pub average_count: f64,
    pub max_count: usize,
    pub min_count: usize,
    pub detection_counts: Vec<usize>,
    pub skipped_frames: usize, // 推理失败被跳过的采样帧
}

/// 按帧号处理已打开的视频源 (越界帧号取模)
pub fn process_frame_at(ctx: &AppContext, source: &mut SourceHandle, request: &FrameRequest) -> Result<FrameResponse> {
    let invoker = ctx.detector()?;
    let state = ctx.state();

    state.begin_processing();
    let started = Instant::now();
    let outcome = source.read_at(request.frame_number).and_then(|frame| {
        let processor = FrameProcessor::new(&invoker, ctx.annotator(), ctx.settings().jpeg_quality);
        let config = ctx.detection_config();
        let mut metrics = ctx.metrics().lock();
        let result = processor.process(started, &frame.image, &config, &mut metrics, request.options())?;
        Ok((frame.index, result))
    });

    match outcome {
        Ok((source_frame, result)) => {
            state.publish(result.to_published());
            debug!(
                "🎯 第{}帧 (源帧{}) | {}人 | {:.1}fps",
                request.frame_number, source_frame, result.count, result.fps
            );
            Ok(FrameResponse {
                result,
                frame_number: request.frame_number,
                source_frame,
            })
        }
        Err(e) => {
            state.end_processing();
            Err(e)
        }
    }
}

/// 打开当前视频并处理一帧
pub fn process_frame(ctx: &AppContext, request: &FrameRequest) -> Result<FrameResponse> {
    ctx.detector()?;
    let path = ctx.video_path();
    let mut source = open_source(&SourceId::File(path))?;
    process_frame_at(ctx, &mut source, request)
}

/// 上传帧检测 (webcam 接口)
pub fn detect_uploaded(ctx: &AppContext, image: &RgbImage) -> Result<ProcessedFrame> {
    let invoker = ctx.detector()?;
    let processor = FrameProcessor::new(&invoker, ctx.annotator(), ctx.settings().jpeg_quality);
    let config = ctx.detection_config();
    let result = {
        let mut metrics = ctx.metrics().lock();
        processor.process(Instant::now(), image, &config, &mut metrics, FrameOptions::default())?
    };
    ctx.state().publish(result.to_published());
    Ok(result)
}

/// 每隔 `interval` 帧采样检测, 统计人数; 推理失败的采样帧跳过并计数
pub fn analyze_source(ctx: &AppContext, source: &mut SourceHandle, interval: u64) -> Result<VideoAnalysis> {
    let invoker = ctx.detector()?;
    let info = source.info().clone();
    if info.kind == SourceKind::Camera {
        return Err(SentinelError::InvalidRequest(
            "whole-video analysis needs a file source".to_string(),
        ));
    }
    let interval = interval.max(1);
    let config = ctx.detection_config();

    let mut counts = Vec::new();
    let mut skipped = 0;
    let mut index = 0u64;
    source.seek(0)?;
    while let Some(frame) = source.read()? {
        if index % interval == 0 {
            match invoker.detect(&frame.image, &config) {
                Ok(detections) => counts.push(detections.len()),
                Err(e @ SentinelError::InferenceError(_)) => {
                    warn!("⚠️ 采样帧{}推理失败, 跳过: {}", frame.index, e);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        index += 1;
    }

    let mut analysis = summarize(info.total_frames.unwrap_or(index), info.fps, counts);
    analysis.skipped_frames = skipped;
    info!(
        "📊 视频分析完成: 采样{}帧 | 跳过{}帧 | 平均{:.1}人 | 最多{}人",
        analysis.sampled_frames, skipped, analysis.average_count, analysis.max_count
    );
    Ok(analysis)
}

/// 分析当前视频
pub fn analyze_video(ctx: &AppContext) -> Result<VideoAnalysis> {
    ctx.detector()?;
    let mut source = open_source(&SourceId::File(ctx.video_path()))?;
    analyze_source(ctx, &mut source, ctx.settings().analyze_sample_interval)
}

/// 当前视频的基本信息
pub fn video_info(ctx: &AppContext) -> Result<VideoInfo> {
    video_info_at(&ctx.video_path())
}

pub fn video_info_at(path: &Path) -> Result<VideoInfo> {
    let source = open_source(&SourceId::File(path.to_path_buf()))?;
    Ok(VideoInfo::from_source(source.info(), path))
}

fn summarize(total_frames: u64, fps: f64, counts: Vec<usize>) -> VideoAnalysis {
    if counts.is_empty() {
        return VideoAnalysis {
            total_frames,
            fps,
            ..Default::default()
        };
    }
    let sum: usize = counts.iter().sum();
    VideoAnalysis {
        total_frames,
        fps,
        sampled_frames: counts.len(),
        average_count: sum as f64 / counts.len() as f64,
        max_count: counts.iter().copied().max().unwrap_or(0),
        min_count: counts.iter().copied().min().unwrap_or(0),
        detection_counts: counts,
        skipped_frames: 0,
    }
}
