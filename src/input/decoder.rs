/// FFmpeg 视频源 (文件 + 摄像头)
/// FFmpeg-backed video source
///
/// 解码在 FFmpeg 调度线程中进行, 帧通过有界通道交给读取端;
/// 文件源 seek 时重建解码管线并从目标时间点开始解码。
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::core::scheduler::ffmpeg_scheduler::{FfmpegScheduler, Running};
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{debug, info, warn};

use super::camera;
use super::decode_filter::DecodeFilter;
use super::{Frame, SourceInfo, SourceKind, VideoSource};
use crate::error::{Result, SentinelError};

/// 摄像头读帧超时
const CAMERA_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FfmpegSource {
    info: SourceInfo,
    url: String,
    format: Option<&'static str>,
    rx: Option<Receiver<RgbImage>>,
    scheduler: Option<FfmpegScheduler<Running>>,
    stop: Arc<AtomicBool>,
    position: u64,
}

impl FfmpegSource {
    /// 打开视频文件
    pub fn open_file(path: &Path) -> Result<Self> {
        let url = path.display().to_string();
        let (width, height, fps, total) = probe(&url)?;
        let mut source = Self {
            info: SourceInfo {
                id: url.clone(),
                kind: SourceKind::File,
                width,
                height,
                fps,
                total_frames: if total > 0 { Some(total) } else { None },
            },
            url,
            format: None,
            rx: None,
            scheduler: None,
            stop: Arc::new(AtomicBool::new(false)),
            position: 0,
        };
        source.start(0)?;
        info!(
            "🎬 视频文件已打开: {} | {}x{} | {:.1}fps | {}帧",
            source.info.id, width, height, fps, total
        );
        Ok(source)
    }

    /// 打开本地摄像头 (DirectShow/AVFoundation/V4L2)
    pub fn open_camera(index: usize) -> Result<Self> {
        let devices = camera::get_video_devices();
        let name = devices
            .iter()
            .find(|d| d.index == index)
            .map(|d| d.name.clone())
            .unwrap_or_default();
        let url = camera::format_camera_url(index, &name);

        let mut source = Self {
            info: SourceInfo {
                id: format!("camera:{}", index),
                kind: SourceKind::Camera,
                width: 0,
                height: 0,
                fps: 30.0,
                total_frames: None,
            },
            url,
            format: Some(camera::input_format()),
            rx: None,
            scheduler: None,
            stop: Arc::new(AtomicBool::new(false)),
            position: 0,
        };
        source.start(0)?;

        // 摄像头分辨率以第一帧为准
        let first = source
            .recv()
            .map_err(|e| SentinelError::source_unavailable(source.info.id.clone(), e))?
            .ok_or_else(|| {
                SentinelError::source_unavailable(source.info.id.clone(), "camera produced no frames")
            })?;
        source.info.width = first.width();
        source.info.height = first.height();
        info!("📷 摄像头已打开: {} ({}x{})", source.url, first.width(), first.height());
        Ok(source)
    }

    /// 构建并启动解码管线, 从第 `start_frame` 帧开始
    fn start(&mut self, start_frame: u64) -> Result<()> {
        self.stop_pipeline();

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded::<RgbImage>(2);
        let filter = DecodeFilter::new(tx, stop.clone());

        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("decode", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let mut input = Input::new(self.url.as_str());
        if let Some(format) = self.format {
            input = input
                .set_format(format)
                .set_input_opts([("framerate", "30")].into());
        } else if start_frame > 0 && self.info.fps > 0.0 {
            let start_us = (start_frame as f64 / self.info.fps * 1_000_000.0) as i64;
            input = input.set_start_time_us(start_us);
        }

        let ctx = FfmpegContext::builder()
            .input(input)
            .filter_desc("format=rgb24")
            .output(out)
            .build()
            .map_err(|e| SentinelError::source_unavailable(self.info.id.clone(), format!("构建失败: {}", e)))?;
        let scheduler = ctx
            .start()
            .map_err(|e| SentinelError::source_unavailable(self.info.id.clone(), format!("启动失败: {}", e)))?;

        debug!("✅ 解码管线启动 (起始帧 {})", start_frame);
        self.stop = stop;
        self.rx = Some(rx);
        self.scheduler = Some(scheduler);
        self.position = start_frame;
        Ok(())
    }

    fn recv(&mut self) -> std::result::Result<Option<RgbImage>, String> {
        let Some(rx) = self.rx.as_ref() else {
            return Ok(None);
        };
        match self.info.kind {
            SourceKind::File => Ok(rx.recv().ok()),
            SourceKind::Camera => match rx.recv_timeout(CAMERA_READ_TIMEOUT) {
                Ok(image) => Ok(Some(image)),
                Err(RecvTimeoutError::Disconnected) => Ok(None),
                Err(RecvTimeoutError::Timeout) => Err("camera read timed out".to_string()),
            },
        }
    }

    fn stop_pipeline(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // 先丢弃接收端, 解除解码线程的阻塞发送
        self.rx = None;
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.abort();
        }
    }
}

impl VideoSource for FfmpegSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let index = self.position;
        match self.recv() {
            Ok(Some(image)) => {
                self.position += 1;
                Ok(Some(Frame { index, image }))
            }
            Ok(None) => Ok(None),
            Err(reason) => Err(SentinelError::unreadable(index, reason)),
        }
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        if self.info.kind == SourceKind::Camera {
            return Ok(());
        }
        if index == self.position && self.rx.is_some() {
            return Ok(());
        }
        self.start(self.info.wrap_index(index))
    }

    fn close(&mut self) {
        self.stop_pipeline();
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop_pipeline();
    }
}

/// 读取视频流参数: (宽, 高, 帧率, 总帧数)
fn probe(url: &str) -> Result<(u32, u32, f64, u64)> {
    match find_video_stream_info(url) {
        Ok(Some(StreamInfo::Video {
            width,
            height,
            nb_frames,
            fps,
            ..
        })) => Ok((width as u32, height as u32, fps, nb_frames.max(0) as u64)),
        Ok(_) => Err(SentinelError::source_unavailable(url, "no video stream")),
        Err(e) => {
            warn!("⚠️ 读取视频信息失败: {}", e);
            Err(SentinelError::source_unavailable(url, e))
        }
    }
}
