/// 视频输入系统 (Video Input System)
///
/// 统一的视频源接口,支持:
/// - MemorySource:        内存帧序列 / GIF动画 / 单张图片
/// - ImageSequenceSource: 图片序列目录 (按文件名排序)
/// - FfmpegSource:        FFmpeg 视频文件 + 本地摄像头 (feature `ffmpeg`)
///
/// 文件源支持任意帧定位,越界帧号按总帧数取模 (循环播放);
/// 摄像头源没有总帧数,seek 为空操作。
pub mod memory;
pub mod sequence;

#[cfg(feature = "ffmpeg")]
pub mod camera;
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;

use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, SentinelError};

pub use memory::MemorySource;
pub use sequence::ImageSequenceSource;

#[cfg(feature = "ffmpeg")]
pub use camera::{get_video_devices, VideoDevice};
#[cfg(feature = "ffmpeg")]
pub use decoder::FfmpegSource;

/// 已解码帧 (读取它的循环迭代独占所有权)
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64, // 源内帧号 (0起)
    pub image: RgbImage,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Camera,
}

/// 视频源信息
#[derive(Clone, Debug, Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub kind: SourceKind,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: Option<u64>,
}

impl SourceInfo {
    /// 文件源: 帧号对总帧数取模
    pub fn wrap_index(&self, index: u64) -> u64 {
        match (self.kind, self.total_frames) {
            (SourceKind::File, Some(total)) if total > 0 => index % total,
            _ => index,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        match self.total_frames {
            Some(total) if self.fps > 0.0 => total as f64 / self.fps,
            _ => 0.0,
        }
    }
}

/// 视频源标识: 文件路径 / 摄像头序号
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceId {
    File(PathBuf),
    Camera(usize),
}

impl SourceId {
    /// "webcam"/"camera" → 默认摄像头, 纯数字 → 摄像头序号, 其它 → 文件路径
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower == "webcam" || lower == "camera" {
            return SourceId::Camera(0);
        }
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = trimmed.parse() {
                return SourceId::Camera(index);
            }
        }
        SourceId::File(PathBuf::from(trimmed))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::File(path) => write!(f, "{}", path.display()),
            SourceId::Camera(index) => write!(f, "camera:{}", index),
        }
    }
}

/// 统一的视频源接口
pub trait VideoSource: Send {
    fn info(&self) -> &SourceInfo;

    /// 读取下一帧, `Ok(None)` 表示流结束
    fn read(&mut self) -> Result<Option<Frame>>;

    /// 定位到指定帧 (文件源按总帧数取模, 摄像头源为空操作)
    fn seek(&mut self, index: u64) -> Result<()>;

    /// 释放底层资源, 可重复调用
    fn close(&mut self);
}

/// 视频源句柄: 离开作用域时保证 close
pub struct SourceHandle {
    inner: Box<dyn VideoSource>,
    closed: bool,
}

impl SourceHandle {
    pub fn new(inner: Box<dyn VideoSource>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub fn info(&self) -> &SourceInfo {
        self.inner.info()
    }

    pub fn kind(&self) -> SourceKind {
        self.inner.info().kind
    }

    pub fn read(&mut self) -> Result<Option<Frame>> {
        if self.closed {
            return Err(SentinelError::source_unavailable(
                self.inner.info().id.clone(),
                "source already closed",
            ));
        }
        self.inner.read()
    }

    pub fn seek(&mut self, index: u64) -> Result<()> {
        if self.kind() == SourceKind::Camera {
            return Ok(());
        }
        let target = self.inner.info().wrap_index(index);
        self.inner.seek(target)
    }

    /// 按帧号读取: 失败后从第0帧重试一次
    pub fn read_at(&mut self, index: u64) -> Result<Frame> {
        let target = self.info().wrap_index(index);
        match self.seek_and_read(target) {
            Ok(frame) => Ok(frame),
            Err(e) if e.is_source_fatal() => Err(e),
            Err(e) => {
                warn!("⚠️ 读取第{}帧失败: {}, 从第0帧重试", target, e);
                self.seek_and_read(0).map_err(|retry| match retry {
                    SentinelError::UnreadableFrame { .. } => retry,
                    other if other.is_source_fatal() => other,
                    other => SentinelError::unreadable(target, other),
                })
            }
        }
    }

    fn seek_and_read(&mut self, index: u64) -> Result<Frame> {
        self.seek(index)?;
        self.read()?
            .ok_or_else(|| SentinelError::unreadable(index, "end of stream"))
    }

    pub fn close(&mut self) {
        if !self.closed {
            debug!("🔌 关闭视频源 {}", self.inner.info().id);
            self.inner.close();
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

pub(crate) fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 打开视频源
pub fn open_source(id: &SourceId) -> Result<SourceHandle> {
    let source: Box<dyn VideoSource> = match id {
        SourceId::Camera(index) => open_camera(*index)?,
        SourceId::File(path) => open_file(path)?,
    };
    Ok(SourceHandle::new(source))
}

#[cfg(feature = "ffmpeg")]
fn open_camera(index: usize) -> Result<Box<dyn VideoSource>> {
    Ok(Box::new(FfmpegSource::open_camera(index)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_camera(index: usize) -> Result<Box<dyn VideoSource>> {
    Err(SentinelError::source_unavailable(
        SourceId::Camera(index).to_string(),
        "camera capture requires the `ffmpeg` feature",
    ))
}

fn open_file(path: &Path) -> Result<Box<dyn VideoSource>> {
    if !path.exists() {
        return Err(SentinelError::source_unavailable(
            path.display().to_string(),
            "no such file or directory",
        ));
    }
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(path)?));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "gif" {
        return Ok(Box::new(MemorySource::from_gif(path)?));
    }
    if has_image_extension(path) {
        return Ok(Box::new(MemorySource::from_image(path)?));
    }
    open_container(path)
}

#[cfg(feature = "ffmpeg")]
fn open_container(path: &Path) -> Result<Box<dyn VideoSource>> {
    Ok(Box::new(FfmpegSource::open_file(path)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_container(path: &Path) -> Result<Box<dyn VideoSource>> {
    Err(SentinelError::source_unavailable(
        path.display().to_string(),
        "video container decoding requires the `ffmpeg` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frames(n: usize) -> Vec<RgbImage> {
        (0..n)
            .map(|i| RgbImage::from_pixel(4, 4, Rgb([i as u8, 0, 0])))
            .collect()
    }

    #[test]
    fn test_parse_source_id() {
        assert_eq!(SourceId::parse("webcam"), SourceId::Camera(0));
        assert_eq!(SourceId::parse("Camera"), SourceId::Camera(0));
        assert_eq!(SourceId::parse("2"), SourceId::Camera(2));
        assert_eq!(
            SourceId::parse("clips/demo.mp4"),
            SourceId::File(PathBuf::from("clips/demo.mp4"))
        );
    }

    #[test]
    fn test_wrap_index() {
        let source = MemorySource::new("mem", frames(3), 30.0);
        assert_eq!(source.info().wrap_index(3), 0);
        assert_eq!(source.info().wrap_index(7), 1);
        let camera = MemorySource::camera("cam", frames(3), 30.0);
        assert_eq!(camera.info().wrap_index(7), 7);
    }

    #[test]
    fn test_read_at_wraps() {
        let mut handle = SourceHandle::new(Box::new(MemorySource::new("mem", frames(3), 30.0)));
        for (request, expected) in [(0u64, 0u64), (1, 1), (2, 2), (3, 0), (5, 2)] {
            let frame = handle.read_at(request).unwrap();
            assert_eq!(frame.index, expected);
            assert_eq!(frame.image.get_pixel(0, 0)[0], expected as u8);
        }
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = open_source(&SourceId::File(PathBuf::from("/nonexistent/clip.gif")))
            .err()
            .unwrap();
        assert_eq!(err.cause_tag(), "source_unavailable");
    }

    #[test]
    fn test_closed_handle_refuses_reads() {
        let mut handle = SourceHandle::new(Box::new(MemorySource::new("mem", frames(2), 30.0)));
        handle.close();
        assert!(handle.is_closed());
        assert!(handle.read().is_err());
        // 重复关闭无副作用
        handle.close();
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_camera_requires_ffmpeg() {
        let err = open_source(&SourceId::Camera(0)).err().unwrap();
        assert!(err.to_string().contains("ffmpeg"));
    }
}
