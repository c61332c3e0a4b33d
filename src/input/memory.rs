//! 内存帧序列 - GIF动画、单张图片、测试用帧序列

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, RgbImage};

use super::{Frame, SourceInfo, SourceKind, VideoSource};
use crate::error::{Result, SentinelError};

pub struct MemorySource {
    info: SourceInfo,
    frames: Vec<RgbImage>,
    cursor: usize,
}

impl MemorySource {
    /// 文件型内存源 (可循环、可定位)
    pub fn new(id: impl Into<String>, frames: Vec<RgbImage>, fps: f64) -> Self {
        Self::with_kind(id, frames, fps, SourceKind::File)
    }

    /// 摄像头型内存源 (读完即结束, 不可定位)
    pub fn camera(id: impl Into<String>, frames: Vec<RgbImage>, fps: f64) -> Self {
        Self::with_kind(id, frames, fps, SourceKind::Camera)
    }

    fn with_kind(id: impl Into<String>, frames: Vec<RgbImage>, fps: f64, kind: SourceKind) -> Self {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        let total_frames = match kind {
            SourceKind::File => Some(frames.len() as u64),
            SourceKind::Camera => None,
        };
        Self {
            info: SourceInfo {
                id: id.into(),
                kind,
                width,
                height,
                fps,
                total_frames,
            },
            frames,
            cursor: 0,
        }
    }

    /// 单张图片作为一帧的文件源
    pub fn from_image(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .map_err(|e| SentinelError::source_unavailable(path.display().to_string(), e))?
            .to_rgb8();
        Ok(Self::new(path.display().to_string(), vec![image], 1.0))
    }

    /// 解码整个GIF动画, 帧率取第一帧的延时
    pub fn from_gif(path: &Path) -> Result<Self> {
        let id = path.display().to_string();
        let file = File::open(path).map_err(|e| SentinelError::source_unavailable(&id, e))?;
        let decoder = GifDecoder::new(BufReader::new(file))
            .map_err(|e| SentinelError::source_unavailable(&id, e))?;
        let decoded = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| SentinelError::source_unavailable(&id, e))?;

        let fps = decoded
            .first()
            .map(|f| {
                let (numer, denom) = f.delay().numer_denom_ms();
                if numer == 0 {
                    10.0
                } else {
                    1000.0 * denom as f64 / numer as f64
                }
            })
            .unwrap_or(10.0);

        let frames: Vec<RgbImage> = decoded
            .into_iter()
            .map(|f| DynamicImage::ImageRgba8(f.into_buffer()).to_rgb8())
            .collect();
        if frames.is_empty() {
            return Err(SentinelError::source_unavailable(id, "GIF contains no frames"));
        }
        Ok(Self::new(id, frames, fps))
    }
}

impl VideoSource for MemorySource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match self.frames.get(self.cursor) {
            Some(image) => {
                let frame = Frame {
                    index: self.cursor as u64,
                    image: image.clone(),
                };
                self.cursor += 1;
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        if self.info.kind == SourceKind::Camera {
            return Ok(());
        }
        if self.frames.is_empty() {
            return Err(SentinelError::unreadable(index, "source has no frames"));
        }
        self.cursor = (index % self.frames.len() as u64) as usize;
        Ok(())
    }

    fn close(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }
}
