//! 集成测试共用: 按像素计数的检测器、可编排的视频源
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crowd_sentinel::config::SentinelConfig;
use crowd_sentinel::context::AppContext;
use crowd_sentinel::detection::{DetectionInvoker, PersonDetector, PixelBox};
use crowd_sentinel::error::{Result, SentinelError};
use crowd_sentinel::input::{Frame, SourceHandle, SourceInfo, SourceKind, VideoSource};
use image::{Rgb, RgbImage};

/// 左上角像素的红色通道 = 人数
pub struct RedChannelCounter;

impl PersonDetector for RedChannelCounter {
    fn detect(&mut self, frame: &RgbImage, _conf: f32, _iou: f32) -> anyhow::Result<Vec<PixelBox>> {
        let n = frame.get_pixel(0, 0)[0] as usize;
        Ok((0..n)
            .map(|i| PixelBox {
                x1: i as f32,
                y1: 0.0,
                x2: i as f32 + 2.0,
                y2: 2.0,
                confidence: 0.9,
                class_id: 0,
            })
            .collect())
    }
}

pub fn context_with(settings: SentinelConfig) -> AppContext {
    AppContext::new(settings, None)
        .with_detector(DetectionInvoker::new("red-counter", Box::new(RedChannelCounter)))
}

pub fn context() -> AppContext {
    context_with(SentinelConfig::default())
}

pub fn frame_with_people(n: u8) -> RgbImage {
    RgbImage::from_pixel(16, 12, Rgb([n, 0, 0]))
}

/// 写出 PNG 图片序列目录, 每帧人数由 `counts` 给出
pub fn write_sequence(dir: &Path, counts: &[u8]) {
    std::fs::create_dir_all(dir).unwrap();
    for (i, &n) in counts.iter().enumerate() {
        frame_with_people(n)
            .save(dir.join(format!("{:04}.png", i)))
            .unwrap();
    }
}

/// 观察视频源生命周期
#[derive(Clone, Default)]
pub struct Watch {
    pub closed: Arc<AtomicBool>,
    pub reads: Arc<AtomicU64>,
}

impl Watch {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

/// 可编排的视频源: 指定帧号读失败, 摄像头模式下无限产出
pub struct ScriptedSource {
    info: SourceInfo,
    frames: Vec<RgbImage>,
    bad: HashSet<u64>,
    cursor: u64,
    watch: Watch,
}

impl ScriptedSource {
    pub fn file(frames: Vec<RgbImage>, watch: &Watch) -> Self {
        Self::build(frames, SourceKind::File, watch)
    }

    /// 循环产出 `frames`, 永不结束
    pub fn endless_camera(frames: Vec<RgbImage>, watch: &Watch) -> Self {
        Self::build(frames, SourceKind::Camera, watch)
    }

    fn build(frames: Vec<RgbImage>, kind: SourceKind, watch: &Watch) -> Self {
        let total_frames = match kind {
            SourceKind::File => Some(frames.len() as u64),
            SourceKind::Camera => None,
        };
        Self {
            info: SourceInfo {
                id: "scripted".to_string(),
                kind,
                width: 16,
                height: 12,
                fps: 30.0,
                total_frames,
            },
            frames,
            bad: HashSet::new(),
            cursor: 0,
            watch: watch.clone(),
        }
    }

    pub fn unreadable_at(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.bad.extend(indices);
        self
    }

    pub fn into_handle(self) -> SourceHandle {
        SourceHandle::new(Box::new(self))
    }
}

impl VideoSource for ScriptedSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let index = self.cursor;
        let len = self.frames.len() as u64;
        if self.info.kind == SourceKind::File && index >= len {
            return Ok(None);
        }
        self.cursor += 1;
        self.watch.reads.fetch_add(1, Ordering::SeqCst);
        if self.bad.contains(&index) {
            return Err(SentinelError::unreadable(index, "corrupt packet"));
        }
        let image = self.frames[(index % len) as usize].clone();
        Ok(Some(Frame { index, image }))
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        self.cursor = index;
        Ok(())
    }

    fn close(&mut self) {
        self.watch.closed.store(true, Ordering::SeqCst);
    }
}
