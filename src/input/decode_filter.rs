/// FFmpeg解码过滤器模块
/// FFmpeg decode filter module
///
/// 解码线程把 rgb24 帧拷贝成 RgbImage 后送入有界通道,
/// 读取端不取帧时发送阻塞, 形成自然的背压。
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, warn};

/// FFmpeg解码过滤器: 视频流 → RGB帧
pub struct DecodeFilter {
    tx: Sender<RgbImage>,
    stop: Arc<AtomicBool>, // 置位后停止解码
    pub total_frames: usize,
    pub dropped_frames: usize,
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stop,
            total_frames: 0,
            dropped_frames: 0,
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        if self.stop.load(Ordering::Relaxed) {
            return Err("decoder stopped".to_string());
        }

        unsafe {
            self.total_frames += 1;

            // 基本检查：空帧或损坏帧
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.dropped_frames += 1;
                return Ok(None);
            }

            let raw = &*frame.as_ptr();
            let w = raw.width as u32;
            let h = raw.height as u32;
            let plane = raw.data[0];
            let stride = raw.linesize[0] as usize;

            if w == 0 || h == 0 || plane.is_null() || stride < w as usize * 3 {
                self.dropped_frames += 1;
                warn!("⚠️ 丢弃帧 #{}: 非法尺寸 {}x{} 步长 {}", self.total_frames, w, h, stride);
                return Ok(None);
            }

            // rgb24 按行拷贝 (去掉行尾填充)
            let row_bytes = w as usize * 3;
            let mut buffer = Vec::with_capacity(row_bytes * h as usize);
            for y in 0..h as usize {
                let row = std::slice::from_raw_parts(plane.add(y * stride), row_bytes);
                buffer.extend_from_slice(row);
            }

            let Some(image) = RgbImage::from_raw(w, h, buffer) else {
                self.dropped_frames += 1;
                return Ok(None);
            };

            // 读取端已关闭 → 结束解码
            if self.tx.send(image).is_err() {
                return Err("frame receiver closed".to_string());
            }
            Ok(Some(frame))
        }
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        debug!(
            "✅ 解码线程退出 | 总帧{} | 丢弃{}",
            self.total_frames, self.dropped_frames
        );
    }
}
