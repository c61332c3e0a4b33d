//! 单帧处理: 检测 → 记录耗时 (读帧 + 检测) → 标注 → JPEG/base64 编码

use std::time::Instant;

use chrono::Local;
use image::RgbImage;
use serde::Serialize;

use super::state::PublishedResult;
use crate::annotate::{encode_jpeg_base64, FrameAnnotator};
use crate::config::DetectionConfig;
use crate::detection::{Detection, DetectionInvoker};
use crate::error::Result;
use crate::metrics::MetricsWindow;

#[derive(Clone, Copy, Debug)]
pub struct FrameOptions {
    pub annotate: bool,
    pub show_overlay: bool,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            annotate: true,
            show_overlay: true,
        }
    }
}

/// 单帧处理结果
#[derive(Clone, Debug, Serialize)]
pub struct ProcessedFrame {
    pub frame: String,
    pub detections: Vec<Detection>,
    pub count: usize,
    pub fps: f64,
    pub processing_time: f64, // 秒, 从读帧开始到检测结束
    pub timestamp: String,
}

impl ProcessedFrame {
    pub fn to_published(&self) -> PublishedResult {
        PublishedResult {
            frame: self.frame.clone(),
            detections: self.detections.clone(),
            timestamp: self.timestamp.clone(),
            fps: self.fps,
        }
    }
}

pub struct FrameProcessor<'a> {
    invoker: &'a DetectionInvoker,
    annotator: &'a FrameAnnotator,
    jpeg_quality: u8,
}

impl<'a> FrameProcessor<'a> {
    pub fn new(invoker: &'a DetectionInvoker, annotator: &'a FrameAnnotator, jpeg_quality: u8) -> Self {
        Self {
            invoker,
            annotator,
            jpeg_quality,
        }
    }

    /// 原始帧只读, 标注在副本上进行
    ///
    /// `started` 为读帧前的时刻, 耗时与 FPS 窗口都从这里计起。
    pub fn process(
        &self,
        started: Instant,
        image: &RgbImage,
        config: &DetectionConfig,
        metrics: &mut MetricsWindow,
        options: FrameOptions,
    ) -> Result<ProcessedFrame> {
        let detections = self.invoker.detect(image, config)?;
        let elapsed = started.elapsed().as_secs_f64();
        metrics.record_duration(elapsed);
        let fps = metrics.current_fps();

        let now = Local::now();
        let encoded = match (options.annotate, options.show_overlay) {
            (false, false) => encode_jpeg_base64(image, self.jpeg_quality)?,
            (annotate, overlay) => {
                let mut output = if annotate {
                    self.annotator.draw_detections(image, &detections)
                } else {
                    image.clone()
                };
                if overlay {
                    output = self.annotator.draw_status_overlay(
                        &output,
                        detections.len(),
                        fps,
                        &config.clamped(),
                        &now,
                    );
                }
                encode_jpeg_base64(&output, self.jpeg_quality)?
            }
        };

        Ok(ProcessedFrame {
            frame: encoded,
            count: detections.len(),
            detections,
            fps,
            processing_time: elapsed,
            timestamp: now.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{PersonDetector, PixelBox};
    use image::Rgb;

    struct OnePerson;

    impl PersonDetector for OnePerson {
        fn detect(&mut self, _: &RgbImage, _: f32, _: f32) -> anyhow::Result<Vec<PixelBox>> {
            Ok(vec![PixelBox {
                x1: 2.0,
                y1: 2.0,
                x2: 10.0,
                y2: 12.0,
                confidence: 0.75,
                class_id: 0,
            }])
        }
    }

    #[test]
    fn test_process_records_metrics_and_keeps_frame() {
        let invoker = DetectionInvoker::new("one", Box::new(OnePerson));
        let annotator = FrameAnnotator::default();
        let processor = FrameProcessor::new(&invoker, &annotator, 80);
        let image = RgbImage::from_pixel(32, 24, Rgb([50, 60, 70]));
        let mut metrics = MetricsWindow::new();

        let out = processor
            .process(Instant::now(), &image, &DetectionConfig::default(), &mut metrics, FrameOptions::default())
            .unwrap();
        assert_eq!(out.count, 1);
        assert_eq!(metrics.len(), 1);
        assert!(!out.frame.is_empty());
        assert!(image.pixels().all(|p| *p == Rgb([50, 60, 70])));
        assert_eq!(out.to_published().detections.len(), 1);
    }

    #[test]
    fn test_processing_time_counts_from_read_start() {
        let invoker = DetectionInvoker::new("one", Box::new(OnePerson));
        let annotator = FrameAnnotator::default();
        let processor = FrameProcessor::new(&invoker, &annotator, 80);
        let image = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        let mut metrics = MetricsWindow::new();

        // 模拟读帧耗时
        let started = Instant::now() - std::time::Duration::from_millis(50);
        let out = processor
            .process(started, &image, &DetectionConfig::default(), &mut metrics, FrameOptions::default())
            .unwrap();
        assert!(out.processing_time >= 0.05, "processing_time = {}", out.processing_time);
        assert!(out.fps <= 20.0);
    }
}
