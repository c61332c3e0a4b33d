//! 检测器 (Detector)
//! 职责: 调用底层检测模型 → 过滤行人类别 → 像素坐标归一化为画面百分比

use std::time::Instant;

use image::RgbImage;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::types::{Detection, PixelBox, PERSON_CLASS_ID};
use crate::config::DetectionConfig;
use crate::error::{Result, SentinelError};

/// 底层检测模型接口
///
/// 返回原始像素坐标的检测框。实现不要求可重入,
/// 调用方通过 [`DetectionInvoker`] 串行化访问。
pub trait PersonDetector: Send {
    fn detect(&mut self, frame: &RgbImage, conf: f32, iou: f32) -> anyhow::Result<Vec<PixelBox>>;

    /// 推理设备描述 ("CPU" / "CUDA" ...)
    fn device(&self) -> &str {
        "CPU"
    }
}

/// 检测调用器: 串行化模型访问并归一化输出
pub struct DetectionInvoker {
    model: Mutex<Box<dyn PersonDetector>>,
    name: String,
}

impl DetectionInvoker {
    pub fn new(name: impl Into<String>, model: Box<dyn PersonDetector>) -> Self {
        Self {
            model: Mutex::new(model),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> String {
        self.model.lock().device().to_string()
    }

    /// 单帧检测
    ///
    /// 阈值在使用前截断到 [0,1]; 低于置信度阈值的框在这里再过滤一次,
    /// 空结果表示没有超过阈值的目标。
    pub fn detect(&self, frame: &RgbImage, config: &DetectionConfig) -> Result<Vec<Detection>> {
        let config = config.clamped();
        let (width, height) = frame.dimensions();

        let t = Instant::now();
        let raw = {
            let mut model = self.model.lock();
            model
                .detect(frame, config.conf_threshold, config.iou_threshold)
                .map_err(|e| {
                    warn!("❌ 推理失败: {:#}", e);
                    SentinelError::InferenceError(format!("{:#}", e))
                })?
        };

        let detections: Vec<Detection> = raw
            .iter()
            .filter(|b| b.class_id == PERSON_CLASS_ID && b.confidence >= config.conf_threshold)
            .map(|b| Detection::from_pixels(b, width, height))
            .collect();

        debug!(
            "🔍 原始检测: {}个 | 人{}个 | {:.1}ms",
            raw.len(),
            detections.len(),
            t.elapsed().as_secs_f64() * 1000.0
        );
        Ok(detections)
    }
}

/// 非极大值抑制: 按置信度降序, 丢弃与已保留框 IoU 超过阈值的框
pub fn non_max_suppression(xs: &mut Vec<PixelBox>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].iou(&xs[index]) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}
