// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 行人检测模型
// 包含: 模型加载、预处理 (letterbox)、推理、后处理 (NMS)

use std::path::Path;

use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::Array4;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use super::detector::{non_max_suppression, PersonDetector};
use super::types::{PixelBox, PERSON_CLASS_ID};

const CXYWH_OFFSET: usize = 4;

/// YOLOv8 ONNX 模型
pub struct YOLOv8 {
    session: Session,
    size: u32,
    device: String,
}

impl YOLOv8 {
    /// 加载ONNX模型, `use_gpu` 时注册 CUDA (不可用时 ort 自动回退 CPU)
    pub fn new(model_path: &Path, inference_size: u32, use_gpu: bool) -> Result<Self> {
        let mut builder = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to set optimization level")?;
        if use_gpu {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .context("failed to register execution providers")?;
        }
        let session = builder
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load YOLOv8 model {}", model_path.display()))?;

        let device = if use_gpu { "CUDA" } else { "CPU" }.to_string();
        info!(
            "✅ YOLOv8 检测模型加载成功: {} | {}x{} | {}",
            model_path.display(),
            inference_size,
            inference_size,
            device
        );
        Ok(Self {
            session,
            size: inference_size,
            device,
        })
    }

    fn scale_wh(&self, w0: f32, h0: f32) -> (f32, u32, u32) {
        let s = self.size as f32;
        let r = (s / w0).min(s / h0);
        (r, ((w0 * r).round() as u32).max(1), ((h0 * r).round() as u32).max(1))
    }

    /// letterbox: 等比缩放贴到左上角, 其余填充 144/255
    fn preprocess(&self, frame: &RgbImage) -> Result<(Array4<f32>, f32)> {
        let (w0, h0) = frame.dimensions();
        let (ratio, w_new, h_new) = self.scale_wh(w0 as f32, h0 as f32);

        let src = fr::images::ImageRef::new(w0, h0, frame.as_raw(), fr::PixelType::U8x3)
            .context("failed to create resize source")?;
        let mut dst = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
        let options =
            fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
        fr::Resizer::new()
            .resize(&src, &mut dst, &options)
            .context("letterbox resize failed")?;

        let size = self.size as usize;
        let mut ys = Array4::from_elem((1, 3, size, size), 144.0 / 255.0);
        let raw = dst.buffer();
        for y in 0..h_new as usize {
            for x in 0..w_new as usize {
                let i = (y * w_new as usize + x) * 3;
                ys[[0, 0, y, x]] = raw[i] as f32 / 255.0;
                ys[[0, 1, y, x]] = raw[i + 1] as f32 / 255.0;
                ys[[0, 2, y, x]] = raw[i + 2] as f32 / 255.0;
            }
        }
        Ok((ys, ratio))
    }
}

impl PersonDetector for YOLOv8 {
    fn detect(&mut self, frame: &RgbImage, conf: f32, iou: f32) -> Result<Vec<PixelBox>> {
        let (width_original, height_original) = (frame.width() as f32, frame.height() as f32);
        let (input, ratio) = self.preprocess(frame)?;
        let input = Tensor::from_array(input).context("failed to create input tensor")?;

        let outputs = self
            .session
            .run(ort::inputs!["images" => input])
            .context("YOLOv8 inference failed")?;

        let (shape, data) = outputs
            .get("output0")
            .context("YOLOv8 model has no `output0` output")?
            .try_extract_tensor::<f32>()
            .context("failed to extract YOLOv8 output tensor")?;
        let mut boxes = decode_output(shape, data, ratio, (width_original, height_original), conf)?;
        non_max_suppression(&mut boxes, iou);
        Ok(boxes)
    }

    fn device(&self) -> &str {
        &self.device
    }
}

/// 解码输出张量 [1, 4 + nc, anchors], 只保留最高分类别为行人的锚点
fn decode_output(
    shape: &[i64],
    data: &[f32],
    ratio: f32,
    (width_original, height_original): (f32, f32),
    conf: f32,
) -> Result<Vec<PixelBox>> {
    if shape.len() != 3 || shape[1] as usize <= CXYWH_OFFSET {
        anyhow::bail!("unexpected YOLOv8 output shape {:?}", shape);
    }
    let rows = shape[1] as usize;
    let anchors = shape[2] as usize;
    if data.len() < rows * anchors {
        anyhow::bail!(
            "YOLOv8 output has {} values, shape {:?} needs {}",
            data.len(),
            shape,
            rows * anchors
        );
    }
    let at = |row: usize, i: usize| data[row * anchors + i];

    let mut boxes = Vec::new();
    for i in 0..anchors {
        // 只保留行人类别的置信度
        let confidence = at(CXYWH_OFFSET + PERSON_CLASS_ID as usize, i);
        if confidence < conf {
            continue;
        }
        // 该锚点上的最高分类别必须是行人
        let best = (CXYWH_OFFSET..rows)
            .map(|row| at(row, i))
            .fold(f32::MIN, f32::max);
        if best > confidence {
            continue;
        }

        let cx = at(0, i) / ratio;
        let cy = at(1, i) / ratio;
        let w = at(2, i) / ratio;
        let h = at(3, i) / ratio;
        boxes.push(PixelBox {
            x1: (cx - w / 2.0).clamp(0.0, width_original),
            y1: (cy - h / 2.0).clamp(0.0, height_original),
            x2: (cx + w / 2.0).clamp(0.0, width_original),
            y2: (cy + h / 2.0).clamp(0.0, height_original),
            confidence,
            class_id: PERSON_CLASS_ID,
        });
    }
    Ok(boxes)
}
