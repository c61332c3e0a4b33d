/// 智能检测系统 (Person Detection)
/// - detector: 检测调用器 (串行化模型访问 + 百分比坐标归一化)
/// - yolov8: YOLOv8 ONNX 后端 (feature `onnx`)
pub mod detector;
pub mod types;
#[cfg(feature = "onnx")]
pub mod yolov8;

pub use detector::{non_max_suppression, DetectionInvoker, PersonDetector};
pub use types::{Detection, PixelBox, INF_SIZE, PERSON_CLASS_ID};
#[cfg(feature = "onnx")]
pub use yolov8::YOLOv8;

use std::path::Path;

/// 加载默认检测模型
#[cfg(feature = "onnx")]
pub fn load_detector(model_path: &Path, inference_size: u32, use_gpu: bool) -> anyhow::Result<DetectionInvoker> {
    let model = YOLOv8::new(model_path, inference_size, use_gpu)?;
    Ok(DetectionInvoker::new(model_path.display().to_string(), Box::new(model)))
}

#[cfg(not(feature = "onnx"))]
pub fn load_detector(model_path: &Path, _inference_size: u32, _use_gpu: bool) -> anyhow::Result<DetectionInvoker> {
    anyhow::bail!(
        "cannot load {}: built without the `onnx` feature",
        model_path.display()
    )
}
