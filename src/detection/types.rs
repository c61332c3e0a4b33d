/// 检测数据结构定义
/// Data structures for person detection
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

/// COCO类别: 0=person
pub const PERSON_CLASS_ID: u32 = 0;

// ========== 数据结构 ==========

/// 检测框 (像素坐标, 检测器原始输出)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl PixelBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, other: &PixelBox) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn iou(&self, other: &PixelBox) -> f32 {
        let union = self.area() + other.area() - self.intersection_area(other);
        if union <= 0.0 {
            0.0
        } else {
            self.intersection_area(other) / union
        }
    }
}

/// 检测结果 (画面百分比坐标, 与分辨率无关)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f32,      // 左上角 x (% of width)
    pub y: f32,      // 左上角 y (% of height)
    pub width: f32,  // % of width
    pub height: f32, // % of height
    pub confidence: f32,
}

impl Detection {
    /// 像素框 → 百分比坐标
    pub fn from_pixels(bbox: &PixelBox, frame_width: u32, frame_height: u32) -> Self {
        let w = frame_width.max(1) as f32;
        let h = frame_height.max(1) as f32;
        Self {
            x: bbox.x1 / w * 100.0,
            y: bbox.y1 / h * 100.0,
            width: (bbox.x2 - bbox.x1) / w * 100.0,
            height: (bbox.y2 - bbox.y1) / h * 100.0,
            confidence: crate::config::clamp_unit(bbox.confidence),
        }
    }

    /// 百分比坐标 → 像素框 (x1, y1, x2, y2)
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> (i32, i32, i32, i32) {
        let w = frame_width as f32;
        let h = frame_height as f32;
        (
            (self.x * w / 100.0) as i32,
            (self.y * h / 100.0) as i32,
            ((self.x + self.width) * w / 100.0) as i32,
            ((self.y + self.height) * h / 100.0) as i32,
        )
    }
}
