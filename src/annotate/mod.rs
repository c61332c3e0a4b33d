/// 帧标注 (Frame Annotator)
///
/// 在帧的副本上绘制检测框、标签与 CCTV 风格的状态栏,原始帧保持不变。
pub mod font;

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use tracing::warn;

pub use font::OverlayFont;

use crate::config::DetectionConfig;
use crate::detection::Detection;
use crate::error::{Result, SentinelError};

// ========== 颜色 ==========
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const GRAY: Rgb<u8> = Rgb([200, 200, 200]);

/// 状态栏高度
pub const OVERLAY_HEIGHT: u32 = 80;
/// 状态栏保留原像素的比例
const OVERLAY_KEEP: f32 = 0.7;

const BOX_THICKNESS: i32 = 2;
const LABEL_SIZE: f32 = 14.0;
const MARGIN: i32 = 10;
const GAP: i32 = 20;

/// 状态栏第一行字号候选 (时间戳/FPS, 人数), 依次尝试直到三段文字互不重叠
const PRIMARY_SIZES: [(f32, f32); 3] = [(16.0, 24.0), (16.0, 16.0), (8.0, 8.0)];
const CONFIG_SIZE: f32 = 14.0;

/// 文字在画面中的占位 (左上角 + 尺寸)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextBox {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl TextBox {
    pub fn right(&self) -> i32 {
        self.x + self.w as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h as i32
    }

    pub fn overlaps(&self, other: &TextBox) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// 状态栏排版结果
#[derive(Clone, Debug)]
pub struct StatusLayout {
    pub timestamp: TextBox,
    pub count: TextBox,
    pub fps: TextBox,
    pub config: TextBox,
    primary_size: f32,
    count_size: f32,
}

pub struct FrameAnnotator {
    font: OverlayFont,
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self {
            font: OverlayFont::Bitmap,
        }
    }
}

impl FrameAnnotator {
    pub fn new(font: OverlayFont) -> Self {
        Self { font }
    }

    /// 有字体路径时加载 TrueType, 失败则退回点阵字体
    pub fn from_font_path(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match OverlayFont::load(path) {
                Ok(font) => Self::new(font),
                Err(e) => {
                    warn!("⚠️ 字体加载失败: {:#}, 使用内置点阵字体", e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    /// 绘制检测框与 "Person {conf:.2}" 标签
    pub fn draw_detections(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut annotated = frame.clone();
        let (fw, fh) = frame.dimensions();

        for det in detections {
            let (x1, y1, x2, y2) = det.to_pixels(fw, fh);
            for t in 0..BOX_THICKNESS {
                let w = (x2 - x1 - 2 * t).max(1) as u32;
                let h = (y2 - y1 - 2 * t).max(1) as u32;
                draw_hollow_rect_mut(&mut annotated, Rect::at(x1 + t, y1 + t).of_size(w, h), GREEN);
            }

            let label = format!("Person {:.2}", det.confidence);
            let (tw, th) = self.font.text_size(&label, LABEL_SIZE);
            // 标签在框上方, 但不超出画面顶部
            let label_y = y1.max(th as i32 + 10);
            draw_filled_rect_mut(
                &mut annotated,
                Rect::at(x1, label_y - th as i32 - 10).of_size(tw.max(1), th + 15),
                GREEN,
            );
            self.font.draw(
                &mut annotated,
                &label,
                x1,
                label_y - th as i32 - 5,
                LABEL_SIZE,
                BLACK,
            );
        }
        annotated
    }

    /// 计算状态栏文字位置
    pub fn layout_status(&self, width: u32, timestamp: &str, count: &str, fps: &str, config: &str) -> StatusLayout {
        let w = width as i32;
        let mut chosen = PRIMARY_SIZES[PRIMARY_SIZES.len() - 1];
        for (primary, count_size) in PRIMARY_SIZES {
            let total = self.font.text_size(timestamp, primary).0
                + self.font.text_size(count, count_size).0
                + self.font.text_size(fps, primary).0;
            if total as i32 + 2 * MARGIN + 2 * GAP <= w {
                chosen = (primary, count_size);
                break;
            }
        }
        let (primary_size, count_size) = chosen;

        let (ts_w, ts_h) = self.font.text_size(timestamp, primary_size);
        let (ct_w, ct_h) = self.font.text_size(count, count_size);
        let (fp_w, fp_h) = self.font.text_size(fps, primary_size);
        let (cf_w, cf_h) = self.font.text_size(config, CONFIG_SIZE);

        let line_h = ts_h.max(ct_h).max(fp_h) as i32;
        let top = 14;
        let timestamp_box = TextBox {
            x: MARGIN,
            y: top + (line_h - ts_h as i32) / 2,
            w: ts_w,
            h: ts_h,
        };
        let fps_box = TextBox {
            x: w - fp_w as i32 - MARGIN,
            y: top + (line_h - fp_h as i32) / 2,
            w: fp_w,
            h: fp_h,
        };
        // 人数居中, 必要时向右让开时间戳
        let centered = (w - ct_w as i32) / 2;
        let count_x = centered
            .max(timestamp_box.right() + GAP)
            .min(fps_box.x - GAP - ct_w as i32);
        let count_box = TextBox {
            x: count_x,
            y: top + (line_h - ct_h as i32) / 2,
            w: ct_w,
            h: ct_h,
        };
        let config_box = TextBox {
            x: MARGIN,
            y: top + line_h + 12,
            w: cf_w,
            h: cf_h,
        };

        StatusLayout {
            timestamp: timestamp_box,
            count: count_box,
            fps: fps_box,
            config: config_box,
            primary_size,
            count_size,
        }
    }

    /// 绘制半透明状态栏: 时间戳 | PEOPLE | FPS, 第二行为当前阈值
    pub fn draw_status_overlay(
        &self,
        frame: &RgbImage,
        count: usize,
        fps: f64,
        config: &DetectionConfig,
        timestamp: &DateTime<Local>,
    ) -> RgbImage {
        let mut out = frame.clone();
        let (width, height) = out.dimensions();

        // 顶部 80 行: 70% 原像素 + 30% 黑色
        for y in 0..OVERLAY_HEIGHT.min(height) {
            for x in 0..width {
                let p = out.get_pixel_mut(x, y);
                for c in p.0.iter_mut() {
                    *c = (*c as f32 * OVERLAY_KEEP).round() as u8;
                }
            }
        }

        let ts_text = format!("CCTV - {}", timestamp.format("%Y-%m-%d %H:%M:%S"));
        let count_text = format!("PEOPLE: {}", count);
        let fps_text = format!("FPS: {:.1}", fps);
        let config_text = format!(
            "Conf: {} | IoU: {}",
            config.conf_threshold, config.iou_threshold
        );
        let layout = self.layout_status(width, &ts_text, &count_text, &fps_text, &config_text);

        let font = &self.font;
        font.draw(&mut out, &ts_text, layout.timestamp.x, layout.timestamp.y, layout.primary_size, WHITE);
        font.draw(&mut out, &count_text, layout.count.x, layout.count.y, layout.count_size, GREEN);
        font.draw(&mut out, &fps_text, layout.fps.x, layout.fps.y, layout.primary_size, YELLOW);
        font.draw(&mut out, &config_text, layout.config.x, layout.config.y, CONFIG_SIZE, GRAY);
        out
    }
}

/// JPEG 编码后转 base64 文本
pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| SentinelError::Encode(e.to_string()))?;
    Ok(STANDARD.encode(buf.into_inner()))
}

/// 解码 base64 图片, 允许 data URL 前缀 (data:image/jpeg;base64,...)
pub fn decode_base64_image(data: &str) -> Result<RgbImage> {
    let payload = match data.split_once(',') {
        Some((header, body)) if header.starts_with("data:") => body,
        _ => data,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| SentinelError::InvalidRequest(format!("invalid base64 image: {}", e)))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| SentinelError::InvalidRequest(format!("cannot decode image: {}", e)))?;
    Ok(image.to_rgb8())
}
