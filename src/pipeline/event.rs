//! 推流事件: 每处理一帧发送一个 FrameEvent, 流内错误发送 ErrorEvent

use serde::Serialize;

use crate::detection::Detection;
use crate::error::SentinelError;

/// 单帧结果
#[derive(Clone, Debug, Serialize)]
pub struct FrameEvent {
    pub frame: String,      // base64 JPEG
    pub frame_number: u64,  // 会话内递增序号
    pub source_frame: u64,  // 源内帧号 (循环后从0开始)
    pub count: usize,
    pub detections: Vec<Detection>,
    pub timestamp: String,
    pub fps: f64,
}

/// 流内错误 (不中断传输)
#[derive(Clone, Debug, Serialize)]
pub struct ErrorEvent {
    pub error: String,
    pub cause: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_number: Option<u64>,
}

impl ErrorEvent {
    pub fn new(err: &SentinelError, frame_number: Option<u64>) -> Self {
        Self {
            error: err.to_string(),
            cause: err.cause_tag(),
            frame_number,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Frame(FrameEvent),
    Error(ErrorEvent),
}

impl StreamEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, StreamEvent::Error(_))
    }

    /// SSE 帧: `data: <json>\n\n`
    pub fn to_sse(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("data: {}\n\n", json),
            Err(e) => format!(
                "data: {{\"error\":\"{}\",\"cause\":\"encode_error\"}}\n\n",
                e.to_string().replace('"', "'")
            ),
        }
    }
}
