/// 错误类型 (Error taxonomy)
///
/// 流媒体会话与按需接口共用同一套错误分类,每个变体都带一个稳定的 cause 标签,
/// 供 HTTP 错误体与 SSE 流内错误事件使用。
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentinelError {
    /// 视频源无法打开 (会话启动失败)
    #[error("cannot open video source `{source_id}`: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// 读帧失败 (重试一次后仍失败)
    #[error("failed to read frame {index}: {reason}")]
    UnreadableFrame { index: u64, reason: String },

    /// 推理失败
    #[error("inference failed: {0}")]
    InferenceError(String),

    /// 配置校验失败,保留旧配置
    #[error("invalid value for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("YOLOv8 model not initialized")]
    ModelNotLoaded,

    #[error("failed to initialize YOLOv8 model: {0}")]
    ModelLoad(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("frame encoding failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SentinelError {
    pub fn source_unavailable(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unreadable(index: u64, reason: impl ToString) -> Self {
        Self::UnreadableFrame {
            index,
            reason: reason.to_string(),
        }
    }

    pub fn invalid_config(field: &'static str, reason: impl ToString) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.to_string(),
        }
    }

    /// 稳定的错误标签
    pub fn cause_tag(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::UnreadableFrame { .. } => "unreadable_frame",
            Self::InferenceError(_) => "inference_error",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::ModelNotLoaded => "model_not_loaded",
            Self::ModelLoad(_) => "model_load_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Encode(_) => "encode_error",
            Self::Io(_) => "io_error",
        }
    }

    /// 视频源本身是否已不可用 (流媒体会话据此决定是否终止)
    pub fn is_source_fatal(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. } | Self::Io(_))
    }
}

pub type Result<T, E = SentinelError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_tags() {
        assert_eq!(
            SentinelError::source_unavailable("webcam", "busy").cause_tag(),
            "source_unavailable"
        );
        assert_eq!(
            SentinelError::invalid_config("conf_threshold", "out of range").cause_tag(),
            "invalid_config"
        );
        assert_eq!(SentinelError::ModelNotLoaded.cause_tag(), "model_not_loaded");
    }

    #[test]
    fn test_only_source_errors_are_fatal() {
        assert!(SentinelError::source_unavailable("a.mp4", "gone").is_source_fatal());
        assert!(!SentinelError::unreadable(3, "corrupt").is_source_fatal());
        assert!(!SentinelError::InferenceError("oom".into()).is_source_fatal());
    }

    #[test]
    fn test_invalid_config_names_field() {
        let err = SentinelError::invalid_config("iou_threshold", "must be within [0, 1]");
        assert!(err.to_string().contains("iou_threshold"));
    }
}
