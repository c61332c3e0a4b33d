/// 检测流水线 (Detection Pipeline)
///
/// - processor: 单帧处理 (检测 → 指标 → 标注 → 编码)
/// - session:   推流会话状态机, 每帧一个事件
/// - ondemand:  单帧请求/响应、上传帧检测、整段视频统计
/// - state:     进程级共享检测结果
/// - event:     推流事件与 SSE 编码
pub mod event;
pub mod ondemand;
pub mod processor;
pub mod session;
pub mod state;

pub use event::{ErrorEvent, FrameEvent, StreamEvent};
pub use ondemand::{FrameRequest, FrameResponse, VideoAnalysis, VideoInfo};
pub use processor::{FrameOptions, FrameProcessor, ProcessedFrame};
pub use session::{
    EventSink, SessionOptions, SessionState, SessionSummary, StopSignal, StreamingSession,
    MAX_CONSECUTIVE_FAILURES,
};
pub use state::{DetectionSnapshot, PublishedResult, SharedDetectionState};
