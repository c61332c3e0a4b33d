//! 推流会话 (Streaming Session)
//!
//! Idle → Opening → Streaming → (Looping | Draining) → Closed, 任意状态可进入 Failed。
//! 每轮循环: 读帧 → 检测 → 记录耗时 → 标注 → 发送事件 → 更新共享状态。
//! 停止信号只在循环边界检查,不会打断正在进行的推理。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::event::{ErrorEvent, FrameEvent, StreamEvent};
use super::processor::{FrameOptions, FrameProcessor};
use crate::context::AppContext;
use crate::error::{Result, SentinelError};
use crate::input::{open_source, SourceHandle, SourceId, SourceKind};
use crate::metrics::MetricsWindow;

/// 连续读帧失败达到该次数即认为视频源不可用
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Streaming,
    Looping,
    Draining,
    Closed,
    Failed,
}

/// 协作式停止信号
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 事件消费端, 返回 false 表示消费端已断开
pub trait EventSink {
    fn emit(&mut self, event: StreamEvent) -> bool;
}

impl EventSink for Vec<StreamEvent> {
    fn emit(&mut self, event: StreamEvent) -> bool {
        self.push(event);
        true
    }
}

impl EventSink for crossbeam_channel::Sender<StreamEvent> {
    fn emit(&mut self, event: StreamEvent) -> bool {
        self.send(event).is_ok()
    }
}

/// SSE 推流: 阻塞直到事件交给异步端 (只能在非 tokio 线程上调用)
impl EventSink for tokio::sync::mpsc::Sender<StreamEvent> {
    fn emit(&mut self, event: StreamEvent) -> bool {
        self.blocking_send(event).is_ok()
    }
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub looping: bool, // 文件源播放结束后从头循环
    pub max_frames: Option<u64>,
    pub pacing: Option<Duration>,
    pub frame: FrameOptions,
    pub jpeg_quality: u8,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            looping: true,
            max_frames: None,
            pacing: None,
            frame: FrameOptions::default(),
            jpeg_quality: 85,
        }
    }
}

impl SessionOptions {
    pub fn from_context(ctx: &AppContext) -> Self {
        Self {
            pacing: ctx.settings().stream_pacing(),
            jpeg_quality: ctx.settings().jpeg_quality,
            ..Self::default()
        }
    }
}

/// 会话统计
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub frames: u64,
    pub total_people: u64,
    pub loops: u64,
    pub skipped: u64,
}

impl SessionSummary {
    pub fn average_people(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total_people as f64 / self.frames as f64
        }
    }
}

pub struct StreamingSession<'a> {
    ctx: &'a AppContext,
    options: SessionOptions,
    stop: StopSignal,
    generation: u64,
    state: SessionState,
    history: Vec<SessionState>,
    metrics: MetricsWindow,
    summary: SessionSummary,
}

impl<'a> StreamingSession<'a> {
    pub fn new(ctx: &'a AppContext, options: SessionOptions, stop: StopSignal) -> Self {
        Self {
            ctx,
            options,
            stop,
            generation: ctx.generation(),
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
            metrics: MetricsWindow::new(),
            summary: SessionSummary::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 经历过的全部状态 (按顺序)
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("🔁 会话状态 {:?} → {:?}", self.state, next);
            self.state = next;
            self.history.push(next);
        }
    }

    fn should_stop(&self) -> bool {
        self.stop.is_stopped() || self.ctx.generation() != self.generation
    }

    /// 打开视频源并推流, 直到源结束、停止或失败
    pub fn run(&mut self, id: &SourceId, sink: &mut dyn EventSink) -> Result<SessionSummary> {
        self.run_with(|| open_source(id), sink)
    }

    pub fn run_with<F>(&mut self, open: F, sink: &mut dyn EventSink) -> Result<SessionSummary>
    where
        F: FnOnce() -> Result<SourceHandle>,
    {
        let ctx = self.ctx;
        self.transition(SessionState::Opening);
        let invoker = match ctx.detector() {
            Ok(invoker) => invoker,
            Err(e) => return self.fail(None, e, sink),
        };
        let mut source = match open() {
            Ok(source) => source,
            Err(e) => return self.fail(None, e, sink),
        };

        let info = source.info().clone();
        info!(
            "▶️ 推流开始: {} | {}x{} | {:.1}fps | {:?}",
            info.id, info.width, info.height, info.fps, info.kind
        );
        self.transition(SessionState::Streaming);

        let processor = FrameProcessor::new(&invoker, ctx.annotator(), self.options.jpeg_quality);
        let mut consecutive_failures = 0u32;
        let mut read_since_loop = false;

        loop {
            if self.should_stop() {
                info!("🛑 收到停止信号");
                self.transition(SessionState::Draining);
                break;
            }
            if let Some(max) = self.options.max_frames {
                if self.summary.frames >= max {
                    self.transition(SessionState::Draining);
                    break;
                }
            }
            let started = Instant::now();

            let frame = match source.read() {
                Ok(Some(frame)) => {
                    consecutive_failures = 0;
                    read_since_loop = true;
                    frame
                }
                Ok(None) => {
                    if info.kind == SourceKind::File && self.options.looping {
                        if !read_since_loop {
                            let e = SentinelError::unreadable(0, "source produced no frames");
                            return self.fail(Some(&mut source), e, sink);
                        }
                        self.transition(SessionState::Looping);
                        if let Err(e) = source.seek(0) {
                            return self.fail(Some(&mut source), e, sink);
                        }
                        self.summary.loops += 1;
                        read_since_loop = false;
                        debug!("🔁 视频循环 #{}", self.summary.loops);
                        self.transition(SessionState::Streaming);
                        continue;
                    }
                    info!("⏹️ 视频源结束");
                    self.transition(SessionState::Draining);
                    break;
                }
                Err(e) if e.is_source_fatal() => return self.fail(Some(&mut source), e, sink),
                Err(e) => {
                    consecutive_failures += 1;
                    self.summary.skipped += 1;
                    warn!("⚠️ 跳过坏帧 ({}/{}): {}", consecutive_failures, MAX_CONSECUTIVE_FAILURES, e);
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        let e = SentinelError::source_unavailable(
                            info.id.clone(),
                            format!("{} consecutive unreadable frames", consecutive_failures),
                        );
                        return self.fail(Some(&mut source), e, sink);
                    }
                    if !sink.emit(StreamEvent::Error(ErrorEvent::new(&e, None))) {
                        self.transition(SessionState::Draining);
                        break;
                    }
                    continue;
                }
            };

            let config = ctx.detection_config();
            let frame_number = self.summary.frames;
            match processor.process(started, &frame.image, &config, &mut self.metrics, self.options.frame) {
                Ok(result) => {
                    ctx.state().publish(result.to_published());
                    self.summary.frames += 1;
                    self.summary.total_people += result.count as u64;
                    let event = StreamEvent::Frame(FrameEvent {
                        frame: result.frame,
                        frame_number,
                        source_frame: frame.index,
                        count: result.count,
                        detections: result.detections,
                        timestamp: result.timestamp,
                        fps: result.fps,
                    });
                    // 慢消费端在这里形成背压
                    if !sink.emit(event) {
                        info!("🔌 消费端已断开");
                        self.transition(SessionState::Draining);
                        break;
                    }
                }
                Err(e) => {
                    self.summary.skipped += 1;
                    warn!("⚠️ 第{}帧处理失败, 跳过: {}", frame.index, e);
                    if !sink.emit(StreamEvent::Error(ErrorEvent::new(&e, Some(frame_number)))) {
                        self.transition(SessionState::Draining);
                        break;
                    }
                }
            }

            if let Some(pacing) = self.options.pacing {
                let elapsed = started.elapsed();
                if elapsed < pacing {
                    std::thread::sleep(pacing - elapsed);
                }
            }
        }

        source.close();
        self.transition(SessionState::Closed);
        info!(
            "✅ 推流结束: {}帧 | 循环{}次 | 跳过{}帧",
            self.summary.frames, self.summary.loops, self.summary.skipped
        );
        Ok(self.summary.clone())
    }

    fn fail(
        &mut self,
        source: Option<&mut SourceHandle>,
        err: SentinelError,
        sink: &mut dyn EventSink,
    ) -> Result<SessionSummary> {
        error!("❌ 推流失败: {}", err);
        if let Some(source) = source {
            source.close();
        }
        let _ = sink.emit(StreamEvent::Error(ErrorEvent::new(&err, None)));
        self.transition(SessionState::Failed);
        Err(err)
    }
}
