//! 应用上下文 - 检测模型、检测参数、共享结果、指标窗口等进程级状态
//!
//! 所有操作显式接收 `&AppContext`,不使用全局单例。

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::annotate::FrameAnnotator;
use crate::assistant::AssistantClient;
use crate::config::{ConfigUpdate, DetectionConfig, SentinelConfig};
use crate::detection::{self, DetectionInvoker};
use crate::error::{Result, SentinelError};
use crate::metrics::MetricsWindow;
use crate::pipeline::SharedDetectionState;
use crate::profiles::ProfileStore;

/// 按设备加载检测模型 (`use_gpu`)
pub type DetectorLoader = dyn Fn(&SentinelConfig, bool) -> anyhow::Result<DetectionInvoker> + Send + Sync;

struct LoadedDetector {
    invoker: Arc<DetectionInvoker>,
    use_gpu: Option<bool>, // None: 外部注入, 不随设备切换重新加载
}

pub struct AppContext {
    settings: SentinelConfig,
    detection: RwLock<DetectionConfig>,
    detector: RwLock<Option<LoadedDetector>>,
    loader: Box<DetectorLoader>,
    annotator: FrameAnnotator,
    state: SharedDetectionState,
    metrics: Mutex<MetricsWindow>, // 按需接口共用的指标窗口
    video: RwLock<PathBuf>,
    generation: AtomicU64, // 每次停止推流 +1
    profiles: ProfileStore,
    assistant: AssistantClient,
}

impl AppContext {
    pub fn new(settings: SentinelConfig, api_key: Option<String>) -> Self {
        let annotator = FrameAnnotator::from_font_path(settings.font_path.as_deref());
        let assistant = AssistantClient::new(settings.assistant.clone(), api_key);
        let video = settings.video_path(&settings.default_video);
        Self {
            detection: RwLock::new(settings.detection),
            detector: RwLock::new(None),
            loader: Box::new(|settings: &SentinelConfig, use_gpu: bool| {
                detection::load_detector(&settings.model_path, settings.inference_size, use_gpu)
            }),
            annotator,
            state: SharedDetectionState::new(),
            metrics: Mutex::new(MetricsWindow::new()),
            video: RwLock::new(video),
            generation: AtomicU64::new(0),
            profiles: ProfileStore::new(),
            assistant,
            settings,
        }
    }

    /// 注入已加载的检测器
    pub fn with_detector(self, invoker: DetectionInvoker) -> Self {
        *self.detector.write() = Some(LoadedDetector {
            invoker: Arc::new(invoker),
            use_gpu: None,
        });
        self
    }

    /// 替换模型加载方式
    pub fn with_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&SentinelConfig, bool) -> anyhow::Result<DetectionInvoker> + Send + Sync + 'static,
    {
        self.loader = Box::new(loader);
        self
    }

    pub fn settings(&self) -> &SentinelConfig {
        &self.settings
    }

    // ========== 检测参数 ==========

    pub fn detection_config(&self) -> DetectionConfig {
        *self.detection.read()
    }

    /// 校验并应用更新, 失败时保留旧配置
    ///
    /// 模型已加载且 `use_gpu` 变化时先按新设备重新加载, 加载失败则整体拒绝。
    pub fn update_config(&self, update: &ConfigUpdate) -> Result<DetectionConfig> {
        let mut guard = self.detection.write();
        let next = guard.apply(update)?;
        if next.use_gpu != guard.use_gpu && self.is_model_loaded() {
            self.load_detector_for(next.use_gpu)
                .map_err(|e| SentinelError::ModelLoad(format!("{:#}", e)))?;
        }
        *guard = next;
        info!(
            "⚙️ 检测参数更新: conf={} iou={} gpu={}",
            next.conf_threshold, next.iou_threshold, next.use_gpu
        );
        Ok(next)
    }

    // ========== 检测模型 ==========

    pub fn detector(&self) -> Result<Arc<DetectionInvoker>> {
        self.detector
            .read()
            .as_ref()
            .map(|loaded| loaded.invoker.clone())
            .ok_or(SentinelError::ModelNotLoaded)
    }

    pub fn is_model_loaded(&self) -> bool {
        self.detector.read().is_some()
    }

    /// 按当前检测参数的设备加载模型, 已加载时直接返回
    pub fn ensure_detector(&self) -> anyhow::Result<Arc<DetectionInvoker>> {
        let use_gpu = self.detection.read().use_gpu;
        self.load_detector_for(use_gpu)
    }

    /// 按指定设备加载模型; 同一设备只加载一次, 加载失败时保留原模型
    pub fn load_detector_for(&self, use_gpu: bool) -> anyhow::Result<Arc<DetectionInvoker>> {
        let mut guard = self.detector.write();
        if let Some(loaded) = guard.as_ref() {
            if loaded.use_gpu.map_or(true, |gpu| gpu == use_gpu) {
                return Ok(loaded.invoker.clone());
            }
        }
        let invoker = Arc::new((self.loader)(&self.settings, use_gpu).map_err(|e| {
            warn!("❌ 模型加载失败 (gpu={}): {:#}", use_gpu, e);
            e
        })?);
        info!("🧠 模型已加载: {} | {}", invoker.name(), invoker.device());
        *guard = Some(LoadedDetector {
            invoker: invoker.clone(),
            use_gpu: Some(use_gpu),
        });
        Ok(invoker)
    }

    // ========== 视频 ==========

    pub fn video_path(&self) -> PathBuf {
        self.video.read().clone()
    }

    /// 选择 assets 目录下的视频, 文件不存在时返回 SourceUnavailable
    pub fn select_video(&self, name: &str) -> Result<PathBuf> {
        let path = self.settings.resolve_video(name)?;
        self.set_video(path.clone());
        Ok(path)
    }

    /// 切换到已解析的视频路径
    pub fn set_video(&self, path: PathBuf) {
        *self.video.write() = path;
    }

    // ========== 共享状态 ==========

    pub fn state(&self) -> &SharedDetectionState {
        &self.state
    }

    pub fn annotator(&self) -> &FrameAnnotator {
        &self.annotator
    }

    pub fn metrics(&self) -> &Mutex<MetricsWindow> {
        &self.metrics
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// 通知所有推流会话在下一轮循环前停止
    pub fn stop_streams(&self) -> u64 {
        let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("🛑 停止推流 (generation {})", next);
        next
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn assistant(&self) -> &AssistantClient {
        &self.assistant
    }
}
