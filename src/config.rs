//! 配置 - 检测参数、服务配置文件与命令行参数
//!
//! 阈值校验策略: 越界直接拒绝 (InvalidConfig),不做静默截断,旧配置保持不变。

use std::fs;
use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assistant::AssistantConfig;
use crate::error::{Result, SentinelError};

/// 检测参数 (进程内共享,每次推理前读取)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    pub conf_threshold: f32, // 置信度阈值
    pub iou_threshold: f32,  // NMS IOU阈值
    pub use_gpu: bool,       // 是否启用GPU加速
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.5,
            iou_threshold: 0.45,
            use_gpu: true,
        }
    }
}

impl DetectionConfig {
    pub fn new(conf_threshold: f32, iou_threshold: f32, use_gpu: bool) -> Result<Self> {
        Ok(Self {
            conf_threshold: check_unit("conf_threshold", conf_threshold)?,
            iou_threshold: check_unit("iou_threshold", iou_threshold)?,
            use_gpu,
        })
    }

    /// 校验当前取值
    pub fn validate(&self) -> Result<()> {
        check_unit("conf_threshold", self.conf_threshold)?;
        check_unit("iou_threshold", self.iou_threshold)?;
        Ok(())
    }

    /// 应用一次更新: 全部字段通过校验才生效,否则返回错误且不修改任何字段
    pub fn apply(&self, update: &ConfigUpdate) -> Result<Self> {
        let mut next = *self;
        if let Some(conf) = update.conf_threshold {
            next.conf_threshold = check_unit("conf_threshold", conf)?;
        }
        if let Some(iou) = update.iou_threshold {
            next.iou_threshold = check_unit("iou_threshold", iou)?;
        }
        if let Some(use_gpu) = update.use_gpu {
            next.use_gpu = use_gpu;
        }
        Ok(next)
    }

    /// 推理前的最终截断 (代码内构造的配置也不会越界)
    pub fn clamped(&self) -> Self {
        Self {
            conf_threshold: clamp_unit(self.conf_threshold),
            iou_threshold: clamp_unit(self.iou_threshold),
            use_gpu: self.use_gpu,
        }
    }
}

/// 配置更新请求 (只接受已知字段)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub conf_threshold: Option<f32>,
    #[serde(default)]
    pub iou_threshold: Option<f32>,
    #[serde(default)]
    pub use_gpu: Option<bool>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.conf_threshold.is_none() && self.iou_threshold.is_none() && self.use_gpu.is_none()
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<f32> {
    if !value.is_finite() {
        return Err(SentinelError::invalid_config(field, "must be a finite number"));
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(SentinelError::invalid_config(
            field,
            format!("{} is outside [0, 1]", value),
        ));
    }
    Ok(value)
}

pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// 服务配置 - 通过JSON文件调整参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    // === 服务 ===
    pub bind: IpAddr,
    pub port: u16,
    pub assets_dir: PathBuf,    // 演示视频目录
    pub default_video: String,  // 默认视频文件名

    // === 模型 ===
    pub model_path: PathBuf,
    pub inference_size: u32,    // 推理输入尺寸
    pub font_path: Option<PathBuf>, // TrueType字体 (缺省使用内置点阵字体)

    // === 推流 ===
    pub jpeg_quality: u8,
    pub stream_target_fps: f64, // 0 表示不限速
    pub analyze_sample_interval: u64,

    pub detection: DetectionConfig,
    pub assistant: AssistantConfig,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([127, 0, 0, 1]),
            port: 5001,
            assets_dir: PathBuf::from("public/assets"),
            default_video: "demo_video.mp4".to_string(),
            model_path: PathBuf::from("models/yolov8n.onnx"),
            inference_size: 640,
            font_path: None,
            jpeg_quality: 85,
            stream_target_fps: 30.0,
            analyze_sample_interval: 30,
            detection: DetectionConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

impl SentinelConfig {
    /// 从JSON文件加载配置 (文件不存在时写出默认配置)
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Self>(&json) {
                Ok(mut config) => {
                    if let Err(e) = config.detection.validate() {
                        warn!("⚠️  配置文件检测参数无效: {}, 使用默认检测参数", e);
                        config.detection = DetectionConfig::default();
                    }
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 演示视频的完整路径
    pub fn video_path(&self, name: &str) -> PathBuf {
        self.assets_dir.join(name)
    }

    /// 解析 assets 目录下的视频名
    ///
    /// 只接受相对路径且每一段都是普通名称, 不能指向 assets 目录之外。
    pub fn resolve_video(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let contained = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            return Err(SentinelError::InvalidRequest(format!(
                "invalid video name `{}`",
                name
            )));
        }
        let path = self.video_path(name);
        if !path.exists() {
            return Err(SentinelError::source_unavailable(
                path.display().to_string(),
                format!(
                    "video file not found, place {} in {}",
                    name,
                    self.assets_dir.display()
                ),
            ));
        }
        Ok(path)
    }

    /// 两次推流之间的间隔
    pub fn stream_pacing(&self) -> Option<std::time::Duration> {
        if self.stream_target_fps > 0.0 && self.stream_target_fps.is_finite() {
            Some(std::time::Duration::from_secs_f64(1.0 / self.stream_target_fps))
        } else {
            None
        }
    }
}

/// 命令行实时检测参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "YOLOv8 实时人员检测 - real-time people detection", long_about = None)]
pub struct Args {
    /// 视频源: "webcam"、摄像头序号 (0,1) 或视频文件/图片序列目录
    #[arg(short, long, default_value = "webcam")]
    pub source: String,

    /// 标注帧输出目录 (可选)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// ONNX模型路径
    #[arg(short, long, default_value = "models/yolov8n.onnx")]
    pub model: PathBuf,

    /// 置信度阈值 (0.0-1.0)
    #[arg(long, default_value_t = 0.5)]
    pub conf: f32,

    /// NMS IoU阈值 (0.0-1.0)
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// 禁用GPU
    #[arg(long)]
    pub no_gpu: bool,

    /// 推理输入尺寸
    #[arg(long, default_value_t = 640)]
    pub inference_size: u32,

    /// TrueType字体路径
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 最多处理帧数
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// 视频文件播放结束后从头循环
    #[arg(long = "loop")]
    pub looping: bool,
}

impl Args {
    pub fn detection_config(&self) -> Result<DetectionConfig> {
        DetectionConfig::new(self.conf, self.iou, !self.no_gpu)
    }
}

/// HTTP服务参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "人群检测 + 旅行助手 HTTP 服务", long_about = None)]
pub struct ServerArgs {
    /// 配置文件路径
    #[arg(short, long, default_value = "sentinel.json")]
    pub config: PathBuf,

    /// 覆盖配置文件中的端口
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Hugging Face API Key
    #[arg(long, env = "HUGGINGFACE_API_KEY", hide_env_values = true)]
    pub huggingface_api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = DetectionConfig::default();
        assert_eq!(config.conf_threshold, 0.5);
        assert_eq!(config.iou_threshold, 0.45);
        assert!(config.use_gpu);
    }

    #[test]
    fn test_apply_rejects_out_of_range_and_keeps_previous() {
        let config = DetectionConfig::default();
        let update = ConfigUpdate {
            conf_threshold: Some(0.3),
            iou_threshold: Some(1.5),
            use_gpu: Some(false),
        };
        match config.apply(&update) {
            Err(SentinelError::InvalidConfig { field, .. }) => assert_eq!(field, "iou_threshold"),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
        // 原配置未被修改
        assert_eq!(config, DetectionConfig::default());
    }

    #[test]
    fn test_apply_partial_update() {
        let config = DetectionConfig::default();
        let update = ConfigUpdate {
            conf_threshold: Some(0.7),
            ..Default::default()
        };
        let next = config.apply(&update).unwrap();
        assert_eq!(next.conf_threshold, 0.7);
        assert_eq!(next.iou_threshold, 0.45);
    }

    #[test]
    fn test_nan_rejected() {
        assert!(DetectionConfig::new(f32::NAN, 0.5, false).is_err());
        assert_eq!(clamp_unit(f32::NAN), 0.0);
        assert_eq!(clamp_unit(-2.0), 0.0);
        assert_eq!(clamp_unit(3.0), 1.0);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let parsed = serde_json::from_str::<ConfigUpdate>(r#"{"conf_threshold":0.4,"foo":1}"#);
        assert!(parsed.is_err());
        let parsed = serde_json::from_str::<ConfigUpdate>(r#"{"conf_threshold":0.4}"#).unwrap();
        assert_eq!(parsed.conf_threshold, Some(0.4));
        assert!(!parsed.is_empty());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.json");
        let config = SentinelConfig::load(&path);
        assert_eq!(config.port, 5001);
        assert!(path.exists());

        let reloaded = SentinelConfig::load(&path);
        assert_eq!(reloaded.default_video, "demo_video.mp4");
    }

    #[test]
    fn test_load_invalid_thresholds_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.json");
        fs::write(
            &path,
            r#"{"port": 8080, "detection": {"conf_threshold": 4.0, "iou_threshold": 0.3, "use_gpu": false}}"#,
        )
        .unwrap();
        let config = SentinelConfig::load(&path);
        assert_eq!(config.port, 8080);
        assert_eq!(config.detection, DetectionConfig::default());
    }

    #[test]
    fn test_load_partial_detection_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.json");
        fs::write(&path, r#"{"port": 9000, "detection": {"conf_threshold": 0.3}}"#).unwrap();
        let config = SentinelConfig::load(&path);
        assert_eq!(config.port, 9000);
        assert_eq!(config.detection.conf_threshold, 0.3);
        assert_eq!(config.detection.iou_threshold, 0.45);
        assert!(config.detection.use_gpu);
    }

    #[test]
    fn test_resolve_video_stays_in_assets() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("clips")).unwrap();
        fs::write(dir.path().join("clips/a.mp4"), b"").unwrap();
        let config = SentinelConfig {
            assets_dir: dir.path().join("clips"),
            ..Default::default()
        };
        assert_eq!(config.resolve_video("a.mp4").unwrap(), dir.path().join("clips/a.mp4"));

        let outside = dir.path().join("clips/a.mp4").display().to_string();
        for name in ["", "..", "../clips/a.mp4", "./a.mp4", outside.as_str()] {
            let err = config.resolve_video(name).unwrap_err();
            assert_eq!(err.cause_tag(), "invalid_request", "name {:?}", name);
        }
        assert_eq!(
            config.resolve_video("b.mp4").unwrap_err().cause_tag(),
            "source_unavailable"
        );
    }

    #[test]
    fn test_stream_pacing() {
        let mut config = SentinelConfig::default();
        assert!(config.stream_pacing().is_some());
        config.stream_target_fps = 0.0;
        assert!(config.stream_pacing().is_none());
    }
}
