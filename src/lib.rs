// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // 检测框与监控叠加层绘制
pub mod assistant; // 旅行助手
pub mod config; // 检测参数与服务配置
pub mod context; // 应用上下文
pub mod detection; // 人员检测
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod metrics; // 滚动FPS
pub mod pipeline; // 推流会话与按需处理
pub mod profiles; // 用户档案
pub mod server; // HTTP 服务

pub use crate::config::{Args, DetectionConfig, SentinelConfig};
pub use crate::context::AppContext;
pub use crate::detection::{Detection, DetectionInvoker, PersonDetector};
pub use crate::error::{Result, SentinelError};

use tracing_subscriber::EnvFilter;

/// 初始化日志 (RUST_LOG 覆盖默认级别)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ort=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
