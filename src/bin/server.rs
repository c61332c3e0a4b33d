/// 人群检测 + 旅行助手 HTTP 服务
///
/// cargo run --bin sentinel-server --release -- --config sentinel.json
use actix_web::web;
use clap::Parser;
use crowd_sentinel::config::{SentinelConfig, ServerArgs};
use crowd_sentinel::context::AppContext;
use crowd_sentinel::server;
use mimalloc::MiMalloc;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    crowd_sentinel::init_tracing();
    let args = ServerArgs::parse();

    let mut settings = SentinelConfig::load(&args.config);
    if let Some(port) = args.port {
        settings.port = port;
    }
    if args.huggingface_api_key.is_none() {
        warn!("⚠️  未设置 HUGGINGFACE_API_KEY, 旅行助手只返回兜底回复");
    }

    let (bind, port) = (settings.bind, settings.port);
    let ctx = AppContext::new(settings, args.huggingface_api_key);

    // 启动时尝试加载模型, 失败时可通过 /api/yolo/initialize 重试
    match ctx.ensure_detector() {
        Ok(invoker) => info!("✅ 模型已加载: {} ({})", invoker.name(), invoker.device()),
        Err(e) => warn!("⚠️  模型未加载: {:#}", e),
    }

    server::serve(web::Data::new(ctx), bind, port).await?;
    info!("👋 服务已退出");
    Ok(())
}
