/// HTTP 服务 (actix-web)
///
/// - chat: 健康检查、旅行助手、用户档案
/// - yolo: 人群检测接口与 SSE 推流
///
/// 所有响应附带 CORS 头, OPTIONS 预检统一返回 204。
/// 检测等阻塞工作放在 `web::block` 或独立线程上执行。
pub mod chat;
pub mod yolo;

use std::net::IpAddr;

use actix_web::http::{header, Method, StatusCode};
use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer, ResponseError};
use serde_json::json;
use tracing::info;

use crate::context::AppContext;
use crate::error::{Result, SentinelError};

/// JSON 请求体上限 (上传帧为 base64 图像)
const JSON_LIMIT: usize = 16 * 1024 * 1024;

impl ResponseError for SentinelError {
    fn status_code(&self) -> StatusCode {
        match self {
            SentinelError::SourceUnavailable { .. } => StatusCode::NOT_FOUND,
            SentinelError::InvalidConfig { .. }
            | SentinelError::InvalidRequest(_)
            | SentinelError::ModelNotLoaded => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
            "cause": self.cause_tag(),
        }))
    }
}

/// 在阻塞线程池上执行
pub(crate) async fn blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    web::block(f)
        .await
        .map_err(|e| SentinelError::Io(std::io::Error::other(e.to_string())))?
}

fn cors_headers() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization"))
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err, _req| SentinelError::InvalidRequest(err.to_string()).into())
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn not_found(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        return HttpResponse::NoContent().finish();
    }
    HttpResponse::NotFound().json(json!({
        "error": format!("no route for {} {}", req.method(), req.path()),
        "cause": "not_found",
    }))
}

/// 注册全部路由
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/{tail:.*}", web::method(Method::OPTIONS).to(preflight));
    chat::configure(cfg);
    yolo::configure(cfg);
}

/// 启动 HTTP 服务, 阻塞直到服务退出
pub async fn serve(ctx: web::Data<AppContext>, bind: IpAddr, port: u16) -> std::io::Result<()> {
    info!("🌐 HTTP 服务启动: http://{}:{}", bind, port);
    HttpServer::new(move || {
        App::new()
            .app_data(ctx.clone())
            .wrap(cors_headers())
            .configure(configure)
            .default_service(web::to(not_found))
    })
    .bind((bind, port))?
    .run()
    .await
}
