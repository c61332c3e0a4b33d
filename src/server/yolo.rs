//! 人群检测接口
//!
//! 推流接口为每个客户端启动一个会话线程, 会话通过容量为1的通道把事件交给 SSE 响应体,
//! 客户端读得慢时会话在下一次读帧前等待; 客户端断开后会话在循环边界停止并释放视频源。

use actix_web::http::header;
use actix_web::web::{self, Bytes};
use actix_web::HttpResponse;
use async_stream::stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::blocking;
use crate::annotate::decode_base64_image;
use crate::config::ConfigUpdate;
use crate::context::AppContext;
use crate::error::{Result, SentinelError};
use crate::input::SourceId;
use crate::pipeline::{
    ondemand, FrameRequest, SessionOptions, StopSignal, StreamEvent, StreamingSession,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/yolo/initialize", web::post().to(initialize))
        .route("/api/yolo/process-frame", web::post().to(process_frame))
        .route("/api/yolo/analyze-video", web::post().to(analyze_video))
        .route("/api/yolo/video-info", web::get().to(video_info))
        .route("/api/yolo/stream", web::get().to(stream_detection))
        .route("/api/yolo/webcam/detect", web::post().to(webcam_detect))
        .route("/api/yolo/config", web::get().to(get_config))
        .route("/api/yolo/config", web::post().to(update_config))
        .route("/api/yolo/latest", web::get().to(latest))
        .route("/api/yolo/stop", web::post().to(stop));
}

fn load_model(ctx: &AppContext) -> Result<()> {
    ctx.ensure_detector()
        .map(|_| ())
        .map_err(|e| SentinelError::ModelLoad(format!("{:#}", e)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct InitializeRequest {
    video: Option<String>,
    conf_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    use_gpu: Option<bool>,
}

impl InitializeRequest {
    fn config_update(&self) -> ConfigUpdate {
        ConfigUpdate {
            conf_threshold: self.conf_threshold,
            iou_threshold: self.iou_threshold,
            use_gpu: self.use_gpu,
        }
    }
}

/// 校验参数 → 解析视频 → 按目标设备加载模型 → 提交视频与参数
///
/// 视频与检测参数只在模型加载成功后才替换, 任何一步失败都保留原状态。
async fn initialize(
    ctx: web::Data<AppContext>,
    body: web::Json<InitializeRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();
    let ctx = ctx.into_inner();

    let response = blocking(move || {
        let update = request.config_update();
        let staged = ctx.detection_config().apply(&update)?;
        let video = request
            .video
            .unwrap_or_else(|| ctx.settings().default_video.clone());
        let video_path = ctx.settings().resolve_video(&video)?;
        let info = ondemand::video_info_at(&video_path)?;
        let invoker = ctx
            .load_detector_for(staged.use_gpu)
            .map_err(|e| SentinelError::ModelLoad(format!("{:#}", e)))?;

        let config = ctx.update_config(&update)?;
        ctx.set_video(video_path.clone());
        info!("🚀 YOLOv8 初始化完成: {} | {}", invoker.name(), video_path.display());
        Ok(json!({
            "message": "YOLOv8 initialized successfully",
            "video_path": video_path.display().to_string(),
            "model": invoker.name(),
            "device": invoker.device(),
            "config": config,
            "video_info": info,
        }))
    })
    .await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn process_frame(ctx: web::Data<AppContext>, body: web::Json<FrameRequest>) -> Result<HttpResponse> {
    let request = body.into_inner();
    let ctx = ctx.into_inner();
    let response = blocking(move || ondemand::process_frame(&ctx, &request)).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn analyze_video(ctx: web::Data<AppContext>) -> Result<HttpResponse> {
    let ctx = ctx.into_inner();
    let analysis = blocking(move || ondemand::analyze_video(&ctx)).await?;
    Ok(HttpResponse::Ok().json(analysis))
}

async fn video_info(ctx: web::Data<AppContext>) -> Result<HttpResponse> {
    let ctx = ctx.into_inner();
    let info = blocking(move || ondemand::video_info(&ctx)).await?;
    Ok(HttpResponse::Ok().json(info))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    source: Option<String>,
}

impl StreamQuery {
    /// "video" (缺省) → 当前视频文件, "webcam" 或摄像头序号 → 摄像头
    fn source_id(&self, ctx: &AppContext) -> Result<SourceId> {
        match self.source.as_deref() {
            None | Some("video") => Ok(SourceId::File(ctx.video_path())),
            Some(raw) => match SourceId::parse(raw) {
                camera @ SourceId::Camera(_) => Ok(camera),
                SourceId::File(_) => Err(SentinelError::InvalidRequest(format!(
                    "unknown stream source `{}`, expected video or webcam",
                    raw
                ))),
            },
        }
    }
}

/// 响应体被丢弃 (客户端断开) 时通知会话停止
struct StopOnDrop(StopSignal);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

async fn stream_detection(
    ctx: web::Data<AppContext>,
    query: web::Query<StreamQuery>,
) -> Result<HttpResponse> {
    ctx.detector()?;
    let id = query.source_id(&ctx)?;
    let (mut tx, mut rx) = mpsc::channel::<StreamEvent>(1);
    let stop = StopSignal::new();
    let guard = StopOnDrop(stop.clone());

    let worker = ctx.into_inner();
    std::thread::Builder::new()
        .name("sse-session".into())
        .spawn(move || {
            let options = SessionOptions::from_context(&worker);
            let mut session = StreamingSession::new(&worker, options, stop);
            if let Err(e) = session.run(&id, &mut tx) {
                warn!("⚠️ 推流会话结束: {}", e);
            }
        })?;

    let body = stream! {
        let _guard = guard;
        while let Some(event) = rx.recv().await {
            yield Ok::<Bytes, actix_web::Error>(Bytes::from(event.to_sse()));
        }
    };

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(body))
}

#[derive(Debug, Deserialize)]
struct WebcamRequest {
    #[serde(default)]
    frame: Option<String>,
}

/// 检测浏览器上传的摄像头帧 (模型未加载时先加载)
async fn webcam_detect(ctx: web::Data<AppContext>, body: web::Json<WebcamRequest>) -> Result<HttpResponse> {
    let data = body
        .into_inner()
        .frame
        .filter(|f| !f.is_empty())
        .ok_or_else(|| SentinelError::InvalidRequest("No frame data provided".to_string()))?;
    let ctx = ctx.into_inner();
    let result = blocking(move || {
        let image = decode_base64_image(&data)?;
        load_model(&ctx)?;
        ondemand::detect_uploaded(&ctx, &image)
    })
    .await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn get_config(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(ctx.detection_config())
}

async fn update_config(ctx: web::Data<AppContext>, body: web::Json<ConfigUpdate>) -> Result<HttpResponse> {
    let config = ctx.update_config(&body)?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Configuration updated",
        "config": config,
    })))
}

async fn latest(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(&*ctx.state().read())
}

async fn stop(ctx: web::Data<AppContext>) -> HttpResponse {
    let generation = ctx.stop_streams();
    HttpResponse::Ok().json(json!({
        "message": "Streams stopped",
        "generation": generation,
    }))
}
