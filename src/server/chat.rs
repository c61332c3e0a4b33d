//! 健康检查、旅行助手与用户档案接口

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::blocking;
use crate::assistant::ChatRequest;
use crate::context::AppContext;
use crate::error::Result;
use crate::profiles::DEFAULT_USER;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(health))
        .route("/api/chat", web::post().to(chat))
        .route("/api/profile", web::get().to(get_profile))
        .route("/api/profile", web::post().to(put_profile))
        .route("/api/locations", web::get().to(locations));
}

async fn health(ctx: web::Data<AppContext>) -> HttpResponse {
    let assistant = ctx.assistant();
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "message": "Travel AI API is running",
        "huggingface_api_key": if assistant.has_credential() { "configured" } else { "missing" },
        "api_key_preview": assistant.key_preview(),
        "yolo_model_loaded": ctx.is_model_loaded(),
    }))
}

async fn chat(ctx: web::Data<AppContext>, body: web::Json<ChatRequest>) -> Result<HttpResponse> {
    let request = body.into_inner();
    let ctx = ctx.into_inner();
    let reply = blocking(move || ctx.assistant().reply(&request)).await?;
    info!("💬 助手回复来源: {}", reply.source());
    Ok(HttpResponse::Ok().json(json!({
        "response": reply.text(),
        "source": reply.source(),
    })))
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    user_id: Option<String>,
}

impl ProfileQuery {
    fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(DEFAULT_USER)
    }
}

async fn get_profile(ctx: web::Data<AppContext>, query: web::Query<ProfileQuery>) -> HttpResponse {
    HttpResponse::Ok().json(ctx.profiles().get(query.user_id()))
}

async fn put_profile(
    ctx: web::Data<AppContext>,
    query: web::Query<ProfileQuery>,
    body: web::Json<Value>,
) -> HttpResponse {
    let profile = body.into_inner();
    ctx.profiles().put(query.user_id(), profile.clone());
    HttpResponse::Ok().json(json!({
        "message": "Profile updated successfully",
        "profile": profile,
    }))
}

async fn locations() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Locations endpoint",
        "note": "Location data is served from the frontend JSON file",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SentinelConfig;
    use crate::server::tests::context;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_hides_credential() {
        let app = test::init_service(
            App::new()
                .app_data(context(SentinelConfig::default()))
                .configure(crate::server::configure),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["huggingface_api_key"], "missing");
        assert_eq!(body["api_key_preview"], "None");
    }

    #[actix_web::test]
    async fn test_chat_without_credential_uses_fallback() {
        let app = test::init_service(
            App::new()
                .app_data(context(SentinelConfig::default()))
                .configure(crate::server::configure),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({"message": "Any festival this month?"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["source"], "fallback");
        assert!(body["response"].as_str().is_some_and(|s| s.contains("Sinulog")));
    }

    #[actix_web::test]
    async fn test_chat_rejects_empty_message() {
        let app = test::init_service(
            App::new()
                .app_data(context(SentinelConfig::default()))
                .configure(crate::server::configure),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({"message": ""}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["cause"], "invalid_request");
    }

    #[actix_web::test]
    async fn test_profile_roundtrip() {
        let app = test::init_service(
            App::new()
                .app_data(context(SentinelConfig::default()))
                .configure(crate::server::configure),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/profile?user_id=ana").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"beenThere": [], "wantToGo": []}));

        let profile = json!({"beenThere": ["Bohol"], "wantToGo": ["Siargao"]});
        let req = test::TestRequest::post()
            .uri("/api/profile?user_id=ana")
            .set_json(&profile)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["profile"], profile);

        let req = test::TestRequest::get().uri("/api/profile?user_id=ana").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, profile);

        // 其他用户不受影响
        let req = test::TestRequest::get().uri("/api/profile").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["beenThere"], json!([]));
    }
}
