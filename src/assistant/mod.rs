/// 旅行助手 (Travel assistant chat)
///
/// 调用托管大模型的 chat-completions 接口;
/// 无凭据、上游失败或回复过短时按确定规则返回兜底回复。
pub mod prompt;

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SentinelError};

/// 助手配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub min_reply_chars: usize, // 短于此长度的回复视为无效
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://router.huggingface.co/v1/chat/completions".to_string(),
            model: "meta-llama/Llama-3.2-3B-Instruct".to_string(),
            max_tokens: 250,
            timeout_secs: 30,
            min_reply_chars: 10,
        }
    }
}

/// 地点: 纯字符串或详细对象
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Named(String),
    Detailed(LocationDetails),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDetails {
    pub name: Option<String>,
    pub region: Option<String>,
    pub location_type: Option<String>,
    pub full_address: Option<String>,
    #[serde(default)]
    pub is_custom: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NoCredential,
    UpstreamFailure,
    TooShort,
}

/// 助手回复: 模型生成或兜底
#[derive(Clone, Debug, PartialEq)]
pub enum AssistantReply {
    Model(String),
    Fallback { text: String, reason: FallbackReason },
}

impl AssistantReply {
    pub fn text(&self) -> &str {
        match self {
            Self::Model(text) => text,
            Self::Fallback { text, .. } => text,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::Model(_) => "model",
            Self::Fallback { .. } => "fallback",
        }
    }
}

// ========== chat-completions 报文 ==========

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct AssistantClient {
    config: AssistantConfig,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl AssistantClient {
    pub fn new(config: AssistantConfig, api_key: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build();
        Self {
            config,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            agent,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// 凭据前10个字符 (健康检查用)
    pub fn key_preview(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}...", key.chars().take(10).collect::<String>()),
            None => "None".to_string(),
        }
    }

    /// 回答一次提问, 只有空消息会返回错误
    pub fn reply(&self, request: &ChatRequest) -> Result<AssistantReply> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(SentinelError::InvalidRequest("Message is required".to_string()));
        }
        let location = request.location.as_ref();

        let Some(key) = self.api_key.as_deref() else {
            return Ok(AssistantReply::Fallback {
                text: prompt::fallback_text(message, location),
                reason: FallbackReason::NoCredential,
            });
        };

        let system = prompt::system_prompt(location);
        let upstream = self.complete(key, &system, message);
        Ok(settle(message, location, upstream, self.config.min_reply_chars))
    }

    fn complete(&self, key: &str, system: &str, user: &str) -> anyhow::Result<String> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.config.max_tokens,
        };
        let response: CompletionResponse = self
            .agent
            .post(&self.config.endpoint)
            .set("Authorization", &format!("Bearer {}", key))
            .send_json(&body)
            .context("chat completion request failed")?
            .into_json()
            .context("invalid chat completion response")?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        info!("💬 模型回复 {} 字符", text.chars().count());
        Ok(text)
    }
}

/// 按确定规则选择模型回复或兜底回复
pub fn settle(
    message: &str,
    location: Option<&Location>,
    upstream: anyhow::Result<String>,
    min_chars: usize,
) -> AssistantReply {
    match upstream {
        Ok(text) => {
            let text = text.trim();
            if text.chars().count() < min_chars {
                warn!("⚠️ 模型回复过短, 使用兜底回复");
                AssistantReply::Fallback {
                    text: prompt::fallback_text(message, location),
                    reason: FallbackReason::TooShort,
                }
            } else {
                AssistantReply::Model(text.to_string())
            }
        }
        Err(e) => {
            warn!("⚠️ 模型调用失败: {:#}, 使用兜底回复", e);
            AssistantReply::Fallback {
                text: prompt::fallback_text(message, location),
                reason: FallbackReason::UpstreamFailure,
            }
        }
    }
}
