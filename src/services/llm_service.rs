//! LLM 服务 - 业务能力层
//!
//! 只负责"调用一次文本生成服务"的能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! ## 失败处理
//! - 限流、超时、其他错误都按 `RetryPolicy` 指数退避重试
//! - 重试耗尽后返回 `SERVICE_FAILURE_SENTINEL`，不让单个文档拖垮整批

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ConfigError, ServiceError};
use crate::models::{Conversation, Role};
use crate::services::budget_planner::BudgetPlanner;
use crate::services::rate_limiter::AdmissionGate;

/// 重试耗尽后替代服务输出的固定文本
pub const SERVICE_FAILURE_SENTINEL: &str =
    "ERROR: the text-generation service did not answer after all retries.";

/// 重试策略
///
/// 第 k 次失败后等待 `min(base_delay * 2^(k-1), max_delay)`，
/// 开启抖动时再加上 `[0, base_delay]` 内的随机时长，避免并发调用同时重试。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次（从 1 开始）失败后的基础退避时间，不含抖动
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// 实际等待时间（含抖动）
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let base_ms = self.base_delay.as_millis() as u64;
        if !self.jitter || base_ms == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=base_ms);
        delay + Duration::from_millis(jitter)
    }
}

/// 凭证池：按轮询方式分摊请求
///
/// 由编排层持有，按引用传给服务，轮询位置保存在池本身。
#[derive(Debug)]
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Result<Self, ConfigError> {
        if keys.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        if let Some(index) = keys.iter().position(|key| key.trim().is_empty()) {
            return Err(ConfigError::BlankCredential { index });
        }
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// 下一个凭证
    pub fn next(&self) -> &str {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        &self.keys[index]
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// 远程文本生成服务的调用边界
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        api_key: &str,
        conversation: &Conversation,
        max_tokens: u32,
    ) -> Result<String, ServiceError>;
}

/// 基于 `async-openai` 的后端
pub struct OpenAiBackend {
    clients: HashMap<String, Client<OpenAIConfig>>,
    api_base_url: String,
    model_name: String,
    request_timeout: Duration,
}

impl OpenAiBackend {
    /// 为凭证池中的每个 key 预先建好客户端
    pub fn new(config: &Config, credentials: &CredentialPool) -> Self {
        let clients = credentials
            .keys()
            .iter()
            .map(|key| (key.clone(), build_client(key, &config.api_base_url)))
            .collect();

        Self {
            clients,
            api_base_url: config.api_base_url.clone(),
            model_name: config.model_name.clone(),
            request_timeout: config.request_timeout(),
        }
    }

    fn build_messages(
        conversation: &Conversation,
    ) -> Result<Vec<ChatCompletionRequestMessage>, ServiceError> {
        conversation
            .messages()
            .iter()
            .map(|message| {
                let built = match message.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(message.content.as_str())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(message.content.as_str())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                };
                built.map_err(|e| ServiceError::Other(format!("构建消息失败: {}", e)))
            })
            .collect()
    }
}

fn build_client(api_key: &str, api_base_url: &str) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_base_url);
    Client::with_config(openai_config)
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(
        &self,
        api_key: &str,
        conversation: &Conversation,
        max_tokens: u32,
    ) -> Result<String, ServiceError> {
        let messages = Self::build_messages(conversation)?;

        // 温度设为 0，尽量减少模型自由发挥
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(max_tokens)
            .build()
            .map_err(|e| ServiceError::Other(format!("构建请求失败: {}", e)))?;

        let fallback;
        let client = match self.clients.get(api_key) {
            Some(client) => client,
            None => {
                fallback = build_client(api_key, &self.api_base_url);
                &fallback
            }
        };

        let response = tokio::time::timeout(self.request_timeout, client.chat().create(request))
            .await
            .map_err(|_| {
                ServiceError::Timeout(format!("超过 {}s 未返回", self.request_timeout.as_secs()))
            })?
            .map_err(|e| ServiceError::classify(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ServiceError::Other("LLM 返回内容为空".to_string()))?;

        Ok(content.trim().to_string())
    }
}

/// LLM 服务
///
/// 职责：
/// - 计算每个请求可用的输出 token
/// - 通过限流闸门后调用后端
/// - 按重试策略处理失败，耗尽后返回占位文本
pub struct LlmService {
    backend: Arc<dyn CompletionBackend>,
    gate: Arc<dyn AdmissionGate>,
    credentials: Arc<CredentialPool>,
    planner: BudgetPlanner,
    retry: RetryPolicy,
}

impl LlmService {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        gate: Arc<dyn AdmissionGate>,
        credentials: Arc<CredentialPool>,
        planner: BudgetPlanner,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            gate,
            credentials,
            planner,
            retry,
        }
    }

    pub fn planner(&self) -> &BudgetPlanner {
        &self.planner
    }

    /// 调用服务，使用尽可能多的输出 token
    ///
    /// 永远不会返回错误：重试耗尽或对话本身放不下时返回 `SERVICE_FAILURE_SENTINEL`。
    pub async fn call(&self, conversation: &Conversation) -> String {
        let budget = self.planner.budget_for(conversation);
        let Some(max_tokens) = budget.max_output_tokens() else {
            warn!(
                "对话需要 {} token，超出模型上限 {}（余量 {}），不发送请求",
                budget.messages_cost, budget.model_limit, budget.padding
            );
            return SERVICE_FAILURE_SENTINEL.to_string();
        };
        // 服务端按"输入 + 请求的最大输出"计入吞吐限额
        let estimated_tokens = budget.messages_cost + max_tokens as usize;

        for attempt in 1..=self.retry.max_attempts {
            let admission = match self.gate.acquire(estimated_tokens).await {
                Ok(admission) => admission,
                Err(e) => {
                    warn!("无法获得准入: {}", e);
                    return SERVICE_FAILURE_SENTINEL.to_string();
                }
            };

            if !admission.waited.is_zero() {
                debug!("限流等待 {:.2}s 后获得准入", admission.waited.as_secs_f64());
            }

            let api_key = self.credentials.next();
            debug!(
                "调用 LLM API (第 {}/{} 次)，输入 {} token，max_tokens {}",
                attempt, self.retry.max_attempts, budget.messages_cost, max_tokens
            );

            let result = self.backend.complete(api_key, conversation, max_tokens).await;
            drop(admission);

            match result {
                Ok(text) => {
                    debug!("LLM API 调用成功");
                    return text;
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    let icon = if e.is_throttling() { "⏳" } else { "⚠️" };
                    warn!(
                        "{} {} (尝试 {}/{})，{:.1}s 后重试",
                        icon,
                        e,
                        attempt,
                        self.retry.max_attempts,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("❌ {}，已尝试 {} 次，放弃", e, attempt);
                }
            }
        }

        SERVICE_FAILURE_SENTINEL.to_string()
    }
}
