use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::services::budget_planner::Calibration;
use crate::services::llm_service::RetryPolicy;

/// 程序配置
///
/// 取值顺序：内置默认值 → TOML 配置文件 → `QA_*` 环境变量。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Markdown 文档所在目录
    pub input_folder: String,
    /// 问答对输出文件（JSON）
    pub output_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub model_name: String,
    pub api_base_url: String,
    /// 凭证池，按轮询方式使用
    pub api_keys: Vec<String>,
    /// 分词编码（cl100k_base / o200k_base / p50k_base）
    pub encoding: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    // --- token 预算 ---
    pub model_token_limit: usize,
    /// 为避免贴着上限请求而预留的 token
    pub padding_tokens: usize,
    pub calibration: Calibration,
    // --- 限流 ---
    /// 令牌桶容量（token）
    pub rate_limit_capacity: usize,
    /// 令牌桶每秒补充的 token 数
    pub rate_limit_refill_per_sec: f64,
    /// 同时在途的请求数上限
    pub max_in_flight_requests: usize,
    pub retry: RetrySettings,
}

/// 重试配置（毫秒）
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_folder: "data/docs".to_string(),
            output_file: "data/questions.json".to_string(),
            verbose_logging: false,
            model_name: "gpt-3.5-turbo".to_string(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            api_keys: Vec::new(),
            encoding: "cl100k_base".to_string(),
            request_timeout_secs: 120,
            model_token_limit: 4096,
            padding_tokens: 16,
            calibration: Calibration::default(),
            rate_limit_capacity: 90_000,
            rate_limit_refill_per_sec: 1_500.0,
            max_in_flight_requests: 16,
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    /// 加载配置：可选的 TOML 文件 + 环境变量覆盖，最后校验
    ///
    /// 配置文件不存在时使用默认值。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml_file(path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: origin.to_string(),
            source,
        })
    }

    /// 用 `QA_*` 环境变量覆盖配置
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("QA_INPUT_FOLDER") {
            self.input_folder = v;
        }
        if let Ok(v) = std::env::var("QA_OUTPUT_FILE") {
            self.output_file = v;
        }
        if let Ok(v) = std::env::var("QA_MODEL_NAME") {
            self.model_name = v;
        }
        if let Ok(v) = std::env::var("QA_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEYS") {
            self.api_keys = v
                .split(',')
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .collect();
        }
        if let Some(v) = env_parse("QA_VERBOSE_LOGGING", "bool")? {
            self.verbose_logging = v;
        }
        if let Some(v) = env_parse("QA_MODEL_TOKEN_LIMIT", "usize")? {
            self.model_token_limit = v;
        }
        if let Some(v) = env_parse("QA_MAX_IN_FLIGHT_REQUESTS", "usize")? {
            self.max_in_flight_requests = v;
        }
        if let Some(v) = env_parse("QA_RATE_LIMIT_CAPACITY", "usize")? {
            self.rate_limit_capacity = v;
        }
        if let Some(v) = env_parse("QA_RATE_LIMIT_REFILL_PER_SEC", "f64")? {
            self.rate_limit_refill_per_sec = v;
        }
        if let Some(v) = env_parse("QA_MAX_ATTEMPTS", "u32")? {
            self.retry.max_attempts = v;
        }
        Ok(())
    }

    /// 校验配置，任何一项不合法都会阻止运行开始
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_keys.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        if let Some(index) = self.api_keys.iter().position(|key| key.trim().is_empty()) {
            return Err(ConfigError::BlankCredential { index });
        }
        positive("model_token_limit", self.model_token_limit as f64)?;
        positive("rate_limit_capacity", self.rate_limit_capacity as f64)?;
        positive("rate_limit_refill_per_sec", self.rate_limit_refill_per_sec)?;
        positive("max_in_flight_requests", self.max_in_flight_requests as f64)?;
        positive("request_timeout_secs", self.request_timeout_secs as f64)?;
        positive("retry.max_attempts", self.retry.max_attempts as f64)?;
        positive("calibration.avg_question_tokens", self.calibration.avg_question_tokens)?;
        positive("calibration.avg_answer_tokens", self.calibration.avg_answer_tokens)?;
        positive(
            "calibration.question_to_text_ratio",
            self.calibration.question_to_text_ratio,
        )?;
        if self.padding_tokens >= self.model_token_limit {
            return Err(ConfigError::PaddingExceedsLimit {
                padding: self.padding_tokens,
                limit: self.model_token_limit,
            });
        }
        if self.rate_limit_capacity < self.model_token_limit {
            return Err(ConfigError::CapacityBelowModelLimit {
                capacity: self.rate_limit_capacity,
                limit: self.model_token_limit,
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
        }
    }
}

fn env_parse<T: FromStr>(
    var_name: &str,
    expected_type: &'static str,
) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type,
            }),
        Err(_) => Ok(None),
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive {
            field,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn valid_config() -> Config {
        Config {
            api_keys: vec!["sk-test".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_with_key_is_valid() {
        assert_ok!(valid_config().validate());
    }

    #[test]
    fn test_empty_credential_pool_rejected() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredentials)
        ));

        let config = Config {
            api_keys: vec!["sk-a".to_string(), "  ".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BlankCredential { index: 1 })
        ));
    }

    #[test]
    fn test_non_positive_rate_constants_rejected() {
        let mut config = valid_config();
        config.rate_limit_refill_per_sec = 0.0;
        assert_err!(config.validate());

        let mut config = valid_config();
        config.max_in_flight_requests = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "max_in_flight_requests",
                ..
            })
        ));

        let mut config = valid_config();
        config.rate_limit_capacity = 1_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityBelowModelLimit { .. })
        ));
    }

    #[test]
    fn test_toml_partial_override() {
        let config = Config::from_toml_str(
            r#"
            api_keys = ["sk-1", "sk-2"]
            model_token_limit = 8192
            rate_limit_capacity = 20000

            [retry]
            max_attempts = 3

            [calibration]
            avg_answer_tokens = 120.0
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.api_keys.len(), 2);
        assert_eq!(config.model_token_limit, 8192);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.calibration.avg_answer_tokens, 120.0);
        assert_eq!(config.calibration.avg_question_tokens, 15.28);
        assert_eq!(config.padding_tokens, 16);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_toml_parse_error_is_config_error() {
        let err = Config::from_toml_str("model_token_limit = \"many\"", "broken.toml").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseFailed { .. }));
    }
}
