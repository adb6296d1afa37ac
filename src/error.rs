use thiserror::Error;

/// 应用程序错误类型
///
/// 只有启动阶段（配置、文件读写）的错误会走到这里；
/// 单个文档分支内的失败（无法拆分、服务重试耗尽）不会冒泡成 `AppError`。
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// JSON 序列化失败
    #[error("JSON序列化失败: {0}")]
    Json(#[from] serde_json::Error),
    /// 限流闸门已关闭
    #[error("限流闸门已关闭，无法再派发请求")]
    AdmissionClosed,
}

/// 配置错误（启动时即致命）
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 凭证池为空
    #[error("凭证池为空，至少需要一个 API key")]
    MissingCredentials,
    /// 凭证为空字符串
    #[error("凭证池中第 {index} 个 API key 为空")]
    BlankCredential { index: usize },
    /// 数值必须为正
    #[error("配置项 {field} 必须为正数，当前值: {value}")]
    NonPositive { field: &'static str, value: String },
    /// 安全余量不小于模型上限
    #[error("安全余量 {padding} 不能大于等于模型 token 上限 {limit}")]
    PaddingExceedsLimit { padding: usize, limit: usize },
    /// 令牌桶容量装不下一次完整请求
    #[error("令牌桶容量 {capacity} 小于模型 token 上限 {limit}，单个请求永远无法放行")]
    CapacityBelowModelLimit { capacity: usize, limit: usize },
    /// 未知的分词编码
    #[error("未知的分词编码: {0}")]
    UnknownEncoding(String),
    /// 分词器初始化失败
    #[error("分词器 {encoding} 初始化失败: {message}")]
    EncoderInit { encoding: String, message: String },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },
    /// 配置文件读取失败
    #[error("无法读取配置文件 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 远程文本生成服务返回的错误
///
/// 三类错误都会被重试，区分它们只是为了日志和退避策略的可观测性。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// 服务端限流
    #[error("服务限流: {0}")]
    RateLimited(String),
    /// 请求超时
    #[error("请求超时: {0}")]
    Timeout(String),
    /// 其他错误
    #[error("服务调用失败: {0}")]
    Other(String),
}

impl ServiceError {
    /// 根据错误描述粗略归类
    ///
    /// 兼容 OpenAI 风格的服务，错误类型在不同实现间并不统一，这里按文本特征判断。
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("429") {
            ServiceError::RateLimited(message)
        } else if lower.contains("timed out") || lower.contains("timeout") {
            ServiceError::Timeout(message)
        } else {
            ServiceError::Other(message)
        }
    }

    pub fn is_throttling(&self) -> bool {
        matches!(self, ServiceError::RateLimited(_) | ServiceError::Timeout(_))
    }
}

/// 文档拆分错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    /// 文本中没有可供拆分的标题
    #[error("文本中没有任何标题，无法继续拆分")]
    NoHeadings,
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let err = ServiceError::classify("Rate limit reached for gpt-3.5-turbo");
        assert!(matches!(err, ServiceError::RateLimited(_)));
        let err = ServiceError::classify("status 429 Too Many Requests");
        assert!(matches!(err, ServiceError::RateLimited(_)));
    }

    #[test]
    fn test_classify_timeout_and_other() {
        assert!(matches!(
            ServiceError::classify("operation timed out"),
            ServiceError::Timeout(_)
        ));
        let other = ServiceError::classify("invalid api key");
        assert!(matches!(other, ServiceError::Other(_)));
        assert!(!other.is_throttling());
    }
}
