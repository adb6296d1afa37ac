//! # Question Extractor
//!
//! 把一批 Markdown 文档转换成问答对：反复调用上下文窗口有限的文本生成服务，
//! 先抽取问题，再逐个回答。
//!
//! ## 架构设计
//!
//! ### ① 数据模型（Models）
//! - `Document` / `Section` / `Conversation` / `QaRecord`
//! - `loaders/` - 从目录加载 Markdown 文档
//!
//! ### ② 业务能力层（Services）
//! - `TokenEstimator` - token 计数
//! - `BudgetPlanner` - 预测抽取、回答两个阶段能否放进上下文窗口
//! - `document_splitter` - 在最浅标题处拆分超长文档
//! - `TokenBucketLimiter` - 并发数 + 令牌桶双重限流
//! - `LlmService` - 带重试、凭证轮询的单次服务调用
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/document_processor` - 单个文档：预算检查 → 拆分/抽取 → 并发回答 → 合并
//! - `orchestrator/batch_processor` - 组装资源、批量处理、输出结果
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ConfigError, ServiceError, SplitError};
pub use models::{Conversation, Document, Message, QaRecord, Role, Section};
pub use orchestrator::{App, DocumentProcessor};
pub use services::{
    AdmissionGate, BudgetPlanner, CompletionBackend, CredentialPool, LlmService, RetryPolicy,
    TokenBucketLimiter, TokenEstimator, SERVICE_FAILURE_SENTINEL,
};
