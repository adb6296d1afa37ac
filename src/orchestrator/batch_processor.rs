//! 批量文档处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责组装资源并驱动一次完整运行。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验配置、加载分词器、建立凭证池和限流闸门
//! 2. **批量加载**：扫描并加载所有 Markdown 文档（`Vec<Document>`）
//! 3. **并发处理**：委托 `DocumentProcessor` 结构化地并发处理所有文档
//! 4. **结果输出**：把问答对写成 JSON 数组
//! 5. **全局统计**：汇总文档数、问答对数和失败回答数

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{load_markdown_files, QaRecord};
use crate::orchestrator::document_processor::DocumentProcessor;
use crate::services::budget_planner::BudgetPlanner;
use crate::services::llm_service::{
    CompletionBackend, CredentialPool, LlmService, OpenAiBackend, SERVICE_FAILURE_SENTINEL,
};
use crate::services::rate_limiter::TokenBucketLimiter;
use crate::services::token_estimator::TokenEstimator;
use crate::utils::logging::{log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    processor: DocumentProcessor,
}

impl App {
    /// 初始化应用（使用 OpenAI 兼容后端）
    pub fn initialize(config: Config) -> Result<Self> {
        config.validate().context("配置校验失败")?;
        let credentials = Arc::new(CredentialPool::new(config.api_keys.clone())?);
        let backend = Arc::new(OpenAiBackend::new(&config, &credentials));
        Self::assemble(config, credentials, backend)
    }

    /// 使用自定义后端初始化（测试或其他服务实现）
    pub fn with_backend(config: Config, backend: Arc<dyn CompletionBackend>) -> Result<Self> {
        config.validate().context("配置校验失败")?;
        let credentials = Arc::new(CredentialPool::new(config.api_keys.clone())?);
        Self::assemble(config, credentials, backend)
    }

    fn assemble(
        config: Config,
        credentials: Arc<CredentialPool>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Result<Self> {
        log_startup(&config);

        let estimator = TokenEstimator::for_encoding(&config.encoding)?;
        let planner = BudgetPlanner::new(
            estimator,
            config.model_token_limit,
            config.padding_tokens,
            config.calibration.clone(),
        );
        let gate = Arc::new(TokenBucketLimiter::new(
            config.rate_limit_capacity,
            config.rate_limit_refill_per_sec,
            config.max_in_flight_requests,
        ));
        let service = Arc::new(LlmService::new(
            backend,
            gate,
            credentials,
            planner,
            config.retry_policy(),
        ));

        Ok(Self {
            config,
            processor: DocumentProcessor::new(service),
        })
    }

    pub fn processor(&self) -> &DocumentProcessor {
        &self.processor
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<Vec<QaRecord>> {
        let started = Instant::now();

        info!("\n📁 正在从 '{}' 加载文档...", self.config.input_folder);
        let documents = load_markdown_files(&self.config.input_folder).await?;

        if documents.is_empty() {
            warn!("⚠️ 没有找到待处理的 Markdown 文件，程序结束");
            return Ok(Vec::new());
        }

        let records = self.processor.process_documents(&documents).await;

        write_records(Path::new(&self.config.output_file), &records)?;

        let failed = records
            .iter()
            .filter(|r| r.answer == SERVICE_FAILURE_SENTINEL)
            .count();
        print_final_stats(
            documents.len(),
            records.len(),
            failed,
            started.elapsed(),
            &self.config.output_file,
        );

        Ok(records)
    }
}

/// 把问答对写成格式化的 JSON 数组
pub fn write_records(path: &Path, records: &[QaRecord]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
    }
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    info!("💾 已保存 {} 个问答对到 {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_records_roundtrip() {
        let dir = std::env::temp_dir().join(format!("qa-sink-{}", std::process::id()));
        let path = dir.join("out/questions.json");
        let records = vec![QaRecord {
            source: "docs/a.md".to_string(),
            question: "What?".to_string(),
            answer: "That.".to_string(),
        }];

        write_records(&path, &records).unwrap();
        let loaded: Vec<QaRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, records);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
