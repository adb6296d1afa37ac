use std::path::PathBuf;

use anyhow::Result;
use question_extractor::utils::logging;
use question_extractor::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 配置文件路径：QA_CONFIG，默认 question_extractor.toml
    let config_path = std::env::var("QA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("question_extractor.toml"));

    // 加载配置
    let config = Config::load(Some(config_path.as_path()))?;

    // 初始化日志
    logging::init(config.verbose_logging);
    if !config_path.exists() {
        tracing::warn!("配置文件 {} 不存在，使用默认配置", config_path.display());
    }

    // 初始化并运行应用
    let records = App::initialize(config)?.run().await?;
    tracing::info!("完成，共生成 {} 个问答对", records.len());

    Ok(())
}
