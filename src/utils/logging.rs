/// 日志工具模块
///
/// 初始化 `tracing` 订阅者，并提供启动/结束时的横幅输出
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 `debug` 或 `info`。
/// 重复调用不会报错（测试中常见）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 问答对抽取");
    info!(
        "🤖 模型: {} (上下文 {} token, 余量 {})",
        config.model_name, config.model_token_limit, config.padding_tokens
    );
    info!(
        "📊 最大并发请求: {} | 令牌桶: {} token, {}/s",
        config.max_in_flight_requests, config.rate_limit_capacity, config.rate_limit_refill_per_sec
    );
    info!("🔑 凭证数量: {}", config.api_keys.len());
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(
    documents: usize,
    records: usize,
    failed_answers: usize,
    elapsed: Duration,
    output_path: &str,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {} (耗时 {:.1}s)",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        elapsed.as_secs_f64()
    );
    info!("{}", "=".repeat(60));
    info!("📄 文档: {}", documents);
    info!("✅ 问答对: {}", records);
    info!("❌ 回答失败: {}", failed_answers);
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("令牌桶限流器", 3), "令牌桶...");
    }
}
