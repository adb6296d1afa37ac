//! Token 计数 - 业务能力层
//!
//! 使用 `tiktoken-rs` 的 BPE 编码，与目标模型的计费口径保持一致。
//! 编码表加载开销较大，每种编码在进程内只初始化一次。

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::error::ConfigError;
use crate::models::Message;

/// 每条消息的固定封装开销：`<|start|>{role/name}\n{content}<|end|>\n`
const TOKENS_PER_MESSAGE: usize = 4;
/// 有 name 字段时 role 会被省略，每条消息扣掉一个 token
const TOKENS_PER_NAME_DISCOUNT: usize = 1;
/// 每次回复都以 `<|start|>assistant<|message|>` 开头
const REPLY_PRIMING_TOKENS: usize = 3;

static CL100K: OnceLock<CoreBPE> = OnceLock::new();
static O200K: OnceLock<CoreBPE> = OnceLock::new();
static P50K: OnceLock<CoreBPE> = OnceLock::new();

/// Token 计数器
///
/// 纯函数式：相同输入永远得到相同结果，可以随意 `Copy`。
#[derive(Clone, Copy)]
pub struct TokenEstimator {
    encoder: &'static CoreBPE,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("encoder", &"<CoreBPE>")
            .finish()
    }
}

impl TokenEstimator {
    /// 按编码名称创建计数器
    ///
    /// 未知编码或编码表加载失败都属于配置错误。
    pub fn for_encoding(encoding: &str) -> Result<Self, ConfigError> {
        let cell: &'static OnceLock<CoreBPE> = match encoding {
            "cl100k_base" => &CL100K,
            "o200k_base" => &O200K,
            "p50k_base" => &P50K,
            other => return Err(ConfigError::UnknownEncoding(other.to_string())),
        };

        if let Some(encoder) = cell.get() {
            return Ok(Self { encoder });
        }

        let loaded = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base().map_err(|e| e.to_string()),
            "o200k_base" => tiktoken_rs::o200k_base().map_err(|e| e.to_string()),
            _ => tiktoken_rs::p50k_base().map_err(|e| e.to_string()),
        };
        let bpe = loaded.map_err(|message| ConfigError::EncoderInit {
            encoding: encoding.to_string(),
            message,
        })?;

        Ok(Self {
            encoder: cell.get_or_init(|| bpe),
        })
    }

    /// 文本的 token 数
    ///
    /// 特殊标记（如 `<|endoftext|>`）按普通文本编码，不会报错。
    ///
    /// BPE 在逐字符追加时并不单调：`# Titl` 比 `# Title` 多一个 token，
    /// 因为补全的单词会合并成更少的 token。预切分在"换行 + 非空白字符"处
    /// 总是断开，所以以换行结尾的文本后面追加以非空白字符开头的整行时，
    /// 计数只增不减。文档按行增长正是这种情况。
    pub fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.encoder.encode_ordinary(text).len()
    }

    /// 一组消息的 token 数（含每条消息的封装开销和回复前缀）
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        let content: usize = messages
            .iter()
            .map(|m| TOKENS_PER_MESSAGE + self.count_text(&m.content) - TOKENS_PER_NAME_DISCOUNT)
            .sum();
        content + REPLY_PRIMING_TOKENS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> TokenEstimator {
        TokenEstimator::for_encoding("cl100k_base").unwrap()
    }

    #[test]
    fn test_count_text_is_deterministic() {
        let estimator = estimator();
        let text = "Tokens are the atomic unit of cost.";
        assert_eq!(estimator.count_text(text), estimator.count_text(text));
        assert!(estimator.count_text(text) > 0);
        assert_eq!(estimator.count_text(""), 0);
    }

    #[test]
    fn test_count_text_non_decreasing_when_appending_lines() {
        let estimator = estimator();
        let lines = [
            "# Title",
            "Some *markdown* text, with punctuation! And 12345 numbers.",
            "- a list item",
            "## Next section",
            "`inline code` and 'quotes' and \"double quotes\"",
            "令牌桶按速率补充。",
            "Title",
            "x",
        ];

        let mut text = String::new();
        let mut previous = 0;
        for line in lines {
            text.push_str(line);
            text.push('\n');
            let count = estimator.count_text(&text);
            assert!(count >= previous, "count dropped after appending {:?}", line);
            previous = count;
        }
    }

    #[test]
    fn test_appended_line_adds_its_own_tokens() {
        let estimator = estimator();
        let head = "# Guide\nThe bucket refills continuously.\n";
        let tail = "Requests wait for their deficit.";
        assert_eq!(
            estimator.count_text(&format!("{head}{tail}")),
            estimator.count_text(head) + estimator.count_text(tail)
        );
    }

    #[test]
    fn test_count_messages_overhead() {
        let estimator = estimator();
        let empty = [Message::system(""), Message::user("")];
        // 2 * (4 - 1) + 3
        assert_eq!(estimator.count_messages(&empty), 9);
        assert_eq!(estimator.count_messages(&[]), 3);

        let messages = [Message::system("You are helpful."), Message::user("Hello")];
        let expected = 9
            + estimator.count_text("You are helpful.")
            + estimator.count_text("Hello");
        assert_eq!(estimator.count_messages(&messages), expected);
    }

    #[test]
    fn test_special_tokens_are_plain_text() {
        let estimator = estimator();
        assert!(estimator.count_text("<|endoftext|>") > 1);
    }

    #[test]
    fn test_unknown_encoding_is_config_error() {
        assert!(matches!(
            TokenEstimator::for_encoding("klingon"),
            Err(ConfigError::UnknownEncoding(_))
        ));
    }
}
