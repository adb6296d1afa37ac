use serde::{Deserialize, Serialize};

/// 最终输出的问答对
///
/// `answer` 可能是服务失败时的占位文本，见 `SERVICE_FAILURE_SENTINEL`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    pub source: String,
    pub question: String,
    pub answer: String,
}
