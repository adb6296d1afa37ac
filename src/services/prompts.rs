//! 提示词 - 构造抽取与回答两类对话
//!
//! 具体措辞不属于编排核心，这里只保证两类对话的结构稳定，
//! 预算规划器依赖空对话的 token 数做预测。

use crate::models::{Conversation, Message};

/// 抽取问题时使用的系统提示词
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are an expert user extracting information to quiz people on documentation. You will be passed a page extracted from the documentation, write a numbered list of questions that can be answered based *solely* on the given text.";

/// 回答问题时使用的系统提示词
pub const ANSWERING_SYSTEM_PROMPT: &str = "You are an expert user answering questions. You will be passed a page extracted from a documentation and a question. Generate a comprehensive and informative answer to the question based *solely* on the given text.";

/// 抽取对话：系统提示 + 文本
pub fn extraction_conversation(text: &str) -> Conversation {
    Conversation::new(vec![
        Message::system(EXTRACTION_SYSTEM_PROMPT),
        Message::user(text),
    ])
}

/// 回答对话：系统提示 + 文本 + 问题
pub fn answering_conversation(question: &str, text: &str) -> Conversation {
    Conversation::new(vec![
        Message::system(ANSWERING_SYSTEM_PROMPT),
        Message::user(text),
        Message::user(question),
    ])
}
