//! 编排层（Orchestration Layer）
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Document>，组装资源)
//!     ↓
//! document_processor (预算检查 → 拆分/抽取 → 并发回答 → 合并)
//!     ↓
//! services (能力层：token 计数 / 预算 / 拆分 / 限流 / LLM 调用)
//! ```

pub mod batch_processor;
pub mod document_processor;

pub use batch_processor::{write_records, App};
pub use document_processor::{questions_of_output, DocumentProcessor, ExtractedQuestion, Progress};
