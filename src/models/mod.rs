pub mod conversation;
pub mod document;
pub mod loaders;
pub mod qa_record;

pub use conversation::{Conversation, Message, Role};
pub use document::{Document, Section};
pub use loaders::load_markdown_files;
pub use qa_record::QaRecord;
