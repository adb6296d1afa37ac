pub mod markdown_loader;

pub use markdown_loader::{load_markdown_file, load_markdown_files};
