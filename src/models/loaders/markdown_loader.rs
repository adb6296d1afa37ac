use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{AppError, AppResult, FileError};
use crate::models::Document;

/// 读取单个 Markdown 文件
pub async fn load_markdown_file(path: &Path) -> AppResult<Document> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    Ok(Document::new(path.to_string_lossy(), text))
}

/// 递归加载文件夹下所有 `.md` 文件
///
/// 读取失败的单个文件只记警告并跳过；文件夹本身不存在则报错。
/// 返回结果按路径排序，保证多次运行的输出顺序一致。
pub async fn load_markdown_files(folder_path: &str) -> AppResult<Vec<Document>> {
    let root = PathBuf::from(folder_path);

    if !root.is_dir() {
        return Err(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }
        .into());
    }

    let mut pending = vec![root];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| AppError::file_read_failed(dir.display().to_string(), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::file_read_failed(dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|s| s.to_str()) == Some("md") {
                files.push(path);
            }
        }
    }

    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        match load_markdown_file(&path).await {
            Ok(document) => {
                tracing::debug!("已加载: {} ({} 字符)", document.path, document.text.len());
                documents.push(document);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(documents)
}
