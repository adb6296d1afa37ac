use serde::{Deserialize, Serialize};

/// 从磁盘加载的原始文档，加载后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    pub text: String,
}

impl Document {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// 拆分文档得到的小节
///
/// `path` 在父路径后追加标题的 slug，便于追溯问答对来自哪一节。
/// 小节可以再次进入拆分/抽取流程，和 `Document` 结构上是同构的。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub path: String,
    pub title: String,
    pub body: String,
}

impl Section {
    pub fn new(parent_path: &str, title: impl Into<String>, body: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            path: format!("{}/{}", parent_path, section_slug(&title)),
            title,
            body: body.into(),
        }
    }
}

/// 把标题转成路径片段：`## Getting Started` → `##getting-started`
///
/// 前言（无标题的首段）统一记为 `preamble`。
pub fn section_slug(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        return "preamble".to_string();
    }
    title.replace("# ", "#").replace(' ', "-").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_slug() {
        assert_eq!(section_slug("## Getting Started"), "##getting-started");
        assert_eq!(section_slug("# API"), "#api");
        assert_eq!(section_slug(""), "preamble");
    }

    #[test]
    fn test_section_slug_rewrites_every_marker() {
        assert_eq!(section_slug("## C# vs F# Notes"), "##c#vs-f#notes");
    }

    #[test]
    fn test_section_path_keeps_provenance() {
        let section = Section::new(
            "docs/guide.md",
            "## Install Steps",
            "## Install Steps\nrun it",
        );
        assert_eq!(section.path, "docs/guide.md/##install-steps");
        let nested = Section::new(&section.path, "### Linux", "### Linux\napt");
        assert_eq!(nested.path, "docs/guide.md/##install-steps/###linux");
    }
}
