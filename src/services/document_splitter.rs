//! 文档拆分 - 业务能力层
//!
//! 在最浅的标题层级处把 Markdown 拆成若干小节。
//! 每次调用都重新计算最浅层级，所以递归调用看到的层级严格递增，
//! 递归深度不会超过文档中最深的标题层级。

use crate::error::SplitError;

/// 标题层级：行首第一个词全部由 `#` 组成时，`#` 的个数
///
/// `#hashtag` 之类不是标题。
pub fn heading_depth(line: &str) -> Option<usize> {
    if !line.starts_with('#') {
        return None;
    }
    let marker = line.split_whitespace().next()?;
    marker.chars().all(|c| c == '#').then_some(marker.len())
}

/// 所有行中最浅的标题层级
pub fn shallowest_heading_depth<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<usize> {
    lines.into_iter().filter_map(heading_depth).min()
}

/// 在最浅的标题层级处拆分文本，返回 `(标题, 正文)` 列表
///
/// - 文本自身的首行标题会被丢弃
/// - 每个小节的正文包含它自己的标题行
/// - 第一个标题之前的前言含有非空白内容时，作为标题为空的小节保留；
///   只有空行的前言（常见于 `# 标题` 后的空行）直接丢弃
/// - 没有任何标题时返回 `SplitError::NoHeadings`，调用方必须放弃这一分支
pub fn split_markdown(text: &str) -> Result<Vec<(String, String)>, SplitError> {
    let mut lines: Vec<&str> = text.split('\n').collect();

    if lines.first().is_some_and(|line| line.starts_with('#')) {
        lines.remove(0);
    }

    let depth = shallowest_heading_depth(lines.iter().copied()).ok_or(SplitError::NoHeadings)?;

    let mut sections = Vec::new();
    let mut current_title = String::new();
    let mut current: Vec<&str> = Vec::new();

    for line in lines {
        if heading_depth(line) == Some(depth) {
            push_section(&mut sections, std::mem::take(&mut current_title), &current);
            current.clear();
            current_title = line.trim().to_string();
        }
        current.push(line);
    }
    push_section(&mut sections, current_title, &current);

    Ok(sections)
}

/// 带标题的小节总会保留（正文至少有标题行），无标题的前言必须有实际内容
fn push_section(sections: &mut Vec<(String, String)>, title: String, lines: &[&str]) {
    if lines.is_empty() {
        return;
    }
    if title.is_empty() && lines.iter().all(|line| line.trim().is_empty()) {
        return;
    }
    sections.push((title, lines.join("\n")));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_depth() {
        assert_eq!(heading_depth("# Title"), Some(1));
        assert_eq!(heading_depth("### Deep"), Some(3));
        assert_eq!(heading_depth("##"), Some(2));
        assert_eq!(heading_depth("#hashtag"), None);
        assert_eq!(heading_depth("plain # text"), None);
        assert_eq!(heading_depth(""), None);
    }

    #[test]
    fn test_no_headings_cannot_split() {
        assert_eq!(split_markdown("just\nsome\ntext"), Err(SplitError::NoHeadings));
        // 唯一的标题是首行，被当作文档标题丢弃
        assert_eq!(split_markdown("# Title\nbody only"), Err(SplitError::NoHeadings));
    }

    #[test]
    fn test_split_two_top_level_sections() {
        let text = "# Guide\n## Install\nrun setup\n### Linux\napt\n## Usage\ncall it";
        let sections = split_markdown(text).unwrap();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].0, "## Install");
        assert_eq!(sections[0].1, "## Install\nrun setup\n### Linux\napt");
        assert_eq!(sections[1].0, "## Usage");
        assert_eq!(sections[1].1, "## Usage\ncall it");
    }

    #[test]
    fn test_preamble_kept_with_empty_title() {
        let text = "intro line\n\n# First\none\n# Second\ntwo";
        let sections = split_markdown(text).unwrap();

        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0], (String::new(), "intro line\n".to_string()));
        assert_eq!(sections[1].0, "# First");
        assert_eq!(sections[2].0, "# Second");
    }

    #[test]
    fn test_blank_line_after_title_is_not_a_section() {
        let text = "# Guide\n\n## A\nalpha\n## B\nbeta";
        let sections = split_markdown(text).unwrap();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0], ("## A".to_string(), "## A\nalpha".to_string()));
        assert_eq!(sections[1], ("## B".to_string(), "## B\nbeta".to_string()));
    }

    #[test]
    fn test_whitespace_only_preamble_is_dropped() {
        let sections = split_markdown("  \n\t\n\n# One\nfirst\n# Two\nsecond").unwrap();
        let titles: Vec<&str> = sections.iter().map(|(title, _)| title.as_str()).collect();
        assert_eq!(titles, ["# One", "# Two"]);
    }

    #[test]
    fn test_sections_rejoin_to_original() {
        let text = "# Title\npreamble\n## A\na1\na2\n### A.1\ndeep\n## B\nb1\n";
        let sections = split_markdown(text).unwrap();
        let rejoined: Vec<&str> = sections.iter().map(|(_, body)| body.as_str()).collect();
        let original_without_title = text.split_once('\n').unwrap().1;
        assert_eq!(rejoined.join("\n"), original_without_title);
    }

    #[test]
    fn test_recursion_depth_strictly_increases() {
        let text = "# Doc\n## A\n### A1\n#### A1x\ntext\n### A2\nmore\n## B\nb";

        fn walk(text: &str, parent_depth: usize, max_seen: &mut usize) {
            let mut lines: Vec<&str> = text.split('\n').collect();
            if lines.first().is_some_and(|l| l.starts_with('#')) {
                lines.remove(0);
            }
            let Some(depth) = shallowest_heading_depth(lines.iter().copied()) else {
                return;
            };
            assert!(depth > parent_depth);
            *max_seen = (*max_seen).max(depth);
            for (_, body) in split_markdown(text).unwrap() {
                assert!(body.len() < text.len());
                walk(&body, depth, max_seen);
            }
        }

        let mut max_seen = 0;
        walk(text, 0, &mut max_seen);
        assert_eq!(max_seen, 4);
    }
}
