//! 单个文档处理器 - 编排层
//!
//! ## 状态流转
//!
//! ```text
//! Loaded → BudgetChecked ─┬─ DirectExtraction ─┐
//!                         └─ RecursiveSplit ───┴→ QuestionsExtracted → AnsweringFanOut → Merged
//! ```
//!
//! - 放得下：直接发一次抽取请求，解析出编号列表
//! - 放不下：在最浅标题处拆分，各小节并发地重新进入预算检查
//! - 每个问题用产生它的那一小节原文去回答，所有回答并发进行
//! - 合并时按原始顺序对齐，输出顺序与完成顺序无关

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use futures::future::{join_all, BoxFuture, FutureExt};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::models::{Document, QaRecord, Section};
use crate::services::document_splitter::split_markdown;
use crate::services::llm_service::{LlmService, SERVICE_FAILURE_SENTINEL};
use crate::services::prompts;
use crate::utils::logging::truncate_text;

/// 编号列表中的一行：`12. 问题内容`
static QUESTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\d+\.[ \t]*(.+)$").expect("valid question regex"));

/// 以标点结尾才算完整的问题
static TERMINAL_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?。！？]$").expect("valid punctuation regex"));

/// 从某一小节抽取出的问题
#[derive(Debug, Clone)]
pub struct ExtractedQuestion {
    /// 小节路径
    pub source: String,
    /// 小节原文，回答时作为依据
    pub context: Arc<str>,
    pub question: String,
}

/// 文档完成进度，只用于日志展示
#[derive(Debug)]
pub struct Progress {
    total: usize,
    done: AtomicUsize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
        }
    }

    /// 记录一个文档完成，返回已完成数量
    pub fn mark_done(&self, path: &str) -> usize {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        info!("📄 {}/{}: 文件 '{}' 处理完成", done, self.total, path);
        done
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// 把模型输出的编号列表解析成问题列表
///
/// 输出可能带有前后缀说明；最后一项如果没有以标点结尾，
/// 多半是被输出 token 上限截断了，直接丢弃。这只是近似判断，
/// 截断也可能恰好发生在标点之后。
pub fn questions_of_output(output: &str) -> Vec<String> {
    let mut questions: Vec<String> = QUESTION_LINE
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    if let Some(last) = questions.last() {
        if !TERMINAL_PUNCTUATION.is_match(last) {
            warn!("丢弃不完整的问题: '{}'", last);
            questions.pop();
        }
    }

    questions
}

/// 文档处理器
pub struct DocumentProcessor {
    service: Arc<LlmService>,
}

impl DocumentProcessor {
    pub fn new(service: Arc<LlmService>) -> Self {
        Self { service }
    }

    /// 抽取文本中的问题，必要时递归拆分
    ///
    /// 无法拆分的分支记一条警告并返回空列表，不影响兄弟分支。
    pub fn extract_questions(
        &self,
        path: String,
        text: String,
    ) -> BoxFuture<'_, Vec<ExtractedQuestion>> {
        async move {
            let text = text.trim();
            if text.is_empty() {
                debug!("'{}' 没有内容，跳过", path);
                return Vec::new();
            }

            if !self.service.planner().can_process(text) {
                info!("✂️ '{}' 超出 token 预算，拆分为更小的小节", path);
                let sections = match split_markdown(text) {
                    Ok(sections) => sections,
                    Err(e) => {
                        warn!(
                            "🚫 放弃过长的文本 '{}' ({} 字符): {}\n  {}",
                            path,
                            text.len(),
                            e,
                            truncate_text(text, 80)
                        );
                        return Vec::new();
                    }
                };

                let branches = sections.into_iter().map(|(title, body)| {
                    let section = Section::new(&path, title, body);
                    self.extract_questions(section.path, section.body)
                });

                return join_all(branches).await.into_iter().flatten().collect();
            }

            let output = self
                .service
                .call(&prompts::extraction_conversation(text))
                .await;
            if output == SERVICE_FAILURE_SENTINEL {
                warn!("'{}' 的问题抽取失败，该小节不产生问答对", path);
                return Vec::new();
            }

            let context: Arc<str> = Arc::from(text);
            questions_of_output(&output)
                .into_iter()
                .map(|question| ExtractedQuestion {
                    source: path.clone(),
                    context: context.clone(),
                    question,
                })
                .collect()
        }
        .boxed()
    }

    /// 基于给定原文回答问题
    pub async fn answer_question(&self, question: &str, context: &str) -> String {
        self.service
            .call(&prompts::answering_conversation(question, context))
            .await
    }

    /// 处理单个文档：抽取问题，并发回答，按顺序合并
    pub async fn process_document(
        &self,
        document: &Document,
        progress: &Progress,
    ) -> Vec<QaRecord> {
        let questions = self
            .extract_questions(document.path.clone(), document.text.clone())
            .await;

        let answers = join_all(
            questions
                .iter()
                .map(|q| self.answer_question(&q.question, &q.context)),
        )
        .await;

        let records: Vec<QaRecord> = questions
            .into_iter()
            .zip(answers)
            .map(|(q, answer)| QaRecord {
                source: q.source,
                question: q.question,
                answer,
            })
            .collect();

        progress.mark_done(&document.path);
        records
    }

    /// 并发处理所有文档，结果按输入顺序拼接
    pub async fn process_documents(&self, documents: &[Document]) -> Vec<QaRecord> {
        let progress = Progress::new(documents.len());
        info!("🚀 开始从 {} 个文件中抽取问题", documents.len());

        let per_document = join_all(
            documents
                .iter()
                .map(|document| self.process_document(document, &progress)),
        )
        .await;

        per_document.into_iter().flatten().collect()
    }
}
