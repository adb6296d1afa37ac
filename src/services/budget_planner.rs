//! 预算规划 - 业务能力层
//!
//! 在发出任何请求之前，同时检查"抽取"和"回答"两个阶段能否放进模型的上下文窗口。
//! 只检查抽取会出现抽取成功、回答却放不下的情况。

use serde::Deserialize;

use crate::models::Conversation;
use crate::services::prompts;
use crate::services::token_estimator::TokenEstimator;

/// 经验校准参数，随部署环境调整
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// 单个问题的平均 token 数
    pub avg_question_tokens: f64,
    /// 单个回答的平均 token 数
    pub avg_answer_tokens: f64,
    /// 所有问题 token 总和 / 原文 token 数
    pub question_to_text_ratio: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            avg_question_tokens: 15.28,
            avg_answer_tokens: 94.78,
            question_to_text_ratio: 0.14,
        }
    }
}

/// 一次请求的 token 预算
///
/// 不变式：`available = model_limit - padding - messages_cost`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub model_limit: usize,
    pub padding: usize,
    pub messages_cost: usize,
    pub available: i64,
}

impl TokenBudget {
    pub fn new(model_limit: usize, padding: usize, messages_cost: usize) -> Self {
        Self {
            model_limit,
            padding,
            messages_cost,
            available: model_limit as i64 - padding as i64 - messages_cost as i64,
        }
    }

    /// 预测输出能否放进剩余预算
    pub fn admits(&self, predicted_output: f64) -> bool {
        self.available > 0 && predicted_output < self.available as f64
    }

    /// 可以向服务请求的最大输出 token 数
    pub fn max_output_tokens(&self) -> Option<u32> {
        u32::try_from(self.available).ok().filter(|&n| n > 0)
    }
}

#[derive(Debug, Clone)]
pub struct BudgetPlanner {
    estimator: TokenEstimator,
    model_limit: usize,
    padding: usize,
    calibration: Calibration,
    empty_extraction_cost: usize,
    empty_answering_cost: usize,
}

impl BudgetPlanner {
    pub fn new(
        estimator: TokenEstimator,
        model_limit: usize,
        padding: usize,
        calibration: Calibration,
    ) -> Self {
        let empty_extraction_cost =
            estimator.count_messages(prompts::extraction_conversation("").messages());
        let empty_answering_cost =
            estimator.count_messages(prompts::answering_conversation("", "").messages());

        Self {
            estimator,
            model_limit,
            padding,
            calibration,
            empty_extraction_cost,
            empty_answering_cost,
        }
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// 对话的实际预算（用来决定请求的 `max_tokens`）
    pub fn budget_for(&self, conversation: &Conversation) -> TokenBudget {
        let messages_cost = self.estimator.count_messages(conversation.messages());
        TokenBudget::new(self.model_limit, self.padding, messages_cost)
    }

    /// 预测抽取对话的总 token 数
    ///
    /// 至少一个问题，或与文本长度成比例的问题量，再加半个问题的余量。
    pub fn predict_extraction(&self, text_tokens: usize) -> f64 {
        let c = &self.calibration;
        let questions = c
            .avg_question_tokens
            .max(text_tokens as f64 * c.question_to_text_ratio);
        self.empty_extraction_cost as f64
            + text_tokens as f64
            + questions
            + c.avg_question_tokens / 2.0
    }

    /// 预测回答对话的总 token 数（问题、回答各留半个的余量）
    pub fn predict_answering(&self, text_tokens: usize) -> f64 {
        let c = &self.calibration;
        self.empty_answering_cost as f64
            + text_tokens as f64
            + c.avg_question_tokens * 1.5
            + c.avg_answer_tokens * 1.5
    }

    fn headroom(&self, predicted_total: f64) -> f64 {
        (self.model_limit as f64 - self.padding as f64) - predicted_total
    }

    /// 两个阶段都留有正的余量才可以直接处理
    pub fn can_process(&self, text: &str) -> bool {
        let text_tokens = self.estimator.count_text(text);
        let extraction = self.headroom(self.predict_extraction(text_tokens));
        let answering = self.headroom(self.predict_answering(text_tokens));
        tracing::trace!(
            text_tokens,
            extraction_headroom = extraction,
            answering_headroom = answering,
            "预算检查"
        );
        extraction > 0.0 && answering > 0.0
    }
}
