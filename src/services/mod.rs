pub mod budget_planner;
pub mod document_splitter;
pub mod llm_service;
pub mod prompts;
pub mod rate_limiter;
pub mod token_estimator;

pub use budget_planner::{BudgetPlanner, Calibration, TokenBudget};
pub use document_splitter::split_markdown;
pub use llm_service::{
    CompletionBackend, CredentialPool, LlmService, OpenAiBackend, RetryPolicy,
    SERVICE_FAILURE_SENTINEL,
};
pub use rate_limiter::{Admission, AdmissionGate, TokenBucketLimiter};
pub use token_estimator::TokenEstimator;
