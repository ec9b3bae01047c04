use thiserror::Error;

/// 唯二会穿出流水线边界的错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("safety violation ({reason}): {statement}")]
    SafetyViolation { statement: String, reason: String },
}
