use thiserror::Error;

/// Failures that keep a quiz from starting. Everything else the engine is
/// asked to do out of turn is ignored rather than reported.
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("question data unavailable: {0}")]
    DataUnavailable(String),

    #[error("no questions available for this quiz")]
    EmptyQuiz,
}

impl QuizError {
    pub fn invalid_question(prompt: &str, reason: &str) -> QuizError {
        QuizError::DataUnavailable(format!("invalid question {:?}: {}", prompt, reason))
    }
}
