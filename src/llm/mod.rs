//! Text-generation integration.
//!
//! Defines the `TextGenerator` trait and provides implementations for
//! Google Gemini and any OpenAI-compatible chat completions endpoint.

pub mod gemini;
pub mod openai;

use async_trait::async_trait;

use crate::types::ModelError;

/// Abstraction over a generative text model.
///
/// Implementors send a single prompt and return the model's free-text
/// reply. They must not retry internally: a provider outage is reported as
/// `ModelError::Unavailable` and the caller owns the retry policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_content(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Map a non-success HTTP status to a `ModelError`.
///
/// 503 is the only status treated as a transient outage.
pub(crate) fn status_error(status: u16, body: String) -> ModelError {
    if status == 503 {
        ModelError::Unavailable(body)
    } else {
        ModelError::Api {
            status,
            message: body,
        }
    }
}
