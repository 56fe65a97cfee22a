//! Language model gateway trait.

use async_trait::async_trait;

use crate::error::ModelError;

/// Completes a composed prompt.
///
/// Stateless: no conversation is kept between calls and no caching is
/// expected at this layer. The returned text is treated as opaque.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, ModelError>;
}
