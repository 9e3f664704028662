pub mod client;
pub mod error;

use async_trait::async_trait;

pub use client::{Language, TranslationClient};
pub use error::TranslateError;

/// Translates text into a target language. The source language is always
/// detected by the implementation.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str)
        -> Result<String, TranslateError>;
}
