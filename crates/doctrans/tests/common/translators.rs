//! In-process translators with scripted behavior.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use doctrans::translation::{TranslateError, Translator};

/// Returns its input unchanged.
#[derive(Default)]
pub struct EchoTranslator {
    calls: AtomicUsize,
}

impl EchoTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate(&self, text: &str, _target: &str) -> Result<String, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(text.to_string())
    }
}

enum Rule {
    FailWhenContains(&'static str, TranslateError),
    FailFirst(usize),
}

/// Prefixes each translation with `[target] ` unless its rule says to fail.
pub struct ScriptedTranslator {
    calls: AtomicUsize,
    rule: Rule,
}

impl ScriptedTranslator {
    /// Fails every call whose text contains `marker`.
    pub fn failing_on(marker: &'static str, error: TranslateError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            rule: Rule::FailWhenContains(marker, error),
        }
    }

    /// Fails the first `n` calls with `ServiceUnavailable`, numbering them.
    pub fn failing_first(n: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            rule: Rule::FailFirst(n),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslateError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.rule {
            Rule::FailWhenContains(marker, error) if text.contains(marker) => Err(error.clone()),
            Rule::FailFirst(n) if call <= *n => Err(TranslateError::Unavailable(format!(
                "connection refused on call {}",
                call
            ))),
            _ => Ok(format!("[{}] {}", target, text)),
        }
    }
}
