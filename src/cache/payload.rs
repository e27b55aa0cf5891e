//! Generated content payload and its validation rules.

use serde::{Deserialize, Serialize};

use crate::cache::{MAX_BULLETS, MAX_FAQ_ITEMS, MAX_PAYLOAD_SIZE};
use crate::error::{ContentCacheError, Result};

/// A single FAQ question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqItem {
    pub question: String,
    pub answer: String,
}

/// Structured SEO copy for one page. Every section is optional so that
/// renderers can show whatever parts were generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPayload {
    #[serde(default)]
    pub intro: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta: Option<String>,
    #[serde(default)]
    pub faq: Vec<FaqItem>,
}

impl ContentPayload {
    pub fn intro_only(intro: impl Into<String>) -> Self {
        Self {
            intro: intro.into(),
            ..Self::default()
        }
    }

    /// True when no section carries any text.
    pub fn is_empty(&self) -> bool {
        self.intro.trim().is_empty()
            && self.secondary.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.bullets.is_empty()
            && self.cta.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.faq.is_empty()
    }

    /// Rejects payloads that renderers could not use.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ContentCacheError::Validation(
                "payload has no content sections".to_string(),
            ));
        }
        if self.bullets.len() > MAX_BULLETS {
            return Err(ContentCacheError::Validation(format!(
                "payload has {} bullets, maximum is {}",
                self.bullets.len(),
                MAX_BULLETS
            )));
        }
        if let Some(pos) = self.bullets.iter().position(|b| b.trim().is_empty()) {
            return Err(ContentCacheError::Validation(format!(
                "bullet {} is blank",
                pos
            )));
        }
        if self.faq.len() > MAX_FAQ_ITEMS {
            return Err(ContentCacheError::Validation(format!(
                "payload has {} FAQ items, maximum is {}",
                self.faq.len(),
                MAX_FAQ_ITEMS
            )));
        }
        if let Some(pos) = self
            .faq
            .iter()
            .position(|item| item.question.trim().is_empty() || item.answer.trim().is_empty())
        {
            return Err(ContentCacheError::Validation(format!(
                "FAQ item {} needs both a question and an answer",
                pos
            )));
        }

        let size = serde_json::to_vec(self)
            .map_err(|e| ContentCacheError::Internal(e.to_string()))?
            .len();
        if size > MAX_PAYLOAD_SIZE {
            return Err(ContentCacheError::Validation(format!(
                "payload exceeds maximum size of {} bytes",
                MAX_PAYLOAD_SIZE
            )));
        }
        Ok(())
    }
}
