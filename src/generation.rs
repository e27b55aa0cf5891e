//! Content Generation Module
//!
//! The collaborator that turns a content key into copy. Production deployments
//! plug an LLM-backed implementation in behind [`ContentGenerator`]; the
//! [`TemplateGenerator`] renders deterministic default copy and doubles as the
//! fallback source for page renders.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{ContentKey, ContentPayload, FaqItem};
use crate::error::GenerationError;

// == Generator Trait ==
/// Produces a structured payload for one `(page_key, locale)`.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Version of the prompt/template logic; stored with every payload.
    fn version(&self) -> u32;

    async fn generate(&self, key: &ContentKey) -> Result<ContentPayload, GenerationError>;
}

pub type SharedGenerator = Arc<dyn ContentGenerator>;

// == Template Generator ==
/// Locale-aware template copy derived from the page key.
#[derive(Debug, Clone, Copy)]
pub struct TemplateGenerator {
    version: u32,
}

impl TemplateGenerator {
    pub fn new(version: u32) -> Self {
        Self { version }
    }

    /// Renders copy without any I/O.
    pub fn render(&self, key: &ContentKey) -> ContentPayload {
        let topic = topic_from_page_key(&key.page_key);
        let lower = topic.to_lowercase();

        match primary_language(&key.locale).as_str() {
            "nl" => ContentPayload {
                intro: format!(
                    "Alles wat je moet weten over {}, van betrouwbare dierenprofessionals bij jou in de buurt.",
                    lower
                ),
                secondary: Some(
                    "Vergelijk aanbieders, lees ervaringen van baasjes en boek met vertrouwen."
                        .to_string(),
                ),
                bullets: vec![
                    "Geverifieerde dierenprofessionals".to_string(),
                    format!("Heldere prijzen voor {}", lower),
                    "Tips van dierenartsen en ervaren baasjes".to_string(),
                ],
                cta: Some(format!("Vind {} bij jou in de buurt", lower)),
                faq: vec![
                    faq(
                        format!("Wat kost {}?", lower),
                        "De prijs verschilt per regio en aanbieder. Vergelijk de aanbiedingen op deze pagina.",
                    ),
                    faq(
                        "Hoe kies ik een aanbieder?".to_string(),
                        "Let op beoordelingen, certificeringen en ervaring met jouw huisdier.",
                    ),
                ],
            },
            _ => ContentPayload {
                intro: format!(
                    "Everything you need to know about {}, from trusted pet-care professionals near you.",
                    lower
                ),
                secondary: Some(
                    "Compare local providers, read owner reviews and book with confidence."
                        .to_string(),
                ),
                bullets: vec![
                    "Verified pet-care professionals".to_string(),
                    format!("Transparent prices for {}", lower),
                    "Tips from vets and experienced owners".to_string(),
                ],
                cta: Some(format!("Find {} near you", lower)),
                faq: vec![
                    faq(
                        format!("What does {} cost?", lower),
                        "Prices vary by region and provider. Compare the offers on this page to find one that fits your budget.",
                    ),
                    faq(
                        "How do I choose a provider?".to_string(),
                        "Look at reviews, certifications and experience with your kind of pet.",
                    ),
                ],
            },
        }
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    fn version(&self) -> u32 {
        self.version
    }

    async fn generate(&self, key: &ContentKey) -> Result<ContentPayload, GenerationError> {
        Ok(self.render(key))
    }
}

fn faq(question: String, answer: &str) -> FaqItem {
    FaqItem {
        question,
        answer: answer.to_string(),
    }
}

/// "services/dog-vaccines" -> "Dog vaccines"
fn topic_from_page_key(page_key: &str) -> String {
    let slug = page_key
        .trim_matches('/')
        .rsplit('/')
        .find(|segment| !segment.is_empty() && !segment.starts_with(':'))
        .unwrap_or(page_key);
    let words = slug
        .split(|c: char| c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => page_key.to_string(),
    }
}

/// "nl-BE" -> "nl"
fn primary_language(locale: &str) -> String {
    locale
        .split(|c: char| c == '-' || c == '_')
        .next()
        .unwrap_or(locale)
        .to_ascii_lowercase()
}
