//! Reply drafting on top of retrieval.
//!
//! Assembles the generation prompt from retrieved facts and corrections and
//! hands it to a [`TextGenerator`]. Generation failures never reach the
//! caller as errors: the draft carries a fixed placeholder and zero
//! confidence instead, so it is always routed to manual review.

use serde::Serialize;
use tracing::{debug, warn};

use crate::collection::{SearchHit, TenantId};
use crate::error::RagError;
use crate::retrieve::{KnowledgeRetriever, RetrievalResult, TopK};

/// Facts included in the prompt.
const MAX_FACTS_IN_PROMPT: usize = 2;
const FACT_PREVIEW_CHARS: usize = 300;
const CORRECTION_PREVIEW_CHARS: usize = 400;

/// Reply body used when the generator fails.
pub const DEGRADED_RESPONSE: &str =
    "Non è stato possibile generare una risposta automatica. Questa email richiede una revisione manuale.";

const NO_FACTS_TEXT: &str = "No specific information available.";

/// Language codes with a dedicated reply instruction, and their names.
const LANGUAGES: &[(&str, &str, &str)] = &[
    (
        "it",
        "Italian",
        "Rispondi in italiano. Mantieni un tono professionale e cortese.",
    ),
    (
        "en",
        "English",
        "Respond in English. Maintain a professional and courteous tone.",
    ),
    (
        "fr",
        "French",
        "Répondez en français. Maintenez un ton professionnel et courtois.",
    ),
    (
        "es",
        "Spanish",
        "Responde en español. Mantén un tono profesional y cortés.",
    ),
    ("ar", "Arabic", "الرد باللغة العربية. حافظ على نبرة مهنية ومهذبة."),
    (
        "ur",
        "Urdu",
        "اردو میں جواب دیں۔ پیشہ ورانہ اور شائستہ لہجہ برقرار رکھیں۔",
    ),
    (
        "hi",
        "Hindi",
        "हिंदी में उत्तर दें। पेशेवर और विनम्र स्वर बनाए रखें।",
    ),
    (
        "bn",
        "Bengali",
        "বাংলায় উত্তর দিন। একটি পেশাদার এবং বিনয়ী স্বর বজায় রাখুন।",
    ),
];

/// A language model, API-based or local.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, RagError>;
}

/// Reply instruction for a detected language code.
///
/// Unknown codes get a generic English instruction naming the language;
/// no code at all asks for a reply in the student's own language.
pub fn language_instruction(code: Option<&str>) -> String {
    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty() && *c != "unknown") else {
        return "Respond in the same language as the student email. Maintain a professional and courteous tone."
            .to_string();
    };
    let code = code.to_lowercase();

    match LANGUAGES.iter().find(|(known, _, _)| *known == code) {
        Some((_, _, instruction)) => (*instruction).to_string(),
        None => format!(
            "Respond in {}. Maintain a professional and courteous tone.",
            code.to_uppercase()
        ),
    }
}

/// Human-readable name of a language code, or the code upper-cased.
pub fn language_name(code: &str) -> String {
    LANGUAGES
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, name, _)| (*name).to_string())
        .unwrap_or_else(|| code.to_uppercase())
}

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn format_facts(facts: &[SearchHit]) -> String {
    if facts.is_empty() {
        return NO_FACTS_TEXT.to_string();
    }
    facts
        .iter()
        .take(MAX_FACTS_IN_PROMPT)
        .map(|hit| preview(&hit.document, FACT_PREVIEW_CHARS).trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_corrections(corrections: &[SearchHit]) -> String {
    if corrections.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = corrections
        .iter()
        .map(|hit| format!("- {}", preview(&hit.document, CORRECTION_PREVIEW_CHARS).trim()))
        .collect();
    format!("\n\nIMPORTANT CORRECTIONS:\n{}", lines.join("\n"))
}

/// Builds the generation prompt.
pub fn build_prompt(
    base_instruction: &str,
    language: Option<&str>,
    context: &RetrievalResult,
    email_body: &str,
) -> String {
    format!(
        "{base_instruction}\n\n{}\n\nINFORMATION:\n{}{}\n\nSTUDENT EMAIL:\n{email_body}\n\nRESPONSE:",
        language_instruction(language),
        format_facts(&context.facts),
        format_corrections(&context.corrections),
    )
}

/// A drafted reply and the evidence behind it.
#[derive(Debug, Clone, Serialize)]
pub struct Draft {
    pub response: String,
    pub confidence: f32,
    pub auto_approve: bool,
    pub generation_failed: bool,
    pub contexts: RetrievalResult,
}

/// Per-request inputs of [`ResponseDrafter::draft`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DraftRequest<'a> {
    pub email_body: &'a str,
    pub tenant: Option<&'a TenantId>,
    /// Detected language code of the email
    pub language: Option<&'a str>,
    /// Tenant-specific system prompt replacing the base instruction
    pub custom_prompt: Option<&'a str>,
}

pub struct ResponseDrafter<'a> {
    retriever: &'a KnowledgeRetriever,
    generator: &'a dyn TextGenerator,
    base_instruction: String,
    top_k: TopK,
    confidence_threshold: f32,
}

impl<'a> ResponseDrafter<'a> {
    pub fn new(
        retriever: &'a KnowledgeRetriever,
        generator: &'a dyn TextGenerator,
        base_instruction: impl Into<String>,
        top_k: TopK,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            retriever,
            generator,
            base_instruction: base_instruction.into(),
            top_k,
            confidence_threshold,
        }
    }

    /// Prompt that [`ResponseDrafter::draft`] would send, with its context.
    pub fn prepare(&self, request: &DraftRequest<'_>) -> (String, RetrievalResult) {
        let contexts = self
            .retriever
            .retrieve(request.email_body, request.tenant, self.top_k);
        let base = request
            .custom_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(self.base_instruction.as_str());
        let prompt = build_prompt(base, request.language, &contexts, request.email_body);
        (prompt, contexts)
    }

    /// Retrieves context, generates a reply and scores it.
    pub fn draft(&self, request: &DraftRequest<'_>) -> Draft {
        let (prompt, contexts) = self.prepare(request);
        debug!(prompt_chars = prompt.chars().count(), "Generating draft");

        match self.generator.generate(&prompt) {
            Ok(response) => {
                let confidence = contexts.confidence();
                Draft {
                    response,
                    confidence,
                    auto_approve: confidence >= self.confidence_threshold,
                    generation_failed: false,
                    contexts,
                }
            }
            Err(e) => {
                warn!(error = %e, "Generation failed, returning placeholder draft");
                Draft {
                    response: DEGRADED_RESPONSE.to_string(),
                    confidence: 0.0,
                    auto_approve: false,
                    generation_failed: true,
                    contexts,
                }
            }
        }
    }
}
