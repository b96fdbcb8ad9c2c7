//! Grounded answer composition with per-failure-mode fallbacks.
//!
//! The composer turns resolved grounding (see
//! [`crate::retrieve::resolve_grounding`]) into a [`ConversationTurn`],
//! degrading independently at each failure point instead of collapsing into
//! a single "unavailable" response:
//!
//! - [`GroundingMode::None`] → the configured no-answer response; only a
//!   document with no chunks at all, or a question sharing nothing with it,
//!   ends here.
//! - Generation failure (unavailable, timeout, malformed) → a deterministic
//!   extractive answer quoting the top chunk, flagged `used_fallback`, still
//!   carrying accurate provenance.
//!
//! Citations are always the `source_ref`s of the chunks that were placed in
//! the prompt — retrieval metadata is verifiable, model-reported citations
//! are not, so the latter are never trusted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::{GenerationConfig, QaConfig};
use crate::error::ProviderError;
use crate::generation::GenerationProvider;
use crate::models::{Chunk, ConversationTurn, Document, GroundingMode, RetrievalResult, SourceRef};
use crate::text;

/// Composes grounded answers for one engine instance.
pub struct AnswerComposer {
    generator: Arc<dyn GenerationProvider>,
    gen_cfg: GenerationConfig,
    qa: QaConfig,
}

impl AnswerComposer {
    pub fn new(
        generator: Arc<dyn GenerationProvider>,
        gen_cfg: GenerationConfig,
        qa: QaConfig,
    ) -> Self {
        Self {
            generator,
            gen_cfg,
            qa,
        }
    }

    /// Build a turn from resolved grounding. Always produces a turn;
    /// degradation is internal.
    pub async fn compose(
        &self,
        document: &Document,
        hits: &[RetrievalResult],
        grounding: GroundingMode,
        history: &[ConversationTurn],
        question: &str,
    ) -> ConversationTurn {
        if grounding == GroundingMode::None || hits.is_empty() {
            tracing::debug!(document = %document.id, "no grounding found for question");
            return self.no_grounding_turn(question);
        }

        let context: Vec<&Chunk> = hits
            .iter()
            .filter_map(|r| document.chunks.get(r.chunk_index))
            .collect();
        if context.is_empty() {
            return self.no_grounding_turn(question);
        }

        let sources = cited_sources(&context);
        let (system, user) = build_prompt(&self.qa, &context, history, question);

        match self.generate(&system, &user).await {
            Ok(answer) => {
                // A model that followed the no-answer instruction grounded
                // nothing; don't attach citations to it.
                let sources = if answer.trim() == self.qa.no_answer_text {
                    Vec::new()
                } else {
                    sources
                };
                ConversationTurn {
                    question: question.to_string(),
                    answer,
                    sources,
                    grounding,
                    used_fallback: false,
                    answered_at: Utc::now(),
                }
            }
            Err(e) => {
                match &e {
                    ProviderError::Timeout(secs) => tracing::warn!(
                        document = %document.id,
                        timeout_secs = secs,
                        "generation timed out, composing extractive answer"
                    ),
                    other => tracing::warn!(
                        document = %document.id,
                        error = %other,
                        "generation failed, composing extractive answer"
                    ),
                }
                self.extractive_turn(question, &context, grounding)
            }
        }
    }

    /// Call the generation provider under a hard wall-clock budget. The
    /// budget is twice the per-request timeout so the provider's own
    /// primary→fallback model sequence can complete.
    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let budget = Duration::from_secs(self.gen_cfg.timeout_secs.saturating_mul(2).max(1));
        match tokio::time::timeout(budget, self.generator.complete(system, user)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(budget.as_secs())),
        }
    }

    /// Terminal state: nothing in the document grounds this question.
    fn no_grounding_turn(&self, question: &str) -> ConversationTurn {
        ConversationTurn {
            question: question.to_string(),
            answer: self.qa.no_answer_text.clone(),
            sources: Vec::new(),
            grounding: GroundingMode::None,
            used_fallback: false,
            answered_at: Utc::now(),
        }
    }

    /// Deterministic generation fallback: quote the most relevant chunk.
    fn extractive_turn(
        &self,
        question: &str,
        context: &[&Chunk],
        grounding: GroundingMode,
    ) -> ConversationTurn {
        let Some(top) = context.first() else {
            return self.no_grounding_turn(question);
        };
        let excerpt_end = text::snap_to_char_boundary(&top.text, self.qa.excerpt_chars);
        let mut answer = format!(
            "Based on the document, here's relevant information:\n\n{}",
            top.text[..excerpt_end].trim()
        );
        if excerpt_end < top.text.len() {
            answer.push_str("...");
        }

        ConversationTurn {
            question: question.to_string(),
            answer,
            sources: cited_sources(&context[..1]),
            grounding,
            used_fallback: true,
            answered_at: Utc::now(),
        }
    }
}

/// Provenance of the prompt chunks: deduplicated, in prompt order, with
/// refs that carry no information dropped.
fn cited_sources(context: &[&Chunk]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();
    for chunk in context {
        if chunk.source_ref.is_empty() {
            continue;
        }
        if !sources.contains(&chunk.source_ref) {
            sources.push(chunk.source_ref.clone());
        }
    }
    sources
}

/// Assemble the grounding prompt: instruction, labeled chunks, bounded
/// history, question.
fn build_prompt(
    qa: &QaConfig,
    context: &[&Chunk],
    history: &[ConversationTurn],
    question: &str,
) -> (String, String) {
    let system = format!(
        "You are a document analysis assistant. Answer the question using ONLY the \
         provided context. Do not use outside knowledge. If the context does not \
         contain the answer, reply exactly: {}",
        qa.no_answer_text
    );

    let mut user = String::from("Context:\n");
    for (i, chunk) in context.iter().enumerate() {
        user.push_str(&format!("[Chunk {}]{}:\n", i + 1, ref_label(&chunk.source_ref)));
        user.push_str(chunk.text.trim());
        user.push_str("\n\n");
    }

    if !history.is_empty() {
        user.push_str("Conversation so far:\n");
        for turn in history {
            user.push_str(&format!("User: {}\n", turn.question));
            user.push_str(&format!("Assistant: {}\n", turn.answer));
        }
        user.push('\n');
    }

    user.push_str(&format!("Question: {}", question));
    (system, user)
}

/// Render a source ref as a prompt label, e.g. ` (Page 2, "PAYMENT TERMS")`.
fn ref_label(source: &SourceRef) -> String {
    match (&source.page, &source.section) {
        (Some(page), Some(section)) => format!(" (Page {}, \"{}\")", page, section),
        (Some(page), None) => format!(" (Page {})", page),
        (None, Some(section)) => format!(" (\"{}\")", section),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        response: Option<String>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedGenerator {
        fn answering(text: &str) -> Self {
            Self {
                response: Some(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedGenerator {
        async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            match &self.response {
                Some(text) => Ok(text.clone()),
                None => Err(ProviderError::Unavailable("scripted outage".to_string())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn chunk(index: usize, text: &str, page: Option<u32>) -> Chunk {
        Chunk {
            chunk_index: index,
            text: text.to_string(),
            start: 0,
            end: text.len(),
            overlap: 0,
            source_ref: SourceRef {
                page,
                section: None,
            },
            vector: None,
            degraded_embedding: false,
        }
    }

    fn document(chunks: Vec<Chunk>) -> Document {
        Document {
            id: "doc-1".to_string(),
            raw_text: chunks.iter().map(|c| c.text.as_str()).collect(),
            chunks,
            page_count: 1,
            created_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    fn hit(chunk_index: usize, score: f32) -> RetrievalResult {
        RetrievalResult { chunk_index, score }
    }

    fn composer(generator: Arc<ScriptedGenerator>) -> AnswerComposer {
        AnswerComposer::new(
            generator as Arc<dyn GenerationProvider>,
            GenerationConfig::default(),
            QaConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_grounded_answer_with_sources() {
        let doc = document(vec![
            chunk(0, "Shipping terms are FOB destination.", Some(1)),
            chunk(1, "Invoice Total: $500, Due: 2026-02-14", Some(2)),
        ]);
        let composer = composer(Arc::new(ScriptedGenerator::answering("The total is $500.")));

        let turn = composer
            .compose(
                &doc,
                &[hit(1, 0.8)],
                GroundingMode::Lexical,
                &[],
                "What is the invoice total?",
            )
            .await;

        assert_eq!(turn.answer, "The total is $500.");
        assert_eq!(turn.grounding, GroundingMode::Lexical);
        assert!(!turn.used_fallback);
        assert_eq!(
            turn.sources,
            vec![SourceRef {
                page: Some(2),
                section: None
            }]
        );
    }

    #[tokio::test]
    async fn test_no_grounding_terminal_state() {
        let doc = document(vec![chunk(0, "Shipping terms.", Some(1))]);
        let generator = Arc::new(ScriptedGenerator::answering("should never be called"));
        let composer = composer(Arc::clone(&generator));

        let turn = composer
            .compose(&doc, &[], GroundingMode::None, &[], "CEO phone number?")
            .await;

        assert_eq!(turn.answer, QaConfig::default().no_answer_text);
        assert_eq!(turn.grounding, GroundingMode::None);
        assert!(turn.sources.is_empty());
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_outage_yields_extractive_fallback() {
        let doc = document(vec![
            chunk(0, "Header page with nothing relevant.", Some(1)),
            chunk(1, "Invoice Total: $500, Due: 2026-02-14", Some(2)),
        ]);
        let composer = composer(Arc::new(ScriptedGenerator::failing()));

        let turn = composer
            .compose(
                &doc,
                &[hit(1, 0.9), hit(0, 0.2)],
                GroundingMode::Vector,
                &[],
                "What is the invoice total?",
            )
            .await;

        assert!(turn.used_fallback);
        assert_eq!(turn.grounding, GroundingMode::Vector);
        assert!(turn.answer.contains("Invoice Total: $500"));
        // Only the quoted chunk is cited by the extractive path.
        assert_eq!(
            turn.sources,
            vec![SourceRef {
                page: Some(2),
                section: None
            }]
        );
    }

    #[tokio::test]
    async fn test_fallback_is_deterministic() {
        let doc = document(vec![
            chunk(0, "Alpha content about invoices and totals.", Some(1)),
            chunk(1, "Beta content about shipping.", Some(2)),
        ]);
        let hits = [hit(0, 0.7), hit(1, 0.3)];

        let first = composer(Arc::new(ScriptedGenerator::failing()))
            .compose(&doc, &hits, GroundingMode::Vector, &[], "invoice totals")
            .await;
        let second = composer(Arc::new(ScriptedGenerator::failing()))
            .compose(&doc, &hits, GroundingMode::Vector, &[], "invoice totals")
            .await;

        assert_eq!(first.answer, second.answer);
        assert_eq!(first.sources, second.sources);
        assert!(first.used_fallback && second.used_fallback);
    }

    #[tokio::test]
    async fn test_long_chunk_excerpt_is_truncated() {
        let long = "invoice ".repeat(200); // 1600 bytes
        let doc = document(vec![chunk(0, long.trim_end(), Some(1))]);
        let composer = composer(Arc::new(ScriptedGenerator::failing()));

        let turn = composer
            .compose(&doc, &[hit(0, 0.9)], GroundingMode::Vector, &[], "invoice")
            .await;

        assert!(turn.used_fallback);
        assert!(turn.answer.ends_with("..."));
        assert!(turn.answer.len() < 600);
    }

    #[tokio::test]
    async fn test_prompt_contains_context_history_and_question() {
        let doc = document(vec![chunk(0, "Invoice Total: $500", Some(3))]);
        let generator = Arc::new(ScriptedGenerator::answering("ok"));
        let composer = composer(Arc::clone(&generator));

        let history = vec![ConversationTurn {
            question: "earlier question".to_string(),
            answer: "earlier answer".to_string(),
            sources: Vec::new(),
            grounding: GroundingMode::Lexical,
            used_fallback: false,
            answered_at: Utc::now(),
        }];

        let turn = composer
            .compose(
                &doc,
                &[hit(0, 1.0)],
                GroundingMode::Vector,
                &history,
                "What is the invoice total?",
            )
            .await;
        assert_eq!(turn.answer, "ok");

        let prompts = generator.prompts.lock().unwrap();
        let (system, user) = prompts.first().expect("generator was called");
        assert!(system.contains("ONLY the provided context"));
        assert!(user.contains("[Chunk 1] (Page 3):"));
        assert!(user.contains("Invoice Total: $500"));
        assert!(user.contains("User: earlier question"));
        assert!(user.contains("Assistant: earlier answer"));
        assert!(user.ends_with("Question: What is the invoice total?"));
    }

    #[tokio::test]
    async fn test_model_no_answer_reply_clears_sources() {
        let no_answer = QaConfig::default().no_answer_text;
        let doc = document(vec![chunk(0, "invoice text here", Some(1))]);
        let composer = composer(Arc::new(ScriptedGenerator::answering(&no_answer)));

        let turn = composer
            .compose(&doc, &[hit(0, 0.5)], GroundingMode::Vector, &[], "invoice")
            .await;
        assert_eq!(turn.answer, no_answer);
        assert!(turn.sources.is_empty());
        assert!(!turn.used_fallback);
    }

    #[tokio::test]
    async fn test_slow_generator_times_out_into_fallback() {
        struct SlowGenerator;
        #[async_trait]
        impl GenerationProvider for SlowGenerator {
            async fn complete(&self, _s: &str, _u: &str) -> Result<String, ProviderError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("too late".to_string())
            }
            fn name(&self) -> &str {
                "slow"
            }
        }

        let doc = document(vec![chunk(0, "Invoice Total: $500", Some(1))]);
        let composer = AnswerComposer::new(
            Arc::new(SlowGenerator),
            GenerationConfig {
                timeout_secs: 0, // budget clamps to 1s
                ..GenerationConfig::default()
            },
            QaConfig::default(),
        );

        let turn = composer
            .compose(&doc, &[hit(0, 0.9)], GroundingMode::Vector, &[], "total?")
            .await;
        assert!(turn.used_fallback);
        assert!(turn.answer.contains("Invoice Total"));
    }

    #[test]
    fn test_cited_sources_dedup_and_order() {
        let a = chunk(0, "a", Some(1));
        let b = chunk(1, "b", Some(2));
        let c = chunk(2, "c", Some(1));
        let none = chunk(3, "d", None);
        let sources = cited_sources(&[&b, &a, &c, &none]);
        assert_eq!(
            sources,
            vec![
                SourceRef {
                    page: Some(2),
                    section: None
                },
                SourceRef {
                    page: Some(1),
                    section: None
                },
            ]
        );
    }

    #[test]
    fn test_ref_label_variants() {
        assert_eq!(
            ref_label(&SourceRef {
                page: Some(2),
                section: Some("TERMS".into())
            }),
            " (Page 2, \"TERMS\")"
        );
        assert_eq!(
            ref_label(&SourceRef {
                page: None,
                section: None
            }),
            ""
        );
    }
}
