//! Context assembly: retrieved chunks, recent turns, and fallback excerpts
//! rendered into the text block the prompt is built around.
//!
//! # Layout
//!
//! ```text
//! Relevant document excerpts:
//! [Document: policy.txt | Section 1]
//! <chunk content>
//!
//! [Document: policy.txt | Section 4]
//! <chunk content>
//!
//! Previous Conversation:
//! User: ...
//! Assistant: ...
//!
//! Additional document context:
//! <fallback excerpts, only when the above is short>
//! ```
//!
//! # Determinism
//!
//! Identical inputs always produce identical output. Nothing here reads the
//! clock or depends on ordering outside the inputs.

use docchat_core::conversation::ConversationTurn;
use docchat_core::document::RetrievalResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::token;

// ── Types ─────────────────────────────────────────────────────────────────

pub const EXCERPTS_HEADER: &str = "Relevant document excerpts:";
pub const CONVERSATION_HEADER: &str = "Previous Conversation:";
pub const SUPPLEMENT_HEADER: &str = "Additional document context:";

/// Everything the assembler reads for one query.
pub struct AssemblyInput<'a> {
    /// The user's question.
    pub query: &'a str,
    /// Retrieval results, best first.
    pub retrieved: &'a [RetrievalResult],
    /// Retained conversation turns, oldest first.
    pub recent_turns: &'a [ConversationTurn],
    /// Pre-rendered document excerpts for when retrieval finds little or nothing.
    pub fallback_text: &'a str,
}

/// How the fallback excerpts were used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackUsage {
    /// Retrieved chunks alone were long enough.
    None,
    /// Retrieval returned nothing; the context is the fallback text.
    Replaced,
    /// Appended after thin retrieved context.
    Supplemented,
}

/// The assembled context.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub metadata: AssemblyMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub chunks_included: usize,
    pub turns_included: usize,
    pub fallback: FallbackUsage,
    /// Length of `text` in characters.
    pub chars: usize,
    pub estimated_tokens: usize,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless apart from its threshold.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    min_context_length: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(500)
    }
}

impl ContextAssembler {
    /// Below `min_context_length` characters the fallback text is appended.
    pub fn new(min_context_length: usize) -> Self {
        Self { min_context_length }
    }

    pub fn min_context_length(&self) -> usize {
        self.min_context_length
    }

    pub fn assemble(&self, input: &AssemblyInput<'_>) -> AssembledContext {
        if input.retrieved.is_empty() {
            let text = input.fallback_text.trim().to_string();
            debug!(query_chars = input.query.chars().count(), "No retrieval results, using fallback context");
            return Self::finish(text, 0, 0, FallbackUsage::Replaced);
        }

        let mut sections: Vec<String> = Vec::new();

        // ── Retrieved chunks ───────────────────────────────────────────────
        let blocks: Vec<String> = input
            .retrieved
            .iter()
            .map(|r| {
                format!(
                    "[Document: {} | Section {}]\n{}",
                    r.chunk.document_name,
                    r.chunk.chunk_index + 1,
                    r.chunk.content
                )
            })
            .collect();
        sections.push(format!("{EXCERPTS_HEADER}\n{}", blocks.join("\n\n")));

        // ── Conversation ───────────────────────────────────────────────────
        if !input.recent_turns.is_empty() {
            let turns: Vec<String> = input
                .recent_turns
                .iter()
                .map(|t| format!("User: {}\nAssistant: {}", t.user, t.assistant))
                .collect();
            sections.push(format!("{CONVERSATION_HEADER}\n{}", turns.join("\n\n")));
        }

        let mut text = sections.join("\n\n");

        // ── Supplement ─────────────────────────────────────────────────────
        let fallback = input.fallback_text.trim();
        let mut usage = FallbackUsage::None;
        if text.trim().chars().count() < self.min_context_length && !fallback.is_empty() {
            text.push_str(&format!("\n\n{SUPPLEMENT_HEADER}\n{fallback}"));
            usage = FallbackUsage::Supplemented;
        }

        Self::finish(
            text.trim().to_string(),
            input.retrieved.len(),
            input.recent_turns.len(),
            usage,
        )
    }

    fn finish(
        text: String,
        chunks_included: usize,
        turns_included: usize,
        fallback: FallbackUsage,
    ) -> AssembledContext {
        let metadata = AssemblyMetadata {
            chunks_included,
            turns_included,
            fallback,
            chars: text.chars().count(),
            estimated_tokens: token::estimate_tokens(&text),
        };
        AssembledContext { text, metadata }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
