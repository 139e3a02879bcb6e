//! Chat session: ingest documents, then answer questions grounded in them.
//!
//! # Flow
//!
//! 1. Retrieve the chunks most similar to the question (skipped when no
//!    embedder is configured or the index is not ready)
//! 2. Assemble context from those chunks, recent turns, and document excerpts
//! 3. Wrap the context into the generation prompt
//! 4. Generate the answer, in one piece or as a stream
//! 5. Record the exchange in the conversation window and the history store
//!
//! Asking never fails. When no answer can be produced the caller gets an
//! explicit "could not process" message with [`AnswerStatus::Unavailable`].

use std::sync::Arc;

use docchat_config::RagConfig;
use docchat_core::conversation::{ConversationTurn, ConversationWindow};
use docchat_core::document::{Document, RetrievalResult};
use docchat_core::error::{Error, ProviderError};
use docchat_core::provider::{EmbeddingProvider, GenerationProvider};
use docchat_retrieval::{Chunker, KnowledgeBase, Retriever};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use crate::context::{AssemblyInput, AssemblyMetadata, ContextAssembler, build_prompt};
use crate::history::ChatHistory;
use crate::stream_event::ChatStreamEvent;

/// Shown to the user whenever no answer could be generated.
pub const UNAVAILABLE_MESSAGE: &str =
    "Sorry, I could not process your request right now. Please try again later.";

/// How an answer came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Generated from retrieved chunks.
    Grounded,
    /// Generated without retrieval results, from document excerpts only.
    Fallback,
    /// Nothing was generated; the answer is [`UNAVAILABLE_MESSAGE`].
    Unavailable,
}

/// The outcome of [`ChatSession::ask`].
#[derive(Debug, Clone)]
pub struct ChatAnswer {
    /// The question as asked.
    pub query: String,
    pub answer: String,
    /// Retrieval results the prompt was built from, best first.
    pub sources: Vec<RetrievalResult>,
    pub status: AnswerStatus,
}

impl ChatAnswer {
    fn unavailable(query: &str, sources: Vec<RetrievalResult>) -> Self {
        Self {
            query: query.to_string(),
            answer: UNAVAILABLE_MESSAGE.to_string(),
            sources,
            status: AnswerStatus::Unavailable,
        }
    }
}

/// A prompt ready for the generator.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub prompt: String,
    pub sources: Vec<RetrievalResult>,
    pub metadata: AssemblyMetadata,
}

impl PreparedPrompt {
    fn status(&self) -> AnswerStatus {
        if self.sources.is_empty() {
            AnswerStatus::Fallback
        } else {
            AnswerStatus::Grounded
        }
    }
}

/// Session tuning, usually taken from the `[rag]` config section.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub max_chunk_size: usize,
    pub overlap_size: usize,
    pub top_k: usize,
    pub max_conversation_turns: usize,
    pub min_context_length: usize,
    pub fallback_excerpt_chars: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for SessionOptions {
    fn from(rag: &RagConfig) -> Self {
        Self {
            max_chunk_size: rag.max_chunk_size,
            overlap_size: rag.overlap_size,
            top_k: rag.top_k,
            max_conversation_turns: rag.max_conversation_turns,
            min_context_length: rag.min_context_length,
            fallback_excerpt_chars: rag.fallback_excerpt_chars,
        }
    }
}

pub struct ChatSession {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn GenerationProvider>>,
    knowledge: KnowledgeBase,
    conversation: Arc<Mutex<ConversationWindow>>,
    history: Option<Arc<ChatHistory>>,
    assembler: ContextAssembler,
    top_k: usize,
    fallback_excerpt_chars: usize,
}

impl ChatSession {
    /// Create a session. `None` for either provider means it is unavailable.
    pub fn new(
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        generator: Option<Arc<dyn GenerationProvider>>,
        options: SessionOptions,
    ) -> Result<Self, Error> {
        let chunker = Chunker::new(options.max_chunk_size, options.overlap_size)?;
        Ok(Self {
            embedder,
            generator,
            knowledge: KnowledgeBase::new(chunker),
            conversation: Arc::new(Mutex::new(ConversationWindow::new(
                options.max_conversation_turns,
            ))),
            history: None,
            assembler: ContextAssembler::new(options.min_context_length),
            top_k: options.top_k,
            fallback_excerpt_chars: options.fallback_excerpt_chars,
        })
    }

    /// Persist completed exchanges to `history`.
    pub fn with_history(mut self, history: ChatHistory) -> Self {
        self.history = Some(Arc::new(history));
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn history(&self) -> Option<&ChatHistory> {
        self.history.as_deref()
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Whether questions can be answered from retrieved chunks.
    pub fn retrieval_ready(&self) -> bool {
        self.embedder.is_some() && self.knowledge.index().is_ready()
    }

    /// Add (or replace) a document and index its chunks.
    ///
    /// The text is kept for excerpt fallback even when indexing fails or no
    /// embedder is configured; both cases are returned as errors.
    pub async fn ingest(
        &mut self,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<usize, Error> {
        let document = Document::new(name, text);
        let Some(embedder) = self.embedder.clone() else {
            let name = document.name.clone();
            let chunks = self.knowledge.insert_document(document);
            warn!(document = %name, chunks = chunks.len(), "No embedding provider, document kept for excerpt fallback only");
            return Err(ProviderError::Unavailable("no embedding provider configured".into()).into());
        };

        let count = self.knowledge.add_document(document, embedder.as_ref()).await?;
        Ok(count)
    }

    /// Drop a document and its chunks. Returns false when unknown.
    pub fn remove_document(&mut self, name: &str) -> bool {
        self.knowledge.remove_document(name)
    }

    /// Retrieve, assemble and build the prompt for `query`.
    pub async fn prepare(&self, query: &str) -> PreparedPrompt {
        let sources = match &self.embedder {
            Some(embedder) => {
                Retriever::new(Arc::clone(embedder))
                    .retrieve(query, self.top_k, self.knowledge.index())
                    .await
            }
            None => Vec::new(),
        };

        let fallback = self.knowledge.fallback_text(self.fallback_excerpt_chars);
        let turns = self.conversation.lock().await.turns();

        let assembled = self.assembler.assemble(&AssemblyInput {
            query,
            retrieved: &sources,
            recent_turns: &turns,
            fallback_text: &fallback,
        });

        debug!(
            sources = sources.len(),
            turns = turns.len(),
            context_chars = assembled.metadata.chars,
            fallback = ?assembled.metadata.fallback,
            "Prompt prepared"
        );

        PreparedPrompt {
            prompt: build_prompt(&assembled.text, query),
            sources,
            metadata: assembled.metadata,
        }
    }

    /// Answer `query` in one piece.
    ///
    /// Dropping the returned future cancels generation; nothing is recorded.
    pub async fn ask(&self, query: &str) -> ChatAnswer {
        let prepared = self.prepare(query).await;
        let status = prepared.status();

        let Some(generator) = &self.generator else {
            warn!("No generation provider configured");
            return ChatAnswer::unavailable(query, prepared.sources);
        };

        match generator.generate(&prepared.prompt).await {
            Ok(answer) => {
                record_exchange(&self.conversation, self.history.as_deref(), query, &answer).await;
                info!(
                    provider = generator.name(),
                    status = ?status,
                    sources = prepared.sources.len(),
                    answer_chars = answer.chars().count(),
                    "Answer generated"
                );
                ChatAnswer {
                    query: query.to_string(),
                    answer,
                    sources: prepared.sources,
                    status,
                }
            }
            Err(e) => {
                warn!(provider = generator.name(), error = %e, "Generation failed");
                ChatAnswer::unavailable(query, prepared.sources)
            }
        }
    }

    /// Answer `query` as a stream of [`ChatStreamEvent`]s.
    ///
    /// The first event is always `sources`. The exchange is recorded only
    /// when the stream reaches `done`.
    pub async fn ask_stream(&self, query: &str) -> AnswerStream {
        let prepared = self.prepare(query).await;

        let (tx, rx) = mpsc::channel::<ChatStreamEvent>(64);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(stream_answer(StreamTask {
            generator: self.generator.clone(),
            prepared,
            query: query.to_string(),
            conversation: Arc::clone(&self.conversation),
            history: self.history.clone(),
            events: tx,
            cancel: cancel_rx,
        }));

        AnswerStream {
            events: rx,
            cancel: Arc::new(cancel_tx),
        }
    }

    /// Retained turns, oldest first.
    pub async fn conversation(&self) -> Vec<ConversationTurn> {
        self.conversation.lock().await.turns()
    }

    pub async fn clear_conversation(&self) {
        self.conversation.lock().await.clear();
        debug!("Conversation cleared");
    }
}

// ── Streaming ─────────────────────────────────────────────────────────────

/// Receiving side of [`ChatSession::ask_stream`].
///
/// Dropping the stream cancels it.
pub struct AnswerStream {
    events: mpsc::Receiver<ChatStreamEvent>,
    cancel: Arc<watch::Sender<bool>>,
}

impl AnswerStream {
    /// The next event, or `None` after a terminal event.
    pub async fn next(&mut self) -> Option<ChatStreamEvent> {
        self.events.recv().await
    }

    /// Stop consuming the provider stream. Partial text is discarded and the
    /// stream ends with `cancelled`.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// A handle that cancels this stream from elsewhere (e.g. a Ctrl-C task).
    pub fn canceller(&self) -> StreamCanceller {
        StreamCanceller(Arc::clone(&self.cancel))
    }

    /// Drain every remaining event.
    pub async fn collect(mut self) -> Vec<ChatStreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

#[derive(Clone)]
pub struct StreamCanceller(Arc<watch::Sender<bool>>);

impl StreamCanceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

struct StreamTask {
    generator: Option<Arc<dyn GenerationProvider>>,
    prepared: PreparedPrompt,
    query: String,
    conversation: Arc<Mutex<ConversationWindow>>,
    history: Option<Arc<ChatHistory>>,
    events: mpsc::Sender<ChatStreamEvent>,
    cancel: watch::Receiver<bool>,
}

async fn stream_answer(task: StreamTask) {
    let StreamTask {
        generator,
        prepared,
        query,
        conversation,
        history,
        events,
        mut cancel,
    } = task;
    let status = prepared.status();

    let sources = ChatStreamEvent::Sources {
        sources: prepared.sources.clone(),
    };
    if events.send(sources).await.is_err() {
        return;
    }

    let Some(generator) = generator else {
        warn!("No generation provider configured");
        let _ = events
            .send(ChatStreamEvent::Error {
                message: UNAVAILABLE_MESSAGE.into(),
            })
            .await;
        return;
    };

    // ── Open the provider stream ──
    let opened = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => None,
        result = generator.generate_stream(&prepared.prompt) => Some(result),
    };
    let mut provider_rx = match opened {
        None => {
            let _ = events.send(ChatStreamEvent::Cancelled).await;
            return;
        }
        Some(Ok(rx)) => rx,
        Some(Err(e)) => {
            warn!(provider = generator.name(), error = %e, "Streaming generation failed to start");
            let _ = events
                .send(ChatStreamEvent::Error {
                    message: UNAVAILABLE_MESSAGE.into(),
                })
                .await;
            return;
        }
    };

    // ── Forward fragments ──
    let mut answer = String::new();
    let mut usage = None;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                debug!(discarded_chars = answer.chars().count(), "Answer stream cancelled");
                let _ = events.send(ChatStreamEvent::Cancelled).await;
                return;
            }
            next = provider_rx.recv() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                    answer.push_str(&text);
                    if events
                        .send(ChatStreamEvent::Chunk { content: text })
                        .await
                        .is_err()
                    {
                        debug!("Answer stream dropped by consumer");
                        return;
                    }
                }
                if chunk.done {
                    usage = chunk.usage;
                    break;
                }
            }
            Some(Err(e)) => {
                warn!(provider = generator.name(), error = %e, "Answer stream interrupted");
                let _ = events
                    .send(ChatStreamEvent::Error {
                        message: UNAVAILABLE_MESSAGE.into(),
                    })
                    .await;
                return;
            }
            None => break,
        }
    }

    // ── Record ──
    record_exchange(&conversation, history.as_deref(), &query, &answer).await;
    info!(
        provider = generator.name(),
        status = ?status,
        answer_chars = answer.chars().count(),
        "Streamed answer complete"
    );
    let _ = events
        .send(ChatStreamEvent::Done {
            answer,
            status,
            usage,
        })
        .await;
}

/// Resolves once cancellation is requested or every cancel handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|c| *c).await;
}

async fn record_exchange(
    conversation: &Mutex<ConversationWindow>,
    history: Option<&ChatHistory>,
    query: &str,
    answer: &str,
) {
    conversation
        .lock()
        .await
        .push(ConversationTurn::new(query, answer));

    if let Some(history) = history {
        if let Err(e) = history.append(query, answer).await {
            warn!(error = %e, path = %history.path().display(), "Failed to save chat history");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use std::time::Duration;

    const VOCAB: [&str; 4] = ["refund", "shipping", "warranty", "days"];

    const POLICY: &str = "Our refund policy allows returns within 30 days. \
        Shipping is free on orders over 50 dollars. \
        The warranty covers manufacturing defects for one year.";

    fn options() -> SessionOptions {
        SessionOptions {
            max_chunk_size: 60,
            overlap_size: 0,
            top_k: 2,
            max_conversation_turns: 2,
            min_context_length: 0,
            fallback_excerpt_chars: 2000,
        }
    }

    async fn session_with(generator: Option<Arc<dyn GenerationProvider>>) -> ChatSession {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(KeywordEmbedder::new(&VOCAB));
        let mut session = ChatSession::new(Some(embedder), generator, options()).unwrap();
        session.ingest("policy.txt", POLICY).await.unwrap();
        session
    }

    #[tokio::test]
    async fn ask_grounds_answer_in_best_chunk() {
        let generator = Arc::new(SequentialMockGenerator::single("Returns are accepted for 30 days."));
        let session = session_with(Some(generator.clone())).await;

        let answer = session.ask("What is the refund policy?").await;

        assert_eq!(answer.status, AnswerStatus::Grounded);
        assert_eq!(answer.answer, "Returns are accepted for 30 days.");
        assert!(answer.sources[0].chunk.content.contains("refund policy"));

        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("[Document: policy.txt | Section 1]"));
        assert!(prompt.contains("User Question: What is the refund policy?"));
    }

    #[tokio::test]
    async fn answered_turns_feed_the_next_prompt() {
        let generator = Arc::new(SequentialMockGenerator::new(&["First answer", "Second answer"]));
        let session = session_with(Some(generator.clone())).await;

        session.ask("What is the refund policy?").await;
        session.ask("And shipping?").await;

        let second_prompt = &generator.prompts()[1];
        assert!(second_prompt.contains(
            "Previous Conversation:\nUser: What is the refund policy?\nAssistant: First answer"
        ));
        assert_eq!(session.conversation().await.len(), 2);
    }

    #[tokio::test]
    async fn no_generator_yields_unavailable_message() {
        let session = session_with(None).await;
        let answer = session.ask("What is the refund policy?").await;

        assert_eq!(answer.status, AnswerStatus::Unavailable);
        assert_eq!(answer.answer, UNAVAILABLE_MESSAGE);
        assert!(answer.answer.contains("could not process"));
        assert_eq!(answer.query, "What is the refund policy?");
        assert!(session.conversation().await.is_empty());
    }

    #[tokio::test]
    async fn nothing_available_still_answers() {
        let mut session = ChatSession::new(None, None, options()).unwrap();
        let err = session.ingest("notes.txt", "Some notes.").await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Unavailable(_))));
        assert_eq!(session.knowledge().documents().len(), 1);

        let answer = session.ask("Anything?").await;
        assert_eq!(answer.status, AnswerStatus::Unavailable);
        assert!(answer.sources.is_empty());
        assert_eq!(answer.query, "Anything?");
    }

    #[tokio::test]
    async fn generation_error_is_not_recorded() {
        let generator = Arc::new(FailingGenerator(ProviderError::Timeout("slow".into())));
        let session = session_with(Some(generator)).await;

        let answer = session.ask("What is the refund policy?").await;
        assert_eq!(answer.status, AnswerStatus::Unavailable);
        assert!(!answer.sources.is_empty());
        assert!(session.conversation().await.is_empty());
    }

    #[tokio::test]
    async fn without_embedder_prompt_uses_document_excerpts() {
        let generator = Arc::new(SequentialMockGenerator::single("From excerpts"));
        let mut session =
            ChatSession::new(None, Some(generator.clone()), options()).unwrap();
        let _ = session.ingest("policy.txt", POLICY).await;

        let answer = session.ask("What is the refund policy?").await;
        assert_eq!(answer.status, AnswerStatus::Fallback);
        assert!(generator.prompts()[0].contains("Document: policy.txt\nContent: Our refund policy"));
    }

    #[tokio::test]
    async fn embed_failure_keeps_previous_index_usable() {
        let embedder = Arc::new(KeywordEmbedder::new(&VOCAB));
        let generator = Arc::new(SequentialMockGenerator::single("ok"));
        let mut session =
            ChatSession::new(Some(embedder.clone()), Some(generator), options()).unwrap();
        session.ingest("policy.txt", POLICY).await.unwrap();
        let before = session.knowledge().index().len();

        embedder.set_failing(true);
        assert!(session.ingest("extra.txt", "More refund text.").await.is_err());
        assert!(session.retrieval_ready());
        assert_eq!(session.knowledge().index().len(), before);
        assert_eq!(session.knowledge().documents().len(), 2);
    }

    #[tokio::test]
    async fn conversation_window_is_bounded() {
        let generator = Arc::new(SequentialMockGenerator::new(&["a1", "a2", "a3"]));
        let session = session_with(Some(generator)).await;
        for q in ["q1", "q2", "q3"] {
            session.ask(q).await;
        }
        let turns = session.conversation().await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user, "q2");

        session.clear_conversation().await;
        assert!(session.conversation().await.is_empty());
    }

    #[tokio::test]
    async fn remove_document_drops_sources() {
        let generator = Arc::new(SequentialMockGenerator::single("none"));
        let mut session = session_with(Some(generator)).await;
        assert!(session.remove_document("policy.txt"));

        let prepared = session.prepare("refund").await;
        assert!(prepared.sources.is_empty());
        assert!(!session.retrieval_ready());
    }

    // ── Streaming ──

    #[tokio::test]
    async fn stream_emits_sources_chunks_then_done() {
        let generator = Arc::new(SlowStreamGenerator::new(
            &["Returns ", "within ", "30 days."],
            Duration::from_millis(1),
        ));
        let session = session_with(Some(generator)).await;

        let events = session.ask_stream("What is the refund policy?").await.collect().await;

        assert!(matches!(&events[0], ChatStreamEvent::Sources { sources } if !sources.is_empty()));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                ChatStreamEvent::Chunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Returns within 30 days.");
        match events.last().unwrap() {
            ChatStreamEvent::Done { answer, status, .. } => {
                assert_eq!(answer, "Returns within 30 days.");
                assert_eq!(*status, AnswerStatus::Grounded);
            }
            other => panic!("Expected Done, got {other:?}"),
        }
        assert_eq!(session.conversation().await.len(), 1);
    }

    #[tokio::test]
    async fn cancel_discards_partial_answer() {
        let generator = Arc::new(SlowStreamGenerator::new(
            &["one ", "two ", "three ", "four ", "five "],
            Duration::from_millis(200),
        ));
        let session = session_with(Some(generator)).await;

        let mut stream = session.ask_stream("refund?").await;
        assert!(matches!(stream.next().await, Some(ChatStreamEvent::Sources { .. })));
        assert!(matches!(stream.next().await, Some(ChatStreamEvent::Chunk { .. })));

        stream.cancel();
        let rest = stream.collect().await;
        assert!(matches!(rest.last(), Some(ChatStreamEvent::Cancelled)));
        assert!(!rest.iter().any(|e| matches!(e, ChatStreamEvent::Done { .. })));

        // Give the task a moment; nothing may be recorded.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.conversation().await.is_empty());
    }

    #[tokio::test]
    async fn stream_error_is_reported_and_not_recorded() {
        let generator = Arc::new(
            SlowStreamGenerator::new(&["partial ", "more"], Duration::from_millis(1)).failing_after(1),
        );
        let session = session_with(Some(generator)).await;

        let events = session.ask_stream("refund?").await.collect().await;
        match events.last().unwrap() {
            ChatStreamEvent::Error { message } => assert_eq!(message, UNAVAILABLE_MESSAGE),
            other => panic!("Expected Error, got {other:?}"),
        }
        assert!(session.conversation().await.is_empty());
    }

    #[tokio::test]
    async fn stream_without_generator_reports_unavailable() {
        let session = session_with(None).await;
        let events = session.ask_stream("refund?").await.collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ChatStreamEvent::Error { .. }));
    }

    #[tokio::test]
    async fn history_records_completed_exchanges() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let generator = Arc::new(SequentialMockGenerator::single("Thirty days."));
        let session = session_with(Some(generator))
            .await
            .with_history(ChatHistory::open(&path));

        session.ask("How long is the refund window?").await;

        let records = ChatHistory::open(&path).list().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].assistant, "Thirty days.");
    }
}
