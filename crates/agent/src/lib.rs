//! Chat orchestration for docchat.
//!
//! A [`ChatSession`] answers questions about ingested documents:
//!
//! 1. **Retrieve** the chunks closest to the question
//! 2. **Assemble** them with recent turns (and document excerpts when thin)
//! 3. **Generate** the answer, whole or streamed
//! 4. **Record** the exchange in the conversation window and chat history

pub mod context;
pub mod history;
pub mod session;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use context::{
    AssembledContext, AssemblyInput, AssemblyMetadata, ContextAssembler, FallbackUsage,
    build_prompt,
};
pub use history::{ChatHistory, ChatRecord};
pub use session::{
    AnswerStatus, AnswerStream, ChatAnswer, ChatSession, PreparedPrompt, SessionOptions,
    StreamCanceller, UNAVAILABLE_MESSAGE,
};
pub use stream_event::ChatStreamEvent;
