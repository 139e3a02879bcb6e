//! Context assembly and prompt construction.
//!
//! | Block | Source | Included when |
//! |-------|--------|---------------|
//! | Relevant document excerpts | Retriever results | retrieval returned chunks |
//! | Previous Conversation | Conversation window | turns are retained |
//! | Additional document context | Document excerpts | context is shorter than the threshold |

pub mod assembler;
pub mod prompt;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyInput, AssemblyMetadata, ContextAssembler, FallbackUsage,
};
pub use prompt::build_prompt;
