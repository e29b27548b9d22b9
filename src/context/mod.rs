//! Conversation history and document retrieval.
//!
//! Retrieval is enrichment, never a dependency: [`ContextRetriever::build_context`]
//! cannot fail and degrades to empty lists when the store misbehaves.

pub mod retriever;
pub mod types;

pub use retriever::ContextRetriever;
pub use types::{ContextBundle, ConversationEntry, Document, EntryRole};
