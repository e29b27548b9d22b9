//! Turn context assembly.
//!
//! A turn is one user-message-to-assistant-response cycle. The
//! [`TurnAssembler`] persists the user's message, gathers context and tools
//! concurrently, composes the instruction block and hands everything to the
//! [`Orchestrator`](crate::llm::Orchestrator). Only the model boundary can
//! fail a turn.

pub mod assembler;
pub mod error;
pub mod instructions;

pub use assembler::{TurnAssembler, TurnPayload, TurnRequest, TurnSettings};
pub use error::TurnError;
pub use instructions::{InstructionInputs, compose_instructions};
