//! Subsystem modules for the parley bot.

pub mod chat;
pub mod comms;
pub mod memory;
#[cfg(feature = "subsystem-rag")]
pub mod retrieval;
pub mod runtime;
