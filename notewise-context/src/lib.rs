//! Notewise Context - bounded conversation context for AI-assisted notes.
//!
//! This crate provides:
//! - [`ContextManager`], which keeps a summary tier and a raw tier under a
//!   character budget
//! - Summary persistence ([`SummaryStore`], SQLite and in-memory stores)
//! - Transcript extraction from editor documents
//! - [`DocumentSession`], tying a document, its summary and the AI service together

pub mod config;
pub mod manager;
pub mod session;
pub mod store;
pub mod transcript;

pub use config::ContextConfig;
pub use manager::{ContextManager, ContextSnapshot, ContextStatus, RECENT_MARKER, SUMMARY_MARKER};
pub use session::DocumentSession;
pub use store::{
    DocumentSummaryPersister, InMemorySummaryStore, SqliteSummaryStore, SummaryPersister,
    SummaryStore,
};
pub use transcript::{extract_transcript, extract_transcript_from_json, EditorNode};
