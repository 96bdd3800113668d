//! Email Triage: classify inbound business email, draft replies, and keep
//! every processed email as an editable record.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
