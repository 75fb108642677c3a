#![deny(missing_docs)]

//! Core library for the pdfchat server: upload PDFs into per-chat vector collections and
//! answer questions about them.

/// HTTP routing and handlers.
pub mod api;
/// Environment-driven configuration.
pub mod config;
/// PDF text extraction.
pub mod document;
/// Embedding client abstraction and the Gemini adapter.
pub mod embedding;
/// Chat-completion client abstraction and the Gemini adapter.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Upload and chat orchestration.
pub mod processing;
/// Retrieval and prompt composition.
pub mod rag;
/// Chat identifier normalization.
pub mod sanitize;
/// Vector collection storage.
pub mod store;
