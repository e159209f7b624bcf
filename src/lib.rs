//! Personal code-snippet manager.
//!
//! The snippet library lives in a hosted backend (or the in-process
//! [`MemoryStore`](repositories::MemoryStore)); [`SnippetRepository`](repositories::SnippetRepository)
//! owns the signed-in account's cached copy, [`SearchEngine`](services::SearchEngine)
//! filters it, and the [`server`] module exposes the share-link endpoint.

pub mod config;
pub mod domain;
pub mod error;
pub mod repositories;
pub mod server;
pub mod services;

pub use config::AppConfig;
pub use error::{FieldError, SnippetError, ValidationErrors};
