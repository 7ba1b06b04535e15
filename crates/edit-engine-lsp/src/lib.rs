//! Language-server session layer for the document edit engine.
//!
//! This crate connects an [`edit_engine::DocumentEditEngine`] to an external
//! code-analysis service speaking an id-correlated JSON-RPC protocol over
//! framed byte streams:
//!
//! - [`transport`] reads and writes `Content-Length`-framed messages.
//! - [`client`] owns the connection: background reader/writer threads,
//!   strictly increasing request ids, and safe default answers to
//!   server-to-client requests.
//! - [`session`] runs the lifecycle: the `initialize` handshake with
//!   capability negotiation, full-text document synchronization, capability
//!   gating for every feature request, and trailing-edge debounced refreshes
//!   for semantic tokens, folding ranges, document colors, and code actions.
//! - [`semantic`] decodes relative-encoded token streams and pushed symbol
//!   highlights into absolute document coordinates.
//! - [`edits`] parses workspace edits in all their payload shapes and applies
//!   them to an engine in descending offset order.
//! - [`completion`] normalizes completion items at the protocol boundary.
//!
//! The session never blocks document mutation: lifecycle methods are
//! fire-and-forget notifications and asynchronous results are collected via
//! [`LanguageServerSession::poll`].

#![warn(missing_docs)]

pub mod client;
pub mod completion;
pub mod edits;
pub mod error;
pub mod semantic;
pub mod session;
pub mod transport;
pub mod uri;

pub use client::{Inbound, RpcClient};
pub use completion::{parse_completion_items, CompletionItem};
pub use edits::{apply_text_edits, parse_workspace_edit, TextEdit, WorkspaceEdit};
pub use error::SessionError;
pub use semantic::{
    decode_semantic_tokens, decode_symbol_highlight, DecodedToken, LineStartTable,
    SemanticTokensLegend,
};
pub use session::{
    LanguageServerSession, RefreshKind, ServerCapabilities, SessionConfig, SessionEvent,
    SessionState,
};
pub use uri::{path_to_uri, uri_to_path};
