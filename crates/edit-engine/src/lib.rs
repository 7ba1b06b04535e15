//! A headless document edit engine for source-code editors.
//!
//! This crate is the editing core only: it owns the text, the selection, the
//! fold ranges, and the undo history, and keeps them consistent under rapid,
//! arbitrarily-ordered edit events. Rendering, key binding, clipboard, and
//! file I/O belong to the embedding application.
//!
//! The pieces, leaves first:
//!
//! - [`RopeBuffer`] — rope-backed bulk text storage with character-offset
//!   addressing.
//! - [`LineEditBuffer`] — a single-line overlay absorbing keystroke bursts in
//!   front of the rope.
//! - [`SelectionEngine`] — the selection, with fold-aware navigation.
//! - [`FoldRangeTracker`] — collapsible line ranges, adjusted across edits.
//! - [`EditHistory`] — invertible, coalescing undo/redo log.
//! - [`DocumentEditEngine`] — the single mutation entry point orchestrating
//!   all of the above.
//!
//! ```
//! use edit_engine::DocumentEditEngine;
//!
//! let mut engine = DocumentEditEngine::from_text("fn main() {}\n");
//! engine.move_document_end(false);
//! engine.type_char('x');
//! assert_eq!(engine.text(), "fn main() {}\nx");
//! assert!(engine.undo());
//! assert_eq!(engine.text(), "fn main() {}\n");
//! ```

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod events;
pub mod folds;
pub mod history;
pub mod overlay;
pub mod rope_buffer;
pub mod selection;
pub mod worker;

pub use engine::{DocumentEditEngine, EngineConfig, InputEvent, InputSnapshotSink};
pub use error::EngineError;
pub use events::{ChangeEvent, ChangeKind, EventRegistry, SubscriptionId};
pub use folds::{FoldProvenance, FoldRange, FoldRangeTracker};
pub use history::{CompoundToken, EditHistory, EditKind, EditOperation};
pub use overlay::{LineEditBuffer, OverlayState};
pub use rope_buffer::RopeBuffer;
pub use selection::{Selection, SelectionEngine};
pub use worker::BulkProcessor;
