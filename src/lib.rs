//! `vellum`: the document substrate of a structured text editor — persistent
//! marks, a piece-table text engine with branching undo, and a notification
//! bus observers use to follow edits (see DESIGN.md and SPEC_FULL.md).
//!
//! This crate deliberately does not implement a pane tree, keymaps,
//! rendering, or any of the other collaborators a full editor builds on top
//! of it; it is the document core, not the editor.

pub mod arena;
pub mod chunk;
pub mod config;
pub mod document;
pub mod error;
pub mod mark;
pub mod notify;
pub mod undo;

pub use document::Document;
pub use error::{DocError, DocResult};
