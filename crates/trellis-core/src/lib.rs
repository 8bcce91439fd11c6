//! Trellis Core - application tree model and reactive binding engine
//!
//! This crate provides:
//! - AppDom: the immutable tree of pages, elements, queries and themes
//! - Render tree: the redacted projection shipped to the browser
//! - Expressions: parsing and evaluating JavaScript-flavoured bindings
//! - Bindings: turning a page's bound props into live values

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine configuration
pub mod config;

/// Application tree model - nodes, bindable values and fractional indexes
pub mod dom;

/// Render tree projection
pub mod render;

/// Expression language - lexer, parser and evaluators
pub mod expr;

/// Binding engine - parsing, evaluation and controlled values
pub mod bindings;

/// Test utilities - fixtures and evaluation helpers
pub mod testutil;
