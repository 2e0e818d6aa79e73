//! Text preparation: markup removal and chunking.
//!
//! Raw chapter markdown goes through [`sanitize_markdown_for_tts`] once, then
//! one of the segmenters cuts it into chunks a speech engine can take in a
//! single call:
//!
//! - [`split_text_for_tts`] bounds chunks by characters (default 3000),
//! - [`split_text_by_tokens`] bounds them by the target model's tokens,
//! - [`recovery_split`] re-splits a chunk whose audio came back silent.

pub mod sanitize;
pub mod segment;

pub use sanitize::{sanitize_markdown_for_tts, split_markdown_paragraphs};
pub use segment::{
    normalize_whitespace, recovery_split, split_text_by_tokens, split_text_for_tts, TokenCounter,
};
