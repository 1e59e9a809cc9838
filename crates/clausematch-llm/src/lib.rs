//! clausematch-llm
//!
//! Adjudication through an OpenAI-compatible chat completions endpoint. One
//! call decides every candidate of a clause; the reply is a JSON object with
//! one verdict per candidate.
pub mod client;
pub mod parse;
pub mod prompt;

pub use client::LlmAdjudicator;
pub use parse::parse_verdicts;
pub use prompt::{build_user_prompt, SYSTEM_PROMPT};
