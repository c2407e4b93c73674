//! Social-caption generation API: submit an article or video URL, get back
//! AI-generated post caption options with hashtags, optionally grounded with
//! web-search citations.
//!
//! The pipeline is one request/response pass: prompt building, a single
//! Gemini `generateContent` call with the search tool enabled, best-effort
//! JSON extraction from the free-form completion, and a layered fallback
//! resolver so the caller almost always gets something displayable.

pub mod client;
pub mod extract;
pub mod gemini;
pub mod models;
pub mod prompt;
pub mod server;
