//! External collaborators: the LLM and Search gateways.
//!
//! Both are plain prompt/query-in, typed-result-out interfaces — no caller
//! parses HTTP responses directly. Each ships an HTTP-backed implementation
//! using a `reqwest::Client` with bounded-retry backoff, and a deterministic
//! in-memory double used by the engine's own tests and suitable for callers
//! who want to exercise the tree logic without live network access.

pub mod llm;
pub mod search;

pub use llm::{LlmGateway, StubLlmGateway};
pub use search::{SearchGateway, SearchResponse, StubSearchGateway};
