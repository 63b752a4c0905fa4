//! These models represent the objects passed around by the orchestrator
//!
//! There are several related formats we need to interact with:
//! - chat-completion messages, which are also our canonical input
//! - anthropic-style messages, sent directly or through the gateway
//!
//! Callers hand us the canonical form; every backend-specific shape is derived
//! from it in `providers::utils` and `providers::request`.
pub mod llm;
pub mod message;
