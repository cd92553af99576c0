//! Agent runtime - LLM-backed support pipeline
//!
//! This crate is the "brain" of swarmdesk: it models agents, tasks, and the
//! sequential crew runner that resolves a support ticket end to end.
//!
//! # Architecture
//!
//! Each ticket flows through a fixed chain of five agents:
//! 1. **Triage** - classify urgency and category
//! 2. **Research** - find the exact policy
//! 3. **Writer** - draft an empathetic reply
//! 4. **Guardian** - check tone and compliance
//! 5. **Closer** - finalize or escalate
//!
//! Tasks are strictly sequential; task N sees the outputs of tasks 1..N-1 as
//! context. Agents with tools may ask for a single tool call per turn by
//! replying with a JSON directive, which the runner executes and feeds back.
//!
//! # Key Types
//!
//! - `SupportPipeline` - ticket-level entry point (see `pipeline` module)
//! - `Crew` - generic sequential task runner (see `crew` module)
//! - `LlmClient` - pluggable completion trait; `GroqClient` for the live API,
//!   `OfflineLlm` for test mode
//! - `Tool` / `ToolRegistry` - the policy lookup and escalation tools

pub mod crew;
pub mod llm;
pub mod pipeline;
pub mod tools;
