//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via `tracing` with `RUST_LOG` style filters

pub mod tracing;
