//! Integration test entry point for zbx-agent.
//!
//! Run with: cargo test -p zbx-agent --test integration

mod active;
mod passive;
mod tls;
