//! ZBX Agent -- passive and active monitoring agent.
//!
//! Passive: [`passive::start`] listens and answers one item key per
//! connection through an [`ItemSource`].
//! Active: [`active::start_active`] registers with a server and returns an
//! [`ActiveSession`] whose [`ActiveSession::push`] sends batches of values.

pub mod active;
pub mod config;
pub mod item;
pub mod logging;
pub mod passive;
pub mod query;
pub mod transport;

pub use active::{start_active, start_active_tls, ActiveError, ActiveSession};
pub use item::{BoxError, ItemSource, ItemValue, StaticItems};
pub use passive::{serve, start, start_tls, AgentError};
pub use query::{query, QueryError, QueryReply};
pub use transport::{Dialer, Listener};
pub use zbx_protocol::SupportedItem;

use std::path::PathBuf;

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
