//! Item values and the capability that produces them.

use std::collections::BTreeMap;
use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A resolved item value. Rendered on the wire with its `Display` form.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemValue::Unsigned(v) => write!(f, "{v}"),
            ItemValue::Signed(v) => write!(f, "{v}"),
            ItemValue::Float(v) => write!(f, "{v}"),
            ItemValue::Bool(v) => write!(f, "{v}"),
            ItemValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<u64> for ItemValue {
    fn from(v: u64) -> Self {
        ItemValue::Unsigned(v)
    }
}

impl From<u32> for ItemValue {
    fn from(v: u32) -> Self {
        ItemValue::Unsigned(v.into())
    }
}

impl From<i64> for ItemValue {
    fn from(v: i64) -> Self {
        ItemValue::Signed(v)
    }
}

impl From<i32> for ItemValue {
    fn from(v: i32) -> Self {
        ItemValue::Signed(v.into())
    }
}

impl From<f64> for ItemValue {
    fn from(v: f64) -> Self {
        ItemValue::Float(v)
    }
}

impl From<bool> for ItemValue {
    fn from(v: bool) -> Self {
        ItemValue::Bool(v)
    }
}

impl From<String> for ItemValue {
    fn from(v: String) -> Self {
        ItemValue::Text(v)
    }
}

impl From<&str> for ItemValue {
    fn from(v: &str) -> Self {
        ItemValue::Text(v.to_owned())
    }
}

/// Resolves item keys on behalf of the passive agent.
///
/// `Ok(None)` means the key is unknown. `Err` is reported to the server as the
/// reason the item is not supported. A panic is treated like an unknown key.
pub trait ItemSource: Send + Sync + 'static {
    fn resolve(&self, key: &str) -> Result<Option<ItemValue>, BoxError>;
}

impl<F> ItemSource for F
where
    F: Fn(&str) -> Result<Option<ItemValue>, BoxError> + Send + Sync + 'static,
{
    fn resolve(&self, key: &str) -> Result<Option<ItemValue>, BoxError> {
        self(key)
    }
}

/// Source backed by a fixed key table plus the `agent.*` built-ins.
#[derive(Debug, Clone)]
pub struct StaticItems {
    hostname: String,
    items: BTreeMap<String, String>,
}

impl StaticItems {
    pub fn new(hostname: impl Into<String>, items: BTreeMap<String, String>) -> Self {
        Self {
            hostname: hostname.into(),
            items,
        }
    }
}

impl ItemSource for StaticItems {
    fn resolve(&self, key: &str) -> Result<Option<ItemValue>, BoxError> {
        let value = match key {
            "agent.ping" => Some(ItemValue::Unsigned(1)),
            "agent.hostname" => Some(ItemValue::Text(self.hostname.clone())),
            "agent.version" => Some(ItemValue::Text(env!("CARGO_PKG_VERSION").into())),
            _ => self.items.get(key).cloned().map(ItemValue::Text),
        };
        Ok(value)
    }
}
