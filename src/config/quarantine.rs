//! Quarantine entries: channel name → reason a JOIN is refused network-wide.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Quarantine {
    pub channel: String,
    pub reason: String,
}
