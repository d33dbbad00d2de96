//! Security module.
//!
//! - **Cloaking**: HMAC-SHA256 based IP/hostname privacy protection
//! - **Password**: operator password verification (Argon2)
//!
//! Per-message/connection/join rate limiting (flood protection beyond the
//! sendq threshold) is out of scope (§1 Non-goals: "No flow control beyond
//! per-link output queues and a slow-client disconnect threshold").

pub mod cloaking;
pub mod password;

pub use cloaking::{cloak_hostname, cloak_ip_hmac};
