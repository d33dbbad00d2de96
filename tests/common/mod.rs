//! Black-box test harness: spawns a compiled `ircd` as a child process and
//! drives it over real TCP sockets, the same way a real client would.

pub mod client;
pub mod server;

pub use client::TestClient;
pub use server::TestServer;
