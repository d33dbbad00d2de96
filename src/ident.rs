//! Authentication/ident collaborator (§6 "Collaborators — Authentication"):
//! `auth_start(connection)` / `destroy_auth(handle, cleanup)`. Implementing
//! the ident (RFC 1413) protocol itself is out of scope; this module defines
//! the trait boundary so `check_client` can proceed with a placeholder
//! ident when no real lookup is configured.

use std::net::SocketAddr;

/// One ident lookup per connection: started on accept, resolved or
/// cancelled by the time registration completes.
pub trait IdentLookup: Send {
    /// Starts a lookup for a freshly-accepted connection and returns
    /// whatever is available immediately. A real RFC 1413 client would need
    /// a suspension point to return this asynchronously (§5 "Suspension
    /// points"); this core has none wired below the DNS/auth collaborator
    /// level, so implementations are expected to resolve synchronously or
    /// not at all.
    fn auth_start(&self, peer_addr: SocketAddr) -> Option<String>;

    /// Cancels/cleans up a lookup still outstanding when the connection
    /// closes before registration completes.
    fn destroy_auth(&self, peer_addr: SocketAddr);
}

/// Default when no ident protocol is configured: every lookup resolves
/// immediately to "no ident," and there is nothing to clean up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIdentLookup;

impl IdentLookup for NoopIdentLookup {
    fn auth_start(&self, _peer_addr: SocketAddr) -> Option<String> {
        None
    }

    fn destroy_auth(&self, _peer_addr: SocketAddr) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_lookup_never_resolves_an_ident() {
        let addr: SocketAddr = "127.0.0.1:6667".parse().unwrap();
        let ident = NoopIdentLookup;
        assert_eq!(ident.auth_start(addr), None);
        ident.destroy_auth(addr);
    }
}
