//! Reverse-DNS collaborator (§6 "Collaborators — DNS resolver"):
//! `resolve(addr, callback)`, realized here as an async lookup that resolves
//! to `Result<String, ResolveError>`, consumed at a suspension point once it
//! completes (§5 "explicit yields from DNS and authentication collaborators
//! that return pending and will re-enter later with results"). Wraps
//! `hickory-resolver`, the teacher's own DNS crate choice
//! (`security/dnsbl.rs`).

use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use thiserror::Error;

/// §5 "Cancellation and timeouts": DNS lookups have a per-request timeout;
/// on expiry the collaborator is told to drop the request and the caller
/// proceeds with the IP literal as a placeholder host.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("reverse lookup timed out")]
    Timeout,
    #[error("reverse lookup failed: {0}")]
    Failed(String),
}

/// One resolver instance shared across every connection on the gateway.
#[derive(Clone)]
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    pub fn new() -> Self {
        let resolver = TokioResolver::builder_tokio()
            .map(|builder| builder.build())
            .unwrap_or_else(|_| {
                TokioResolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default())
                    .build()
            });
        Self { resolver }
    }

    /// Resolves `addr` to a hostname, or a [`ResolveError`] on timeout or
    /// failure. Callers own the "placeholder host = IP literal" fallback
    /// policy; this collaborator only reports success or failure.
    pub async fn resolve(&self, addr: IpAddr) -> Result<String, ResolveError> {
        match tokio::time::timeout(LOOKUP_TIMEOUT, self.resolver.reverse_lookup(addr)).await {
            Ok(Ok(lookup)) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .ok_or_else(|| ResolveError::Failed("empty reverse lookup response".to_string())),
            Ok(Err(err)) => Err(ResolveError::Failed(err.to_string())),
            Err(_) => Err(ResolveError::Timeout),
        }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}
