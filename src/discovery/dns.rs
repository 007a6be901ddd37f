//! # DNS Resolution
//!
//! Resolves the hostnames submitted in a hostname table to backend server addresses.
//!
//! The [`Resolver`] trait returns a structured [`Resolution`]: a found address, a definite
//! "no such name", or an error for transient failures (timeouts, unreachable name servers).
//! Only transient failures are retried by the planner; a definite miss skips the entry.

use async_trait::async_trait;
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::config::DnsConfig;
use crate::core::error::{ProvisionerError, ProvisionerResult};

/// Outcome of a successful lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The name has an address record
    Found(IpAddr),
    /// The name does not exist or has no address record
    NotFound,
}

/// Hostname to address resolution
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a hostname; `Err` is reserved for transient failures
    async fn resolve(&self, hostname: &str) -> ProvisionerResult<Resolution>;

    /// Name for logging
    fn name(&self) -> &'static str;
}

/// Resolver backed by hickory-resolver using the host's resolver configuration
pub struct HickoryResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryResolver {
    /// Build from `/etc/resolv.conf` (or the platform equivalent), with timeout and attempts
    /// taken from the provisioner configuration
    pub fn from_system_conf(config: &DnsConfig) -> ProvisionerResult<Self> {
        let (resolver_config, mut opts) = hickory_resolver::system_conf::read_system_conf()
            .map_err(|e| {
                ProvisionerError::config(format!(
                    "Failed to read system resolver configuration: {}",
                    e
                ))
            })?;

        opts.timeout = config.timeout;
        opts.attempts = config.attempts;

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
        })
    }
}

#[async_trait]
impl Resolver for HickoryResolver {
    async fn resolve(&self, hostname: &str) -> ProvisionerResult<Resolution> {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return Ok(Resolution::NotFound);
        }

        match self.resolver.lookup_ip(hostname).await {
            Ok(lookup) => {
                // NetScaler server entities are usually IPv4; prefer A records when both exist
                let address = lookup
                    .iter()
                    .find(IpAddr::is_ipv4)
                    .or_else(|| lookup.iter().next());

                Ok(address.map_or(Resolution::NotFound, Resolution::Found))
            }
            Err(err) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    debug!(hostname, "No address records");
                    Ok(Resolution::NotFound)
                }
                _ => Err(ProvisionerError::resolution(hostname, err.to_string())),
            },
        }
    }

    fn name(&self) -> &'static str {
        "hickory"
    }
}

/// Fixed hostname table, optionally falling back to another resolver
///
/// Lookups are case-insensitive and ignore a trailing dot. IP literals resolve to themselves.
pub struct StaticResolver {
    hosts: HashMap<String, IpAddr>,
    fallback: Option<Arc<dyn Resolver>>,
}

impl StaticResolver {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = (S, IpAddr)>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|(name, addr)| (normalize(name.as_ref()), addr))
                .collect(),
            fallback: None,
        }
    }

    /// Consult `fallback` for names missing from the table
    pub fn with_fallback(mut self, fallback: Arc<dyn Resolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

fn normalize(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_lowercase()
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, hostname: &str) -> ProvisionerResult<Resolution> {
        let key = normalize(hostname);
        if key.is_empty() {
            return Ok(Resolution::NotFound);
        }

        if let Ok(literal) = key.parse::<IpAddr>() {
            return Ok(Resolution::Found(literal));
        }

        if let Some(addr) = self.hosts.get(&key) {
            return Ok(Resolution::Found(*addr));
        }

        match &self.fallback {
            Some(fallback) => fallback.resolve(hostname).await,
            None => Ok(Resolution::NotFound),
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Create the resolver described by the configuration
pub fn create_resolver(config: &DnsConfig) -> ProvisionerResult<Arc<dyn Resolver>> {
    let system: Option<Arc<dyn Resolver>> = if config.use_system_resolver {
        Some(Arc::new(HickoryResolver::from_system_conf(config)?))
    } else {
        None
    };

    let resolver: Arc<dyn Resolver> = match (system, config.static_hosts.is_empty()) {
        (Some(system), true) => system,
        (Some(system), false) => {
            Arc::new(StaticResolver::new(config.static_hosts.clone()).with_fallback(system))
        }
        (None, _) => Arc::new(StaticResolver::new(config.static_hosts.clone())),
    };

    info!(
        resolver = resolver.name(),
        static_hosts = config.static_hosts.len(),
        "DNS resolver initialized"
    );

    Ok(resolver)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    struct FailingResolver;

    #[async_trait]
    impl Resolver for FailingResolver {
        async fn resolve(&self, hostname: &str) -> ProvisionerResult<Resolution> {
            Err(ProvisionerError::resolution(hostname, "name server unreachable"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_static_lookup() {
        let resolver = StaticResolver::new([("web1", addr("192.168.1.10"))]);

        assert_eq!(
            resolver.resolve("web1").await.unwrap(),
            Resolution::Found(addr("192.168.1.10"))
        );
        assert_eq!(
            resolver.resolve("WEB1.").await.unwrap(),
            Resolution::Found(addr("192.168.1.10"))
        );
        assert_eq!(resolver.resolve("web2").await.unwrap(), Resolution::NotFound);
        assert_eq!(resolver.resolve("   ").await.unwrap(), Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_ip_literal_resolves_to_itself() {
        let resolver = StaticResolver::new(Vec::<(String, IpAddr)>::new());
        assert_eq!(
            resolver.resolve("10.0.0.7").await.unwrap(),
            Resolution::Found(addr("10.0.0.7"))
        );
    }

    #[tokio::test]
    async fn test_fallback_is_consulted_for_unknown_names() {
        let resolver = StaticResolver::new([("web1", addr("192.168.1.10"))])
            .with_fallback(Arc::new(FailingResolver));

        assert!(resolver.resolve("web1").await.is_ok());

        let err = resolver.resolve("web2").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, ProvisionerError::Resolution { ref host, .. } if host == "web2"));
    }

    #[test]
    fn test_static_only_resolver_from_config() {
        let mut config = DnsConfig::default();
        config.use_system_resolver = false;
        config.static_hosts.insert("web1".to_string(), addr("192.168.1.10"));

        let resolver = create_resolver(&config).unwrap();
        assert_eq!(resolver.name(), "static");
    }
}
