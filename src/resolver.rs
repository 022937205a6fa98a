use std::borrow::Cow;
use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::{Resolver, TokioResolver};

use crate::errors::{DnsError, Result};
use crate::record::DnsRecord;

/// TTL assigned to answers from the platform resolver, which does not
/// expose one. Seconds.
pub const DEFAULT_FALLBACK_TTL: u64 = 3600;

/// A resolution strategy: host name in, record out.
///
/// `None` covers every unsuccessful outcome, including malformed names —
/// callers pick a fallback or cache the failure, they never branch on an
/// error kind. An empty host is a boundary condition and must return `None`
/// without any network activity.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str) -> Option<DnsRecord>;
}

/// Library stage: queries A records through hickory-resolver and reports
/// the largest TTL seen in the answer set.
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    /// Resolver backed by the default public nameserver configuration.
    pub fn new() -> Self {
        let resolver = Resolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        )
        .build();
        Self { resolver }
    }

    /// Resolver using the system configuration (`/etc/resolv.conf` on Unix).
    pub fn from_system_conf() -> Result<Self> {
        let resolver = Resolver::builder_tokio()
            .map_err(|e| DnsError::SystemConf(e.to_string()))?
            .build();
        Ok(Self { resolver })
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolve for DnsResolver {
    async fn resolve(&self, host: &str) -> Option<DnsRecord> {
        if host.is_empty() {
            return None;
        }
        let fqdn = to_fqdn(host);
        let lookup = match self.resolver.lookup(fqdn.as_ref(), RecordType::A).await {
            Ok(lookup) => lookup,
            Err(e) => {
                // Malformed names and empty answers alike: no answer here,
                // let the next stage have a go.
                log::debug!("A lookup for {} yielded no answer: {}", host, e);
                return None;
            }
        };

        let mut addrs = Vec::new();
        let mut max_ttl = 0u32;
        for record in lookup.record_iter() {
            if let RData::A(a) = record.data() {
                addrs.push(IpAddr::V4(a.0));
                if record.ttl() > max_ttl {
                    max_ttl = record.ttl();
                }
            }
        }
        if addrs.is_empty() {
            return None;
        }
        Some(DnsRecord::new(addrs, host, u64::from(max_ttl)))
    }
}

/// Platform stage: asks the operating system resolver via
/// `tokio::net::lookup_host`. No TTL is available, so answers carry a
/// configured default.
pub struct SystemResolver {
    default_ttl: u64,
}

impl SystemResolver {
    pub fn new(default_ttl: u64) -> Self {
        Self { default_ttl }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_TTL)
    }
}

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str) -> Option<DnsRecord> {
        if host.is_empty() {
            return None;
        }
        let resolved = match tokio::net::lookup_host((host, 0u16)).await {
            Ok(iter) => iter,
            Err(e) => {
                log::debug!("system lookup for {} failed: {}", host, e);
                return None;
            }
        };
        // getaddrinfo repeats addresses across socket types; keep each once,
        // in order.
        let mut addrs: Vec<IpAddr> = Vec::new();
        for sockaddr in resolved {
            let ip = sockaddr.ip();
            if !addrs.contains(&ip) {
                addrs.push(ip);
            }
        }
        if addrs.is_empty() {
            return None;
        }
        Some(DnsRecord::new(addrs, host, self.default_ttl))
    }
}

/// The two-stage chain: library lookup first, platform resolver when the
/// library produced nothing. Both stages failing is worth operator
/// visibility, so that path logs a warning before reporting no answer.
pub struct ChainResolver {
    primary: Box<dyn Resolve>,
    fallback: Box<dyn Resolve>,
}

impl ChainResolver {
    pub fn new(fallback_ttl: u64) -> Self {
        Self {
            primary: Box::new(DnsResolver::new()),
            fallback: Box::new(SystemResolver::new(fallback_ttl)),
        }
    }

    /// Builds a chain from explicit stages. Useful when one stage should be
    /// replaced, e.g. a system-conf library resolver or a stub in tests.
    pub fn with_stages(primary: Box<dyn Resolve>, fallback: Box<dyn Resolve>) -> Self {
        Self { primary, fallback }
    }
}

impl Default for ChainResolver {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_TTL)
    }
}

#[async_trait]
impl Resolve for ChainResolver {
    async fn resolve(&self, host: &str) -> Option<DnsRecord> {
        if host.is_empty() {
            return None;
        }
        if let Some(record) = self.primary.resolve(host).await {
            return Some(record);
        }
        match self.fallback.resolve(host).await {
            Some(record) => Some(record),
            None => {
                log::warn!("resolution failed for host {}", host);
                None
            }
        }
    }
}

/// DNS queries want a fully qualified name; add the root label if the
/// caller left it off.
fn to_fqdn(host: &str) -> Cow<'_, str> {
    if host.ends_with('.') {
        Cow::Borrowed(host)
    } else {
        Cow::Owned(format!("{}.", host))
    }
}
