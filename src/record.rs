use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// A resolved DNS answer for one host: its addresses, the TTL the resolver
/// reported, and a usage counter driving round-robin address selection.
///
/// Addresses, host and TTL are fixed at construction; only the counter
/// changes afterwards. The cache increments it on every hit, so a record
/// handed out twice is observably "further along" its address rotation.
pub struct DnsRecord {
    addrs: Vec<IpAddr>,
    host: String,
    ttl: u64,
    used: AtomicU64,
}

impl DnsRecord {
    /// `ttl` is in seconds. `addrs` must be non-empty for a usable record;
    /// the resolver stages never construct one otherwise.
    pub fn new(addrs: Vec<IpAddr>, host: impl Into<String>, ttl: u64) -> Self {
        Self {
            addrs,
            host: host.into(),
            ttl,
            used: AtomicU64::new(0),
        }
    }

    pub fn addrs(&self) -> &[IpAddr] {
        &self.addrs
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// TTL in seconds, as reported by the resolver that produced the record.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub fn used_counter(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    /// Bumps the usage counter, returning the previous value. Safe to call
    /// from concurrent lookups; a lost race only skews the rotation slightly.
    pub fn increment_used(&self) -> u64 {
        self.used.fetch_add(1, Ordering::Relaxed)
    }

    /// Picks one address, cycling through the set as the counter grows.
    ///
    /// Panics if the record has no addresses, which no resolver stage
    /// produces; reaching that panic means a caller built an empty record
    /// by hand.
    pub fn pick_addr(&self) -> IpAddr {
        let idx = (self.used_counter() % self.addrs.len() as u64) as usize;
        self.addrs[idx]
    }
}

impl fmt::Debug for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsRecord")
            .field("host", &self.host)
            .field("addrs", &self.addrs)
            .field("ttl", &self.ttl)
            .field("used", &self.used_counter())
            .finish()
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {:?} (ttl {}s, used {})",
            self.host,
            self.addrs,
            self.ttl,
            self.used_counter()
        )
    }
}
