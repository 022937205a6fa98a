use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;

use crate::record::DnsRecord;
use crate::resolver::{ChainResolver, Resolve, DEFAULT_FALLBACK_TTL};

/// Tuning knobs for [`DnsCache`], with the stock defaults: room for 10k
/// hosts, failed lookups remembered for a minute, and an hour of validity
/// for answers the platform resolver produced without a TTL.
#[derive(Debug, Clone)]
pub struct DnsCacheConfig {
    /// Upper bound on cached hosts; the store evicts beyond this.
    pub max_capacity: u64,
    /// How long a failed resolution is remembered before retrying.
    pub negative_ttl: Duration,
    /// TTL in seconds assigned to fallback-stage answers.
    pub fallback_ttl: u64,
}

impl Default for DnsCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            negative_ttl: Duration::from_secs(60),
            fallback_ttl: DEFAULT_FALLBACK_TTL,
        }
    }
}

/// What the store remembers for a host: either an answer or the fact that
/// resolution failed. `Failed` never escapes to callers; it only tells the
/// coordinator to report a miss without re-resolving.
#[derive(Clone)]
enum CacheValue {
    Resolved(Arc<DnsRecord>),
    Failed,
}

#[derive(Clone)]
struct CachedEntry {
    value: CacheValue,
    lifetime: Duration,
}

/// Entries carry their own lifetime because positive TTLs vary per answer
/// while negative entries use one fixed window.
struct EntryLifetime;

impl Expiry<String, CachedEntry> for EntryLifetime {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.lifetime)
    }
}

/// The get-or-resolve coordinator.
///
/// A lookup checks the store first; on a hit the record's usage counter is
/// bumped and the shared record returned. On a miss the resolver chain
/// runs, and either the answer is stored under its TTL or a negative entry
/// is stored for [`DnsCacheConfig::negative_ttl`]. Failures come back as
/// `None`, never as errors.
///
/// Check-then-resolve is deliberately not atomic across the map: two
/// concurrent misses for one host may both resolve and both insert. The
/// inserts are idempotent upserts keyed by host, so this costs a duplicate
/// query, not correctness.
pub struct DnsCache {
    cache: Cache<String, CachedEntry>,
    resolver: Arc<dyn Resolve>,
    config: DnsCacheConfig,
}

impl DnsCache {
    /// Cache backed by the standard two-stage resolver chain.
    pub fn new(config: DnsCacheConfig) -> Self {
        let resolver = Arc::new(ChainResolver::new(config.fallback_ttl));
        Self::with_resolver(config, resolver)
    }

    /// Cache backed by a caller-supplied resolver.
    pub fn with_resolver(config: DnsCacheConfig, resolver: Arc<dyn Resolve>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryLifetime)
            .build();
        Self {
            cache,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &DnsCacheConfig {
        &self.config
    }

    /// Approximate number of entries currently held.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// One round-robin address for `host`, resolving and caching on a miss.
    pub async fn get_addr(&self, host: &str) -> Option<IpAddr> {
        self.get_addr_with_ttl(host, None).await
    }

    pub async fn get_addr_with_ttl(&self, host: &str, ttl_override: Option<u64>) -> Option<IpAddr> {
        let record = self.get_record_with_ttl(host, ttl_override).await?;
        Some(record.pick_addr())
    }

    /// All addresses for `host`, resolving and caching on a miss.
    pub async fn get_addrs(&self, host: &str) -> Option<Vec<IpAddr>> {
        self.get_addrs_with_ttl(host, None).await
    }

    pub async fn get_addrs_with_ttl(
        &self,
        host: &str,
        ttl_override: Option<u64>,
    ) -> Option<Vec<IpAddr>> {
        let record = self.get_record_with_ttl(host, ttl_override).await?;
        Some(record.addrs().to_vec())
    }

    /// The full cached record for `host`, resolving and caching on a miss.
    pub async fn get_record(&self, host: &str) -> Option<Arc<DnsRecord>> {
        self.get_record_with_ttl(host, None).await
    }

    /// Like [`get_record`](Self::get_record), but `ttl_override` pins the
    /// cache lifetime in seconds instead of trusting the resolver-reported
    /// TTL. `None` keeps the resolver's value. The override applies to
    /// positive answers only; failed lookups always use the configured
    /// negative TTL.
    pub async fn get_record_with_ttl(
        &self,
        host: &str,
        ttl_override: Option<u64>,
    ) -> Option<Arc<DnsRecord>> {
        if host.is_empty() {
            return None;
        }

        if let Some(entry) = self.cache.get(host).await {
            return match entry.value {
                CacheValue::Resolved(record) => {
                    record.increment_used();
                    log::debug!("DNS cache hit: host={}, addrs={}", host, record.addrs().len());
                    Some(record)
                }
                CacheValue::Failed => {
                    log::debug!("DNS cache hit (negative): host={}", host);
                    None
                }
            };
        }

        log::debug!("DNS cache miss: host={}, resolving...", host);
        match self.resolver.resolve(host).await {
            Some(record) => {
                let lifetime = Duration::from_secs(ttl_override.unwrap_or(record.ttl()));
                let record = Arc::new(record);
                log::debug!(
                    "DNS cache insert: host={}, addrs={}, lifetime={:?}",
                    host,
                    record.addrs().len(),
                    lifetime
                );
                let entry = CachedEntry {
                    value: CacheValue::Resolved(Arc::clone(&record)),
                    lifetime,
                };
                self.cache.insert(host.to_string(), entry).await;
                Some(record)
            }
            None => {
                log::debug!(
                    "DNS cache insert (negative): host={}, lifetime={:?}",
                    host,
                    self.config.negative_ttl
                );
                let entry = CachedEntry {
                    value: CacheValue::Failed,
                    lifetime: self.config.negative_ttl,
                };
                self.cache.insert(host.to_string(), entry).await;
                None
            }
        }
    }

    /// Resolves through the chain without touching the cache. Diagnostics
    /// helper: lets a caller compare live answers against cached ones.
    pub async fn resolve_uncached(&self, host: &str) -> Option<DnsRecord> {
        self.resolver.resolve(host).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        answer: Option<(Vec<IpAddr>, u64)>,
        calls: AtomicUsize,
    }

    impl CountingResolver {
        fn answering(addrs: Vec<IpAddr>, ttl: u64) -> Arc<Self> {
            Arc::new(Self {
                answer: Some((addrs, ttl)),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Resolve for CountingResolver {
        async fn resolve(&self, host: &str) -> Option<DnsRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .as_ref()
                .map(|(addrs, ttl)| DnsRecord::new(addrs.clone(), host, *ttl))
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, last))
    }

    fn cache_with(resolver: Arc<CountingResolver>) -> DnsCache {
        let _ = env_logger::builder().is_test(true).try_init();
        DnsCache::with_resolver(DnsCacheConfig::default(), resolver)
    }

    #[tokio::test]
    async fn second_lookup_hits_cache_and_bumps_counter() {
        let resolver = CountingResolver::answering(vec![ip(1), ip(2)], 300);
        let cache = cache_with(resolver.clone());

        let first = cache.get_record("host.test").await.unwrap();
        assert_eq!(first.used_counter(), 0);

        let second = cache.get_record("host.test").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.used_counter(), 1);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn negative_result_is_cached_and_suppresses_retries() {
        let resolver = CountingResolver::failing();
        let cache = cache_with(resolver.clone());

        assert!(cache.get_record("broken.test").await.is_none());
        assert!(cache.get_record("broken.test").await.is_none());
        assert!(cache.get_addr("broken.test").await.is_none());
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn empty_host_never_reaches_the_resolver() {
        let resolver = CountingResolver::answering(vec![ip(1)], 300);
        let cache = cache_with(resolver.clone());

        assert!(cache.get_record("").await.is_none());
        assert!(cache.get_addr("").await.is_none());
        assert!(cache.get_addrs("").await.is_none());
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn zero_ttl_override_expires_immediately() {
        let resolver = CountingResolver::answering(vec![ip(1)], 300);
        let cache = cache_with(resolver.clone());

        assert!(cache
            .get_record_with_ttl("short.test", Some(0))
            .await
            .is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache
            .get_record_with_ttl("short.test", Some(0))
            .await
            .is_some());
        // both lookups had to resolve; nothing survived in the cache
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test]
    async fn no_override_keeps_resolver_reported_ttl() {
        let resolver = CountingResolver::answering(vec![ip(1)], 120);
        let cache = cache_with(resolver);

        let record = cache.get_record_with_ttl("ttl.test", None).await.unwrap();
        assert_eq!(record.ttl(), 120);
    }

    #[tokio::test]
    async fn round_robin_across_consecutive_lookups() {
        let resolver = CountingResolver::answering(vec![ip(1), ip(2), ip(3)], 120);
        let cache = cache_with(resolver.clone());

        let record = cache.get_record("example.test").await.unwrap();
        assert_eq!(record.addrs(), &[ip(1), ip(2), ip(3)]);
        assert_eq!(record.ttl(), 120);
        assert_eq!(record.used_counter(), 0);

        // each hit bumps the counter before picking
        assert_eq!(cache.get_addr("example.test").await, Some(ip(2)));
        assert_eq!(cache.get_addr("example.test").await, Some(ip(3)));
        assert_eq!(cache.get_addr("example.test").await, Some(ip(1)));
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn get_addrs_returns_the_full_answer_set() {
        let resolver = CountingResolver::answering(vec![ip(1), ip(2)], 60);
        let cache = cache_with(resolver);

        let addrs = cache.get_addrs("pair.test").await.unwrap();
        assert_eq!(addrs, vec![ip(1), ip(2)]);
    }

    #[tokio::test]
    async fn uncached_resolution_does_not_populate_the_store() {
        let resolver = CountingResolver::answering(vec![ip(1)], 60);
        let cache = cache_with(resolver.clone());

        assert!(cache.resolve_uncached("direct.test").await.is_some());
        assert!(cache.get_record("direct.test").await.is_some());
        assert_eq!(resolver.calls(), 2);
    }
}
