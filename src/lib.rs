//! A client-side DNS resolution cache.
//!
//! Lookups go through a two-stage resolver chain (a full DNS library query
//! first, the platform resolver as fallback) and land in a bounded,
//! TTL-aware cache. Multi-address answers are served round-robin, and
//! failed lookups are negatively cached for a short window so a broken
//! name does not hammer the resolver.
//!
//! ```no_run
//! use dnscache::{DnsCache, DnsCacheConfig};
//!
//! # async fn run() {
//! let cache = DnsCache::new(DnsCacheConfig::default());
//! if let Some(addr) = cache.get_addr("example.com").await {
//!     println!("connect to {}", addr);
//! }
//! # }
//! ```

pub mod cache;
pub mod errors;
pub mod record;
pub mod resolver;

pub use cache::{DnsCache, DnsCacheConfig};
pub use errors::{DnsError, Result};
pub use record::DnsRecord;
pub use resolver::{ChainResolver, DnsResolver, Resolve, SystemResolver};
