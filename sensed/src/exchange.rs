use lru::LruCache;
use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// How long a peer's message id names the same exchange (RFC 7252 EXCHANGE_LIFETIME)
pub const EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);

/// Exchanges remembered at once, oldest evicted first
pub const EXCHANGE_CACHE_SIZE: usize = 1024;

pub(crate) type ExchangeKey = (SocketAddr, u16);

struct Exchange {
    seen: Instant,
    response: Option<Vec<u8>>,
}

/// What the server already knows about an inbound message id
#[derive(Debug, PartialEq)]
pub(crate) enum Seen {
    New,
    /// Still being handled, the retransmission is dropped
    InFlight,
    /// Answered before, the reply is sent again as is
    Answered(Vec<u8>),
}

/// Recent request exchanges per peer, so a retransmitted request is
/// answered from here instead of being handled twice.
pub(crate) struct ExchangeCache {
    lifetime: Duration,
    entries: Mutex<LruCache<ExchangeKey, Exchange>>,
}

impl ExchangeCache {
    pub fn new(capacity: NonZeroUsize, lifetime: Duration) -> Self {
        Self {
            lifetime,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look `key` up, recording it as in flight when it is new or expired
    pub async fn check(&self, key: ExchangeKey) -> Seen {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some(exchange) = entries.peek(&key) {
            if now.duration_since(exchange.seen) < self.lifetime {
                return match &exchange.response {
                    Some(bytes) => Seen::Answered(bytes.clone()),
                    None => Seen::InFlight,
                };
            }
        }

        entries.put(
            key,
            Exchange {
                seen: now,
                response: None,
            },
        );
        Seen::New
    }

    pub async fn complete(&self, key: ExchangeKey, response: Vec<u8>) {
        if let Some(exchange) = self.entries.lock().await.peek_mut(&key) {
            exchange.response = Some(response);
        }
    }

    /// Drop an exchange that produced no reply, so a retry is handled afresh
    pub async fn forget(&self, key: &ExchangeKey) {
        self.entries.lock().await.pop(key);
    }
}

impl Default for ExchangeCache {
    fn default() -> Self {
        let capacity = NonZeroUsize::new(EXCHANGE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self::new(capacity, EXCHANGE_LIFETIME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn repeated_ids_are_recognised() {
        let cache = ExchangeCache::default();
        let key = (peer(5000), 7);

        assert_eq!(cache.check(key).await, Seen::New);
        assert_eq!(cache.check(key).await, Seen::InFlight);

        cache.complete(key, vec![1, 2, 3]).await;
        assert_eq!(cache.check(key).await, Seen::Answered(vec![1, 2, 3]));

        // same id from another peer is a different exchange
        assert_eq!(cache.check((peer(5001), 7)).await, Seen::New);
    }

    #[tokio::test]
    async fn forgotten_and_expired_exchanges_start_over() {
        let cache = ExchangeCache::default();
        let key = (peer(5000), 1);
        cache.check(key).await;
        cache.forget(&key).await;
        assert_eq!(cache.check(key).await, Seen::New);

        let expiring = ExchangeCache::new(NonZeroUsize::MIN, Duration::ZERO);
        expiring.check(key).await;
        expiring.complete(key, vec![9]).await;
        assert_eq!(expiring.check(key).await, Seen::New);
    }

    #[tokio::test]
    async fn oldest_exchange_is_evicted() {
        let cache = ExchangeCache::new(NonZeroUsize::new(2).unwrap(), EXCHANGE_LIFETIME);
        for id in 0..3 {
            cache.check((peer(5000), id)).await;
        }
        assert_eq!(cache.check((peer(5000), 0)).await, Seen::New);
        assert_eq!(cache.check((peer(5000), 2)).await, Seen::InFlight);
    }
}
