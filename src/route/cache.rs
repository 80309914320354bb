use async_trait::async_trait;
use moka::future::Cache;
use moka::policy::EvictionPolicy;

use crate::config::{CachePolicy, RouteCacheConfig};
use crate::entities::{Coordinates, RouteEstimate};

/// Origin and destination rounded to two decimals, roughly a kilometre.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RouteKey([i32; 4]);

impl RouteKey {
    pub fn new(origin: Coordinates, destination: Coordinates) -> Self {
        Self([
            round_hundredths(origin.lat),
            round_hundredths(origin.lng),
            round_hundredths(destination.lat),
            round_hundredths(destination.lng),
        ])
    }
}

fn round_hundredths(value: f64) -> i32 {
    (value * 100.0).round() as i32
}

#[async_trait]
pub trait RouteCache: Send + Sync {
    async fn get(&self, key: &RouteKey) -> Option<RouteEstimate>;
    async fn insert(&self, key: RouteKey, estimate: RouteEstimate);
}

pub struct MokaRouteCache {
    cache: Cache<RouteKey, RouteEstimate>,
}

impl MokaRouteCache {
    pub fn new(config: &RouteCacheConfig) -> Self {
        let policy = match config.policy {
            CachePolicy::TinyLfu => EvictionPolicy::tiny_lfu(),
            CachePolicy::Lru => EvictionPolicy::lru(),
        };

        let cache = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_live(config.ttl)
            .eviction_policy(policy)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl RouteCache for MokaRouteCache {
    async fn get(&self, key: &RouteKey) -> Option<RouteEstimate> {
        self.cache.get(key).await
    }

    async fn insert(&self, key: RouteKey, estimate: RouteEstimate) {
        self.cache.insert(key, estimate).await;
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRouteCache;

#[async_trait]
impl RouteCache for NoopRouteCache {
    async fn get(&self, _: &RouteKey) -> Option<RouteEstimate> {
        None
    }

    async fn insert(&self, _: RouteKey, _: RouteEstimate) {}
}

#[test]
fn nearby_points_share_a_key() {
    let a = RouteKey::new(Coordinates::new(37.0012, 35.0049), Coordinates::new(41.0, 29.0));
    let b = RouteKey::new(Coordinates::new(36.9989, 34.9951), Coordinates::new(41.0, 29.0));
    let c = RouteKey::new(Coordinates::new(37.02, 35.0), Coordinates::new(41.0, 29.0));

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn moka_cache_returns_inserted_estimates() {
    let cache = MokaRouteCache::new(&RouteCacheConfig::default());
    let key = RouteKey::new(Coordinates::new(37.0, 35.0), Coordinates::new(41.0, 29.0));

    tokio_test::block_on(async {
        assert!(cache.get(&key).await.is_none());
        cache.insert(key, RouteEstimate::road(700.0, 480.0)).await;
        assert_eq!(cache.get(&key).await, Some(RouteEstimate::road(700.0, 480.0)));
    });
}
