use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::error::{config_error, Error};

/// Tunables for the matching and dispute rules, passed to the engine as one value.
#[derive(Clone, Debug)]
pub struct MatchingConfig {
    pub visibility_radius_km: f64,
    pub road_correction_factor: f64,
    pub fallback_speed_kmh: f64,
    pub city_radius_km: f64,
    pub offer_ttl: Duration,
    pub offer_cooldown: Duration,
    pub end_penalty: f64,
    pub min_rating: f64,
    pub stale_open_after: Duration,
    pub stale_active_after: Duration,
    pub route_timeout: StdDuration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            visibility_radius_km: 50.0,
            road_correction_factor: 1.4,
            fallback_speed_kmh: 40.0,
            city_radius_km: 50.0,
            offer_ttl: Duration::minutes(10),
            offer_cooldown: Duration::minutes(3),
            end_penalty: 1.0,
            min_rating: 1.0,
            stale_open_after: Duration::minutes(30),
            stale_active_after: Duration::minutes(120),
            route_timeout: StdDuration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    TinyLfu,
    Lru,
}

impl FromStr for CachePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiny_lfu" | "tinylfu" => Ok(Self::TinyLfu),
            "lru" => Ok(Self::Lru),
            _ => Err(config_error("ROUTE_CACHE_POLICY")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RouteCacheConfig {
    pub ttl: StdDuration,
    pub capacity: u64,
    pub policy: CachePolicy,
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            ttl: StdDuration::from_secs(300),
            capacity: 1000,
            policy: CachePolicy::TinyLfu,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub listen_addr: SocketAddr,
    pub osrm_base_url: String,
    pub sweep_interval: StdDuration,
    pub route_cache: RouteCacheConfig,
    pub matching: MatchingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        let matching = MatchingConfig {
            visibility_radius_km: parse_or("VISIBILITY_RADIUS_KM", 50.0)?,
            road_correction_factor: parse_or("ROAD_CORRECTION_FACTOR", 1.4)?,
            fallback_speed_kmh: parse_or("FALLBACK_SPEED_KMH", 40.0)?,
            city_radius_km: parse_or("CITY_RADIUS_KM", 50.0)?,
            offer_ttl: Duration::minutes(parse_or("OFFER_TTL_MINUTES", 10)?),
            offer_cooldown: Duration::minutes(parse_or("OFFER_COOLDOWN_MINUTES", 3)?),
            end_penalty: parse_or("END_PENALTY", 1.0)?,
            min_rating: parse_or("MIN_RATING", 1.0)?,
            stale_open_after: Duration::minutes(parse_or("STALE_OPEN_MINUTES", 30)?),
            stale_active_after: Duration::minutes(parse_or("STALE_ACTIVE_MINUTES", 120)?),
            route_timeout: StdDuration::from_secs(parse_or("ROUTE_TIMEOUT_SECS", 5)?),
        };

        let route_cache = RouteCacheConfig {
            ttl: StdDuration::from_secs(parse_or("ROUTE_CACHE_TTL_SECS", 300)?),
            capacity: parse_or("ROUTE_CACHE_CAPACITY", 1000)?,
            policy: parse_or("ROUTE_CACHE_POLICY", CachePolicy::TinyLfu)?,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            listen_addr: parse_or("LISTEN_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            osrm_base_url: env::var("OSRM_BASE_URL")
                .unwrap_or_else(|_| "https://router.project-osrm.org".into()),
            sweep_interval: StdDuration::from_secs(parse_or("SWEEP_INTERVAL_SECS", 60)?),
            route_cache,
            matching,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, Error> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| config_error(key)),
        Err(_) => Ok(default),
    }
}

#[test]
fn cache_policy_names() {
    assert_eq!("tiny_lfu".parse::<CachePolicy>().unwrap(), CachePolicy::TinyLfu);
    assert_eq!(" LRU ".parse::<CachePolicy>().unwrap(), CachePolicy::Lru);
    assert!("fifo".parse::<CachePolicy>().is_err());
}

#[test]
fn unset_variables_fall_back_to_defaults() {
    let value: u32 = parse_or("LEYLEK_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
    assert_eq!(value, 7);
}
