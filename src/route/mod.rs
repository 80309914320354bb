mod cache;

pub use cache::{MokaRouteCache, NoopRouteCache, RouteCache, RouteKey};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::MatchingConfig;
use crate::entities::{Coordinates, RouteEstimate};
use crate::error::Error;
use crate::geo;

/// Road distance and duration between two points, usually backed by a routing service.
#[async_trait]
pub trait RouteEstimator: Send + Sync {
    async fn estimate(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<RouteEstimate, Error>;
}

/// Answers route questions without ever failing: cached road estimates first, then the
/// upstream estimator under a timeout, then an inflated straight-line guess.
#[derive(Clone)]
pub struct RoutePlanner {
    estimator: Arc<dyn RouteEstimator>,
    cache: Arc<dyn RouteCache>,
    timeout: Duration,
    road_correction_factor: f64,
    fallback_speed_kmh: f64,
}

impl RoutePlanner {
    pub fn new(
        estimator: Arc<dyn RouteEstimator>,
        cache: Arc<dyn RouteCache>,
        config: &MatchingConfig,
    ) -> Self {
        Self {
            estimator,
            cache,
            timeout: config.route_timeout,
            road_correction_factor: config.road_correction_factor,
            fallback_speed_kmh: config.fallback_speed_kmh,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn estimate(&self, origin: Coordinates, destination: Coordinates) -> RouteEstimate {
        let key = RouteKey::new(origin, destination);

        if let Some(estimate) = self.cache.get(&key).await {
            return estimate;
        }

        let upstream = tokio::time::timeout(
            self.timeout,
            self.estimator.estimate(origin, destination),
        )
        .await;

        match upstream {
            Ok(Ok(estimate)) => {
                self.cache.insert(key, estimate).await;
                estimate
            }
            Ok(Err(err)) => {
                tracing::warn!("route estimator failed, using straight line: {}", err);
                self.straight_line(origin, destination)
            }
            Err(_) => {
                tracing::warn!("route estimator timed out after {:?}", self.timeout);
                self.straight_line(origin, destination)
            }
        }
    }

    pub fn straight_line(&self, origin: Coordinates, destination: Coordinates) -> RouteEstimate {
        let distance_km = geo::distance_km(origin, destination) * self.road_correction_factor;
        let duration_min = distance_km / self.fallback_speed_kmh * 60.0;

        RouteEstimate::straight_line(round_tenth(distance_km), round_tenth(duration_min))
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
struct CountingEstimator {
    calls: std::sync::atomic::AtomicUsize,
    fail: bool,
}

#[cfg(test)]
#[async_trait]
impl RouteEstimator for CountingEstimator {
    async fn estimate(&self, _: Coordinates, _: Coordinates) -> Result<RouteEstimate, Error> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match self.fail {
            true => Err(Error::not_found("no route")),
            false => Ok(RouteEstimate::road(12.0, 18.0)),
        }
    }
}

#[cfg(test)]
struct StalledEstimator;

#[cfg(test)]
#[async_trait]
impl RouteEstimator for StalledEstimator {
    async fn estimate(&self, _: Coordinates, _: Coordinates) -> Result<RouteEstimate, Error> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(RouteEstimate::road(1.0, 1.0))
    }
}

#[cfg(test)]
fn planner(estimator: Arc<dyn RouteEstimator>, timeout: Duration) -> RoutePlanner {
    let config = MatchingConfig {
        route_timeout: timeout,
        ..MatchingConfig::default()
    };
    let cache = MokaRouteCache::new(&Default::default());
    RoutePlanner::new(estimator, Arc::new(cache), &config)
}

#[tokio::test]
async fn road_estimates_are_cached() {
    let estimator = Arc::new(CountingEstimator {
        calls: std::sync::atomic::AtomicUsize::new(0),
        fail: false,
    });
    let planner = planner(estimator.clone(), Duration::from_secs(5));
    let (a, b) = (Coordinates::new(37.0, 35.0), Coordinates::new(37.1, 35.1));

    assert_eq!(planner.estimate(a, b).await, RouteEstimate::road(12.0, 18.0));
    assert_eq!(planner.estimate(a, b).await, RouteEstimate::road(12.0, 18.0));
    assert_eq!(estimator.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failures_fall_back_and_are_not_cached() {
    let estimator = Arc::new(CountingEstimator {
        calls: std::sync::atomic::AtomicUsize::new(0),
        fail: true,
    });
    let planner = planner(estimator.clone(), Duration::from_secs(5));
    let (a, b) = (Coordinates::new(37.0, 35.0), Coordinates::new(37.1, 35.0));

    let estimate = planner.estimate(a, b).await;
    assert_eq!(estimate.source, crate::entities::EstimateSource::StraightLine);
    // 11.1 km straight line inflated by 1.4
    assert!((15.0..16.0).contains(&estimate.distance_km), "{:?}", estimate);

    planner.estimate(a, b).await;
    assert_eq!(estimator.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn slow_estimators_time_out() {
    let planner = planner(Arc::new(StalledEstimator), Duration::from_millis(20));

    let estimate = planner
        .estimate(Coordinates::new(37.0, 35.0), Coordinates::new(37.1, 35.0))
        .await;
    assert_eq!(estimate.source, crate::entities::EstimateSource::StraightLine);
}
