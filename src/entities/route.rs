use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    Road,
    StraightLine,
}

/// Distance and duration between two points, as displayed to riders and drivers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_min: f64,
    pub source: EstimateSource,
}

impl RouteEstimate {
    pub fn road(distance_km: f64, duration_min: f64) -> Self {
        Self {
            distance_km,
            duration_min,
            source: EstimateSource::Road,
        }
    }

    pub fn straight_line(distance_km: f64, duration_min: f64) -> Self {
        Self {
            distance_km,
            duration_min,
            source: EstimateSource::StraightLine,
        }
    }
}
