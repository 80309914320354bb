use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    entities::{Coordinates, RouteEstimate},
    error::{upstream_error, Error},
    route::RouteEstimator,
};

#[derive(Clone, Debug, Deserialize)]
struct Route {
    distance: f64,
    duration: f64,
}

#[derive(Clone, Debug, Deserialize)]
struct Response {
    code: String,
    routes: Option<Vec<Route>>,
}

/// Road estimates from an OSRM-compatible `/route/v1/driving` endpoint.
#[derive(Clone, Debug)]
pub struct OsrmEstimator {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmEstimator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RouteEstimator for OsrmEstimator {
    #[tracing::instrument(skip(self))]
    async fn estimate(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<RouteEstimate, Error> {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.base_url, origin.lng, origin.lat, destination.lng, destination.lat
        );

        let res = self
            .client
            .get(url)
            .query(&[("overview", "false")])
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if status_code != 200 {
            return Err(upstream_error(format!("osrm responded with {}", status_code)));
        }

        let data: Response = res.json().await?;

        if data.code != "Ok" {
            return Err(upstream_error(data.code));
        }

        let route = data
            .routes
            .and_then(|routes| routes.into_iter().next())
            .ok_or_else(|| upstream_error("osrm returned no routes"))?;

        Ok(RouteEstimate::road(
            (route.distance / 100.0).round() / 10.0,
            (route.duration / 6.0).round() / 10.0,
        ))
    }
}

#[test]
fn parses_osrm_route_response() {
    let body = r#"{"code":"Ok","routes":[{"distance":12345.6,"duration":900.0,"legs":[]}]}"#;
    let data: Response = serde_json::from_str(body).unwrap();

    assert_eq!(data.code, "Ok");
    let route = &data.routes.unwrap()[0];
    assert_eq!(route.distance, 12345.6);
    assert_eq!(route.duration, 900.0);
}
