use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::RouteEstimate;
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
}

impl OfferStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

/// A driver's priced bid against a ride request. The price never changes once created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub tag_id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub driver_rating: f64,
    pub price: f64,
    pub notes: Option<String>,
    pub pickup_estimate: Option<RouteEstimate>,
    pub trip_estimate: Option<RouteEstimate>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Offer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tag_id: Uuid,
        driver_id: Uuid,
        driver_name: String,
        driver_rating: f64,
        price: f64,
        notes: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag_id,
            driver_id,
            driver_name,
            driver_rating,
            price,
            notes,
            pickup_estimate: None,
            trip_estimate: None,
            status: OfferStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn with_estimates(
        mut self,
        pickup_estimate: Option<RouteEstimate>,
        trip_estimate: Option<RouteEstimate>,
    ) -> Self {
        self.pickup_estimate = pickup_estimate;
        self.trip_estimate = trip_estimate;
        self
    }

    pub fn validate_price(price: f64) -> Result<(), Error> {
        if !price.is_finite() || price <= 0.0 {
            return Err(Error::invalid_argument("price must be a positive amount"));
        }

        Ok(())
    }

    /// Expiry only applies to bids still waiting for an answer.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Pending && now >= self.expires_at
    }

    pub fn is_acceptable(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Pending && !self.is_expired(now)
    }

    /// Pending-and-unexpired or accepted: the bids that count against the one-per-driver rule.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            OfferStatus::Pending => !self.is_expired(now),
            OfferStatus::Accepted => true,
            OfferStatus::Rejected => false,
        }
    }

    pub fn accept(&mut self) -> Result<(), Error> {
        match self.status {
            OfferStatus::Pending => {
                self.status = OfferStatus::Accepted;
                Ok(())
            }
            _ => Err(Error::not_found("offer is no longer available")),
        }
    }

    pub fn reject(&mut self) -> bool {
        match self.status {
            OfferStatus::Pending => {
                self.status = OfferStatus::Rejected;
                true
            }
            _ => false,
        }
    }
}

/// Ascending by price, lowest bid first.
pub fn sort_by_price(offers: &mut [Offer]) {
    offers.sort_by(|a, b| a.price.total_cmp(&b.price));
}

#[cfg(test)]
fn sample(now: DateTime<Utc>) -> Offer {
    Offer::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        "Mehmet".into(),
        4.9,
        850.0,
        None,
        now,
        Duration::minutes(10),
    )
}

#[test]
fn pending_offers_expire_after_their_window() {
    let now = Utc::now();
    let offer = sample(now - Duration::minutes(11));

    assert!(offer.is_expired(now));
    assert!(!offer.is_live(now));
    assert!(!offer.is_acceptable(now));
    assert!(sample(now).is_acceptable(now));
}

#[test]
fn accepted_offers_never_expire() {
    let now = Utc::now();
    let mut offer = sample(now - Duration::minutes(30));
    offer.status = OfferStatus::Accepted;

    assert!(!offer.is_expired(now));
    assert!(offer.is_live(now));
}

#[test]
fn only_pending_offers_change_status() {
    let mut offer = sample(Utc::now());

    assert!(offer.reject());
    assert!(!offer.reject());
    assert!(offer.accept().unwrap_err().is_not_found());
}

#[test]
fn offers_sort_lowest_price_first() {
    let now = Utc::now();
    let mut offers: Vec<Offer> = [900.0, 650.0, 720.0]
        .into_iter()
        .map(|price| Offer {
            price,
            ..sample(now)
        })
        .collect();

    sort_by_price(&mut offers);

    let prices: Vec<f64> = offers.iter().map(|o| o.price).collect();
    assert_eq!(prices, vec![650.0, 720.0, 900.0]);
}

#[test]
fn prices_must_be_positive() {
    assert!(Offer::validate_price(850.0).is_ok());
    assert!(Offer::validate_price(0.0).is_err());
    assert!(Offer::validate_price(f64::INFINITY).is_err());
}
