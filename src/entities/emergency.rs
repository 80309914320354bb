use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Coordinates, Place, Tag, TagStatus};

/// An SOS raised by a trip participant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub id: Uuid,
    pub tag_id: Uuid,
    pub user_id: Uuid,
    /// Last known position of the user raising the alert, else the pickup point.
    pub location: Coordinates,
    pub created_at: DateTime<Utc>,
}

impl EmergencyAlert {
    pub fn new(tag: &Tag, user_id: Uuid, position: Option<Coordinates>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag_id: tag.id,
            user_id,
            location: position.unwrap_or(tag.pickup.coordinates),
            created_at: now,
        }
    }
}

/// What anyone holding a trip's share link may see. Carries no user ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SharedTrip {
    pub status: TagStatus,
    pub passenger_name: String,
    pub driver_name: Option<String>,
    pub driver_location: Option<Coordinates>,
    pub pickup: Place,
    pub dropoff: Place,
    pub emergency_shared: bool,
    pub matched_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Tag> for SharedTrip {
    fn from(tag: &Tag) -> Self {
        Self {
            status: tag.status,
            passenger_name: tag.passenger_name.clone(),
            driver_name: tag.driver_name.clone(),
            driver_location: tag.driver_location,
            pickup: tag.pickup.clone(),
            dropoff: tag.dropoff.clone(),
            emergency_shared: tag.emergency_shared,
            matched_at: tag.matched_at,
            started_at: tag.started_at,
            completed_at: tag.completed_at,
        }
    }
}

#[test]
fn alert_falls_back_to_the_pickup_point() {
    use crate::entities::{Role, User};

    let passenger = User::new(
        "Ayşe",
        std::collections::BTreeSet::from([Role::Passenger]),
        "Adana",
        Utc::now(),
    );
    let tag = Tag::new(
        &passenger,
        Place::new("Seyhan", 37.0, 35.0),
        Place::new("Kadıköy", 41.0, 29.0),
        None,
        "Adana".into(),
        Utc::now(),
    );

    let alert = EmergencyAlert::new(&tag, passenger.id, None, Utc::now());
    assert_eq!(alert.location, Coordinates::new(37.0, 35.0));

    let moving = Coordinates::new(37.5, 34.6);
    let alert = EmergencyAlert::new(&tag, passenger.id, Some(moving), Utc::now());
    assert_eq!(alert.location, moving);

    let shared = SharedTrip::from(&tag);
    assert_eq!(shared.passenger_name, "Ayşe");
    assert_eq!(shared.status, TagStatus::Pending);
}
