use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Coordinates;
use crate::error::Error;
use crate::geo;

pub const DEFAULT_RATING: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Passenger,
    Driver,
}

impl Role {
    pub fn name(&self) -> String {
        match self {
            Self::Passenger => "passenger".into(),
            Self::Driver => "driver".into(),
        }
    }
}

/// Directory record for a rider or a driver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub roles: BTreeSet<Role>,
    pub city: String,
    pub position: Option<Coordinates>,
    pub rating: f64,
    pub rating_count: u32,
    pub total_trips: u32,
    pub blocked: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        roles: BTreeSet<Role>,
        city: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            roles,
            city: city.into(),
            position: None,
            rating: DEFAULT_RATING,
            rating_count: 0,
            total_trips: 0,
            blocked: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn require_role(&self, role: Role) -> Result<(), Error> {
        if !self.has_role(role) {
            return Err(Error::forbidden(format!(
                "only users with the {} role can do this",
                role.name()
            )));
        }

        Ok(())
    }

    /// Case-insensitive comparison against the registered city.
    pub fn in_city(&self, city: &str) -> bool {
        geo::same_city(&self.city, city)
    }

    /// Blocking is enforced in both directions.
    pub fn is_blocked_with(&self, other: &User) -> bool {
        self.blocked.contains(&other.id) || other.blocked.contains(&self.id)
    }

    pub fn move_to(&mut self, position: Coordinates, now: DateTime<Utc>) {
        self.position = Some(position);
        self.updated_at = now;
    }

    pub fn block(&mut self, other: Uuid, now: DateTime<Utc>) -> Result<bool, Error> {
        if other == self.id {
            return Err(Error::invalid_argument("users cannot block themselves"));
        }

        let changed = self.blocked.insert(other);
        if changed {
            self.updated_at = now;
        }

        Ok(changed)
    }

    pub fn unblock(&mut self, other: Uuid, now: DateTime<Utc>) -> bool {
        let changed = self.blocked.remove(&other);
        if changed {
            self.updated_at = now;
        }

        changed
    }

    /// Folds one score into the running mean, rounded to one decimal place.
    pub fn apply_rating(&mut self, score: u8, now: DateTime<Utc>) -> f64 {
        let count = self.rating_count as f64;
        let average = (self.rating * count + score as f64) / (count + 1.0);

        self.rating = round_to_tenth(average);
        self.rating_count += 1;
        self.updated_at = now;

        self.rating
    }

    pub fn apply_penalty(&mut self, penalty: f64, floor: f64, now: DateTime<Utc>) -> f64 {
        self.rating = round_to_tenth((self.rating - penalty).max(floor));
        self.updated_at = now;

        self.rating
    }

    pub fn record_trip(&mut self, now: DateTime<Utc>) {
        self.total_trips += 1;
        self.updated_at = now;
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
fn sample(roles: &[Role]) -> User {
    User::new("Ayşe", roles.iter().copied().collect(), "Adana", Utc::now())
}

#[test]
fn first_rating_replaces_the_default() {
    let mut user = sample(&[Role::Driver]);

    assert_eq!(user.apply_rating(3, Utc::now()), 3.0);
    assert_eq!(user.rating_count, 1);
}

#[test]
fn running_mean_is_rounded_to_one_decimal() {
    let mut user = sample(&[Role::Driver]);

    user.apply_rating(5, Utc::now());
    user.apply_rating(4, Utc::now());
    assert_eq!(user.rating, 4.5);

    // (4.5 * 2 + 4) / 3 = 4.333..
    assert_eq!(user.apply_rating(4, Utc::now()), 4.3);
    assert_eq!(user.rating_count, 3);
}

#[test]
fn penalty_is_floored() {
    let mut user = sample(&[Role::Passenger]);

    assert_eq!(user.apply_penalty(1.0, 1.0, Utc::now()), 4.0);
    assert_eq!(user.apply_penalty(5.0, 1.0, Utc::now()), 1.0);
}

#[test]
fn blocking_is_checked_both_ways() {
    let mut passenger = sample(&[Role::Passenger]);
    let driver = sample(&[Role::Driver]);

    assert!(!passenger.is_blocked_with(&driver));
    assert!(passenger.block(driver.id, Utc::now()).unwrap());
    assert!(passenger.is_blocked_with(&driver));
    assert!(driver.is_blocked_with(&passenger));

    assert!(passenger.block(passenger.id, Utc::now()).is_err());
    assert!(passenger.unblock(driver.id, Utc::now()));
    assert!(!driver.is_blocked_with(&passenger));
}

#[test]
fn city_match_ignores_case() {
    let user = sample(&[Role::Driver]);

    assert!(user.in_city("adana"));
    assert!(user.in_city(" ADANA "));
    assert!(!user.in_city("Mersin"));

    let mut user = sample(&[Role::Driver]);
    user.city = "İstanbul".into();
    assert!(user.in_city("istanbul"));
    assert!(user.in_city("Istanbul"));
}
