use geo_types::Point;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let valid = self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng);

        if !valid {
            return Err(Error::invalid_argument("coordinates are out of range"));
        }

        Ok(())
    }
}

impl From<Coordinates> for Point<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Point::new(coordinates.lng, coordinates.lat)
    }
}

/// A human-readable location paired with its coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub description: String,
    pub coordinates: Coordinates,
}

impl Place {
    pub fn new(description: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            description: description.into(),
            coordinates: Coordinates::new(lat, lng),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.description.trim().is_empty() {
            return Err(Error::invalid_argument("location description is required"));
        }

        self.coordinates.validate()
    }
}

#[test]
fn coordinates_outside_the_globe_are_rejected() {
    assert!(Coordinates::new(37.0, 35.0).validate().is_ok());
    assert!(Coordinates::new(91.0, 35.0).validate().unwrap_err().is_invalid_argument());
    assert!(Coordinates::new(37.0, f64::NAN).validate().is_err());
}

#[test]
fn places_need_a_description() {
    assert!(Place::new("  ", 37.0, 35.0).validate().is_err());
    assert!(Place::new("Seyhan", 37.0, 35.0).validate().is_ok());
}
