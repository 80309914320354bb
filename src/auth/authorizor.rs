use oso::{Oso, PolarClass};

use crate::auth::Caller;
use crate::entities::Tag;
use crate::error::Error;

pub fn new() -> Result<Oso, Error> {
    let mut o = Oso::new();

    o.register_class(Caller::get_polar_class())?;
    o.register_class(Tag::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[cfg(test)]
fn open_tag() -> Tag {
    use crate::entities::{Place, Role, User};
    use chrono::Utc;
    use std::collections::BTreeSet;

    let passenger = User::new("Ayşe", BTreeSet::from([Role::Passenger]), "Adana", Utc::now());
    Tag::new(
        &passenger,
        Place::new("Seyhan", 37.0, 35.0),
        Place::new("Kadıköy", 41.0, 29.0),
        None,
        "Adana".into(),
        Utc::now(),
    )
}

#[test]
fn tag_passenger_role_test() {
    let authorizor = new().unwrap();
    let tag = open_tag();
    let passenger = Caller::new(tag.passenger_id);

    let result = authorizor.query_rule("has_role", (passenger, "passenger", tag.clone()));
    assert!(result.unwrap().next().unwrap().is_ok());

    for action in [
        "read",
        "cancel",
        "update_destination",
        "list_offers",
        "accept_offer",
        "emergency",
    ] {
        let result = authorizor.is_allowed(passenger, action, tag.clone());
        assert_eq!(result.unwrap(), true, "{}", action);
    }

    let result = authorizor.is_allowed(passenger, "start", tag.clone());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn tag_driver_role_test() {
    use uuid::Uuid;

    let authorizor = new().unwrap();
    let mut tag = open_tag();
    let driver = Caller::new(Uuid::new_v4());

    // before the driver is matched

    let result = authorizor.query_rule("has_role", (driver, "driver", tag.clone()));
    assert!(result.unwrap().next().is_none());

    let result = authorizor.is_allowed(driver, "read", tag.clone());
    assert_eq!(result.unwrap(), false);

    tag.driver_id = Some(driver.id);

    // after the driver is matched

    let result = authorizor.query_rule("has_role", (driver, "driver", tag.clone()));
    assert!(result.unwrap().next().unwrap().is_ok());

    for action in ["read", "start", "end", "emergency"] {
        let result = authorizor.is_allowed(driver, action, tag.clone());
        assert_eq!(result.unwrap(), true, "{}", action);
    }

    for action in ["cancel", "accept_offer", "update_destination"] {
        let result = authorizor.is_allowed(driver, action, tag.clone());
        assert_eq!(result.unwrap(), false, "{}", action);
    }
}

#[test]
fn strangers_have_no_access() {
    use uuid::Uuid;

    let authorizor = new().unwrap();
    let stranger = Caller::new(Uuid::new_v4());

    for action in ["read", "emergency"] {
        let result = authorizor.is_allowed(stranger, action, open_tag());
        assert_eq!(result.unwrap(), false, "{}", action);
    }
}
