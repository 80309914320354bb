use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub tag_id: Uuid,
    pub rater_id: Uuid,
    pub rated_user_id: Uuid,
    pub score: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(
        tag_id: Uuid,
        rater_id: Uuid,
        rated_user_id: Uuid,
        score: u8,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        if !(1..=5).contains(&score) {
            return Err(Error::invalid_argument("score must be between 1 and 5"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            tag_id,
            rater_id,
            rated_user_id,
            score,
            comment,
            created_at: now,
        })
    }
}

#[test]
fn scores_outside_one_to_five_are_rejected() {
    let ids = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    for score in [0u8, 6] {
        let err = Rating::new(ids.0, ids.1, ids.2, score, None, Utc::now()).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    assert!(Rating::new(ids.0, ids.1, ids.2, 5, None, Utc::now()).is_ok());
}
