use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Coordinates, Offer, Place, Role, User};
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStatus {
    Pending,
    OffersReceived,
    Matched,
    InProgress,
    Completed,
    Cancelled,
}

impl TagStatus {
    pub const OPEN: [TagStatus; 2] = [TagStatus::Pending, TagStatus::OffersReceived];
    pub const ACTIVE: [TagStatus; 2] = [TagStatus::Matched, TagStatus::InProgress];
    pub const NON_TERMINAL: [TagStatus; 4] = [
        TagStatus::Pending,
        TagStatus::OffersReceived,
        TagStatus::Matched,
        TagStatus::InProgress,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::OffersReceived => "offers_received",
            Self::Matched => "matched",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Accepting bids, cancellable by the passenger, destination still editable.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::OffersReceived)
    }

    /// A driver is assigned and the trip can be ended through the dispute protocol.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Matched | Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The authoritative transition table.
    pub fn can_transition_to(&self, next: TagStatus) -> bool {
        use TagStatus::*;

        matches!(
            (self, next),
            (Pending, OffersReceived)
                | (OffersReceived, OffersReceived)
                | (Pending, Matched)
                | (OffersReceived, Matched)
                | (Matched, InProgress)
                | (Matched, Completed)
                | (InProgress, Completed)
                | (Pending, Cancelled)
                | (OffersReceived, Cancelled)
                | (Matched, Cancelled)
                | (InProgress, Cancelled)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum EndReason {
    Cancelled,
    MutualEnd,
    EndRequestRejected { requester_id: Uuid },
    ForceEnded { by: Uuid },
    Timeout,
}

/// A pending request from one participant to end the trip, awaiting the other's answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndRequest {
    pub requester_id: Uuid,
    pub requester_role: Role,
    pub requested_at: DateTime<Utc>,
}

/// Side effects owed to the participants once an active trip ends.
#[derive(Clone, Debug, PartialEq)]
pub struct Settlement {
    pub passenger_id: Uuid,
    pub driver_id: Uuid,
    pub penalized: Option<Uuid>,
    pub penalty: f64,
    pub min_rating: f64,
}

impl Settlement {
    pub fn participants(&self) -> [Uuid; 2] {
        [self.passenger_id, self.driver_id]
    }

    pub fn apply_to(&self, user: &mut User, now: DateTime<Utc>) {
        user.record_trip(now);

        if self.penalized == Some(user.id) {
            user.apply_penalty(self.penalty, self.min_rating, now);
        }
    }
}

/// A ride request from creation to a terminal state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub passenger_name: String,
    pub pickup: Place,
    pub dropoff: Place,
    pub notes: Option<String>,
    pub city: String,
    /// Opaque token behind the public trip-sharing link.
    pub share_token: String,
    pub status: TagStatus,
    pub driver_id: Option<Uuid>,
    pub driver_name: Option<String>,
    pub driver_location: Option<Coordinates>,
    pub accepted_offer_id: Option<Uuid>,
    pub final_price: Option<f64>,
    pub end_request: Option<EndRequest>,
    pub end_reason: Option<EndReason>,
    #[serde(default)]
    pub emergency_shared: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Tag {
    pub fn new(
        passenger: &User,
        pickup: Place,
        dropoff: Place,
        notes: Option<String>,
        city: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            passenger_id: passenger.id,
            passenger_name: passenger.name.clone(),
            pickup,
            dropoff,
            notes,
            city,
            share_token: Uuid::new_v4().simple().to_string(),
            status: TagStatus::Pending,
            driver_id: None,
            driver_name: None,
            driver_location: None,
            accepted_offer_id: None,
            final_price: None,
            end_request: None,
            end_reason: None,
            emergency_shared: false,
            created_at: now,
            updated_at: now,
            matched_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    /// Which side of the trip `user_id` is on, if any.
    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        if self.passenger_id == user_id {
            return Some(Role::Passenger);
        }

        if self.driver_id == Some(user_id) {
            return Some(Role::Driver);
        }

        None
    }

    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.role_of(user_id)? {
            Role::Passenger => self.driver_id,
            Role::Driver => Some(self.passenger_id),
        }
    }

    fn transition(&mut self, next: TagStatus, now: DateTime<Utc>) -> Result<(), Error> {
        if !self.status.can_transition_to(next) {
            return Err(Error::invalid_state(format!(
                "ride request is {} and cannot become {}",
                self.status.name(),
                next.name()
            )));
        }

        self.status = next;
        self.updated_at = now;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(tag_id = %self.id))]
    pub fn receive_offer(&mut self, now: DateTime<Utc>) -> Result<bool, Error> {
        if !self.status.is_open() {
            return Err(Error::invalid_state(
                "this ride request no longer accepts offers",
            ));
        }

        self.transition(TagStatus::OffersReceived, now)?;

        Ok(true)
    }

    pub fn update_destination(&mut self, dropoff: Place, now: DateTime<Utc>) -> Result<bool, Error> {
        if !self.status.is_open() {
            return Err(Error::invalid_state(
                "the destination can only change before a driver is matched",
            ));
        }

        self.dropoff = dropoff;
        self.updated_at = now;

        Ok(true)
    }

    #[tracing::instrument(skip(self, offer), fields(tag_id = %self.id, offer_id = %offer.id))]
    pub fn match_offer(
        &mut self,
        offer: &Offer,
        driver_location: Option<Coordinates>,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        if offer.tag_id != self.id {
            return Err(Error::not_found("offer not found for this ride request"));
        }

        self.transition(TagStatus::Matched, now)?;

        self.driver_id = Some(offer.driver_id);
        self.driver_name = Some(offer.driver_name.clone());
        self.driver_location = driver_location;
        self.accepted_offer_id = Some(offer.id);
        self.final_price = Some(offer.price);
        self.matched_at = Some(now);

        Ok(true)
    }

    #[tracing::instrument(skip(self), fields(tag_id = %self.id))]
    pub fn start(&mut self, driver_id: Uuid, now: DateTime<Utc>) -> Result<bool, Error> {
        if self.driver_id != Some(driver_id) {
            return Err(Error::forbidden("only the assigned driver can start this trip"));
        }

        if self.status == TagStatus::InProgress {
            return Ok(false);
        }

        self.transition(TagStatus::InProgress, now)?;
        self.started_at = Some(now);

        Ok(true)
    }

    /// Cancelling twice is a no-op.
    #[tracing::instrument(skip(self), fields(tag_id = %self.id))]
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<bool, Error> {
        if self.status == TagStatus::Cancelled {
            return Ok(false);
        }

        if !self.status.is_open() {
            return Err(Error::invalid_state(
                "a matched trip has to be ended, not cancelled",
            ));
        }

        self.transition(TagStatus::Cancelled, now)?;
        self.end_reason = Some(EndReason::Cancelled);
        self.cancelled_at = Some(now);

        Ok(true)
    }

    /// Flags the trip for emergency sharing. Raising it again changes nothing.
    #[tracing::instrument(skip(self), fields(tag_id = %self.id))]
    pub fn raise_emergency(&mut self, now: DateTime<Utc>) -> Result<bool, Error> {
        if self.status.is_terminal() {
            return Err(Error::invalid_state("this trip has already ended"));
        }

        if self.emergency_shared {
            return Ok(false);
        }

        self.emergency_shared = true;
        self.updated_at = now;

        Ok(true)
    }

    /// Records an end request from one participant; a newer request replaces an older one.
    #[tracing::instrument(skip(self), fields(tag_id = %self.id))]
    pub fn request_end(
        &mut self,
        requester_id: Uuid,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        if !self.status.is_active() {
            return Err(Error::invalid_state(
                "only matched or in-progress trips can be ended",
            ));
        }

        if self.role_of(requester_id) != Some(role) {
            return Err(Error::forbidden(format!("you are not this trip's {}", role.name())));
        }

        self.end_request = Some(EndRequest {
            requester_id,
            requester_role: role,
            requested_at: now,
        });
        self.updated_at = now;

        Ok(true)
    }

    /// The outstanding end request, shown only to the participant who must answer it.
    pub fn end_request_for(&self, user_id: Uuid) -> Option<&EndRequest> {
        if !self.status.is_active() {
            return None;
        }

        self.end_request
            .as_ref()
            .filter(|request| request.requester_id != user_id && self.role_of(user_id).is_some())
    }

    /// Answers the counterpart's end request. Either answer ends the trip; a rejection
    /// penalizes the requester.
    #[tracing::instrument(skip(self), fields(tag_id = %self.id))]
    pub fn resolve_end_request(
        &mut self,
        responder_id: Uuid,
        approved: bool,
        penalty: f64,
        min_rating: f64,
        now: DateTime<Utc>,
    ) -> Result<Settlement, Error> {
        let request = self
            .end_request_for(responder_id)
            .cloned()
            .ok_or_else(|| Error::not_found("there is no end request waiting for your answer"))?;

        let (reason, penalized) = match approved {
            true => (EndReason::MutualEnd, None),
            false => (
                EndReason::EndRequestRejected {
                    requester_id: request.requester_id,
                },
                Some(request.requester_id),
            ),
        };

        self.finish(reason, now)?;

        self.settlement(penalized, penalty, min_rating)
    }

    /// Unilateral end by one participant, who bears the penalty.
    #[tracing::instrument(skip(self), fields(tag_id = %self.id))]
    pub fn force_end(
        &mut self,
        user_id: Uuid,
        penalty: f64,
        min_rating: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Settlement>, Error> {
        if self.role_of(user_id).is_none() {
            return Err(Error::forbidden("only trip participants can end the trip"));
        }

        if self.status == TagStatus::Completed {
            return Ok(None);
        }

        if !self.status.is_active() {
            return Err(Error::invalid_state(
                "only matched or in-progress trips can be ended",
            ));
        }

        self.finish(EndReason::ForceEnded { by: user_id }, now)?;

        self.settlement(Some(user_id), penalty, min_rating).map(Some)
    }

    fn finish(&mut self, reason: EndReason, now: DateTime<Utc>) -> Result<(), Error> {
        self.transition(TagStatus::Completed, now)?;
        self.end_request = None;
        self.end_reason = Some(reason);
        self.completed_at = Some(now);

        Ok(())
    }

    fn settlement(
        &self,
        penalized: Option<Uuid>,
        penalty: f64,
        min_rating: f64,
    ) -> Result<Settlement, Error> {
        let driver_id = self
            .driver_id
            .ok_or_else(|| Error::invalid_state("trip has no assigned driver"))?;

        Ok(Settlement {
            passenger_id: self.passenger_id,
            driver_id,
            penalized,
            penalty,
            min_rating,
        })
    }

    /// Whether the request has been idle longer than its status allows.
    pub fn is_stale(
        &self,
        now: DateTime<Utc>,
        open_after: Duration,
        active_after: Duration,
    ) -> bool {
        let idle = now - self.updated_at;

        match self.status {
            TagStatus::Pending | TagStatus::OffersReceived => idle > open_after,
            TagStatus::Matched | TagStatus::InProgress => idle > active_after,
            _ => false,
        }
    }

    /// Force-closes a stale request: open ones are cancelled, active ones completed.
    #[tracing::instrument(skip(self), fields(tag_id = %self.id))]
    pub fn expire(
        &mut self,
        now: DateTime<Utc>,
        open_after: Duration,
        active_after: Duration,
    ) -> Result<bool, Error> {
        if !self.is_stale(now, open_after, active_after) {
            return Ok(false);
        }

        if self.status.is_open() {
            self.transition(TagStatus::Cancelled, now)?;
            self.cancelled_at = Some(now);
        } else {
            self.transition(TagStatus::Completed, now)?;
            self.end_request = None;
            self.completed_at = Some(now);
        }

        self.end_reason = Some(EndReason::Timeout);

        Ok(true)
    }
}

#[cfg(test)]
fn passenger() -> User {
    User::new(
        "Ayşe",
        std::collections::BTreeSet::from([Role::Passenger]),
        "Adana",
        Utc::now(),
    )
}

#[cfg(test)]
fn open_tag(passenger: &User) -> Tag {
    Tag::new(
        passenger,
        Place::new("Seyhan", 37.00, 35.00),
        Place::new("Kadıköy", 41.00, 29.00),
        None,
        "Adana".into(),
        Utc::now(),
    )
}

#[cfg(test)]
fn offer_for(tag: &Tag, price: f64) -> Offer {
    Offer::new(
        tag.id,
        Uuid::new_v4(),
        "Mehmet".into(),
        4.8,
        price,
        None,
        Utc::now(),
        Duration::minutes(10),
    )
}

#[cfg(test)]
fn matched_tag() -> (Tag, Uuid) {
    let mut tag = open_tag(&passenger());
    let offer = offer_for(&tag, 850.0);
    tag.receive_offer(Utc::now()).unwrap();
    tag.match_offer(&offer, None, Utc::now()).unwrap();
    (tag, offer.driver_id)
}

#[test]
fn transition_table_only_moves_forward() {
    use TagStatus::*;

    assert!(Pending.can_transition_to(OffersReceived));
    assert!(OffersReceived.can_transition_to(Matched));
    assert!(Matched.can_transition_to(InProgress));
    assert!(Matched.can_transition_to(Completed));
    assert!(InProgress.can_transition_to(Completed));

    assert!(!Matched.can_transition_to(OffersReceived));
    assert!(!Completed.can_transition_to(Cancelled));
    assert!(!Cancelled.can_transition_to(Pending));
    assert!(!InProgress.can_transition_to(Matched));
}

#[test]
fn offers_flip_status_idempotently() {
    let mut tag = open_tag(&passenger());

    tag.receive_offer(Utc::now()).unwrap();
    assert_eq!(tag.status, TagStatus::OffersReceived);

    tag.receive_offer(Utc::now()).unwrap();
    assert_eq!(tag.status, TagStatus::OffersReceived);
}

#[test]
fn matching_copies_offer_terms() {
    let mut tag = open_tag(&passenger());
    let offer = offer_for(&tag, 850.0);

    tag.receive_offer(Utc::now()).unwrap();
    tag.match_offer(&offer, Some(Coordinates::new(37.01, 35.01)), Utc::now())
        .unwrap();

    assert_eq!(tag.status, TagStatus::Matched);
    assert_eq!(tag.driver_id, Some(offer.driver_id));
    assert_eq!(tag.driver_name.as_deref(), Some("Mehmet"));
    assert_eq!(tag.final_price, Some(850.0));
    assert_eq!(tag.accepted_offer_id, Some(offer.id));
    assert!(tag.matched_at.is_some());

    let second = offer_for(&tag, 700.0);
    assert!(tag.match_offer(&second, None, Utc::now()).unwrap_err().is_invalid_state());
}

#[test]
fn destination_is_frozen_after_match() {
    let (mut tag, _) = matched_tag();

    let err = tag
        .update_destination(Place::new("Bornova", 38.46, 27.22), Utc::now())
        .unwrap_err();
    assert!(err.is_invalid_state());
}

#[test]
fn only_the_assigned_driver_starts() {
    let (mut tag, driver_id) = matched_tag();

    assert!(tag.start(Uuid::new_v4(), Utc::now()).unwrap_err().is_forbidden());
    assert!(tag.start(driver_id, Utc::now()).unwrap());
    assert_eq!(tag.status, TagStatus::InProgress);
    assert!(!tag.start(driver_id, Utc::now()).unwrap());
}

#[test]
fn cancel_is_idempotent_but_not_after_match() {
    let mut tag = open_tag(&passenger());

    assert!(tag.cancel(Utc::now()).unwrap());
    assert!(!tag.cancel(Utc::now()).unwrap());
    assert_eq!(tag.end_reason, Some(EndReason::Cancelled));

    let (mut matched, _) = matched_tag();
    assert!(matched.cancel(Utc::now()).unwrap_err().is_invalid_state());
}

#[test]
fn end_request_is_visible_to_the_counterpart_only() {
    let (mut tag, driver_id) = matched_tag();
    let passenger_id = tag.passenger_id;

    tag.request_end(passenger_id, Role::Passenger, Utc::now()).unwrap();

    assert!(tag.end_request_for(passenger_id).is_none());
    assert!(tag.end_request_for(Uuid::new_v4()).is_none());
    assert_eq!(
        tag.end_request_for(driver_id).map(|r| r.requester_id),
        Some(passenger_id)
    );
}

#[test]
fn claiming_the_wrong_role_is_forbidden() {
    let (mut tag, driver_id) = matched_tag();

    let err = tag.request_end(driver_id, Role::Passenger, Utc::now()).unwrap_err();
    assert!(err.is_forbidden());
}

#[test]
fn newer_end_request_supersedes() {
    let (mut tag, driver_id) = matched_tag();
    let passenger_id = tag.passenger_id;

    tag.request_end(passenger_id, Role::Passenger, Utc::now()).unwrap();
    tag.request_end(driver_id, Role::Driver, Utc::now()).unwrap();

    assert_eq!(tag.end_request.as_ref().map(|r| r.requester_id), Some(driver_id));
    assert!(tag.end_request_for(driver_id).is_none());
    assert!(tag.end_request_for(passenger_id).is_some());
}

#[test]
fn rejected_end_request_penalizes_the_requester() {
    let (mut tag, driver_id) = matched_tag();
    let passenger_id = tag.passenger_id;

    tag.request_end(passenger_id, Role::Passenger, Utc::now()).unwrap();
    let settlement = tag
        .resolve_end_request(driver_id, false, 1.0, 1.0, Utc::now())
        .unwrap();

    assert_eq!(tag.status, TagStatus::Completed);
    assert_eq!(settlement.penalized, Some(passenger_id));
    assert!(tag.end_request.is_none());
}

#[test]
fn approved_end_request_has_no_penalty() {
    let (mut tag, driver_id) = matched_tag();

    tag.request_end(driver_id, Role::Driver, Utc::now()).unwrap();
    let passenger_id = tag.passenger_id;
    let settlement = tag
        .resolve_end_request(passenger_id, true, 1.0, 1.0, Utc::now())
        .unwrap();

    assert_eq!(settlement.penalized, None);
    assert_eq!(tag.end_reason, Some(EndReason::MutualEnd));
}

#[test]
fn requester_cannot_answer_their_own_request() {
    let (mut tag, driver_id) = matched_tag();

    tag.request_end(driver_id, Role::Driver, Utc::now()).unwrap();
    let err = tag
        .resolve_end_request(driver_id, true, 1.0, 1.0, Utc::now())
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn force_end_twice_settles_once() {
    let (mut tag, driver_id) = matched_tag();

    let settlement = tag.force_end(driver_id, 1.0, 1.0, Utc::now()).unwrap();
    assert_eq!(settlement.map(|s| s.penalized), Some(Some(driver_id)));

    assert!(tag.force_end(driver_id, 1.0, 1.0, Utc::now()).unwrap().is_none());
    assert!(tag
        .force_end(Uuid::new_v4(), 1.0, 1.0, Utc::now())
        .unwrap_err()
        .is_forbidden());
}

#[test]
fn stale_requests_expire_by_status() {
    let mut open = open_tag(&passenger());
    let later = open.updated_at + Duration::minutes(31);

    assert!(!open
        .expire(open.updated_at + Duration::minutes(5), Duration::minutes(30), Duration::minutes(120))
        .unwrap());
    assert!(open.expire(later, Duration::minutes(30), Duration::minutes(120)).unwrap());
    assert_eq!(open.status, TagStatus::Cancelled);
    assert_eq!(open.end_reason, Some(EndReason::Timeout));

    let (mut active, _) = matched_tag();
    let much_later = active.updated_at + Duration::minutes(121);
    assert!(active
        .expire(much_later, Duration::minutes(30), Duration::minutes(120))
        .unwrap());
    assert_eq!(active.status, TagStatus::Completed);
}

#[test]
fn emergency_is_raised_once_and_only_on_live_trips() {
    let (mut tag, _) = matched_tag();

    assert!(!tag.emergency_shared);
    assert!(tag.raise_emergency(Utc::now()).unwrap());
    assert!(tag.emergency_shared);
    assert!(!tag.raise_emergency(Utc::now()).unwrap());

    let mut cancelled = open_tag(&passenger());
    cancelled.cancel(Utc::now()).unwrap();
    assert!(cancelled.raise_emergency(Utc::now()).unwrap_err().is_invalid_state());
}

#[test]
fn every_request_gets_its_own_share_token() {
    let passenger = passenger();

    let a = open_tag(&passenger);
    let b = open_tag(&passenger);

    assert_eq!(a.share_token.len(), 32);
    assert_ne!(a.share_token, b.share_token);
}
