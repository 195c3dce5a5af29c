//! One step table for every flow. Role decides which rows apply.

use chrono::Weekday;
use ridepool_shared::{Departure, DistanceProvenance, TripKind, TripPreferences, Waypoint};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Role,
    Options,
    Origin,
    Destination,
    DateTime,
    Recurrence,
    Seats,
    Price,
    SeatsNeeded,
    Preferences,
    Confirm,
    BookingSeats,
    Done,
    Cancelled,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Role => "role",
            StepId::Options => "options",
            StepId::Origin => "origin",
            StepId::Destination => "destination",
            StepId::DateTime => "datetime",
            StepId::Recurrence => "recurrence",
            StepId::Seats => "seats",
            StepId::Price => "price",
            StepId::SeatsNeeded => "seats_needed",
            StepId::Preferences => "preferences",
            StepId::Confirm => "confirm",
            StepId::BookingSeats => "booking_seats",
            StepId::Done => "done",
            StepId::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepId::Done | StepId::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Trip,
    Booking,
}

/// Answers collected while building a trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripDraft {
    pub kind: Option<TripKind>,
    pub recurring: bool,
    pub origin: Option<Waypoint>,
    pub destination: Option<Waypoint>,
    /// Pending pick list for the current waypoint step.
    pub candidates: Vec<Waypoint>,
    pub departure: Option<Departure>,
    pub weekdays: Vec<Weekday>,
    pub seats: Option<i32>,
    pub distance_km: Option<f64>,
    pub distance_provenance: Option<DistanceProvenance>,
    pub suggested_price_cents: Option<i64>,
    pub price_per_seat_cents: Option<i64>,
    pub price_overridden: bool,
    pub preferences: TripPreferences,
}

impl TripDraft {
    pub fn is_driver(&self) -> bool {
        self.kind == Some(TripKind::DriverOffer)
    }

    pub fn is_passenger(&self) -> bool {
        self.kind == Some(TripKind::PassengerRequest)
    }

    pub fn toggle_weekday(&mut self, day: Weekday) {
        if let Some(pos) = self.weekdays.iter().position(|d| *d == day) {
            self.weekdays.remove(pos);
        } else {
            self.weekdays.push(day);
        }
    }
}

/// Answers collected while booking an existing trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub trip_id: Uuid,
    pub summary: String,
    pub seats_available: i32,
    pub price_per_seat_cents: i64,
    pub currency: String,
    pub seats: Option<i32>,
}

impl BookingDraft {
    pub fn amount_cents(&self) -> Option<i64> {
        self.seats.map(|s| s as i64 * self.price_per_seat_cents)
    }
}

pub struct StepDef {
    pub id: StepId,
    applies: fn(&TripDraft) -> bool,
}

impl StepDef {
    pub fn applies(&self, draft: &TripDraft) -> bool {
        (self.applies)(draft)
    }
}

fn always(_: &TripDraft) -> bool {
    true
}

fn recurring(d: &TripDraft) -> bool {
    d.recurring
}

fn driver(d: &TripDraft) -> bool {
    d.is_driver()
}

fn passenger(d: &TripDraft) -> bool {
    d.is_passenger()
}

const TRIP_STEPS: &[StepDef] = &[
    StepDef { id: StepId::Role, applies: always },
    StepDef { id: StepId::Options, applies: always },
    StepDef { id: StepId::Origin, applies: always },
    StepDef { id: StepId::Destination, applies: always },
    StepDef { id: StepId::DateTime, applies: always },
    StepDef { id: StepId::Recurrence, applies: recurring },
    StepDef { id: StepId::Seats, applies: driver },
    StepDef { id: StepId::Price, applies: driver },
    StepDef { id: StepId::SeatsNeeded, applies: passenger },
    StepDef { id: StepId::Preferences, applies: always },
    StepDef { id: StepId::Confirm, applies: always },
];

const BOOKING_STEPS: &[StepDef] = &[
    StepDef { id: StepId::BookingSeats, applies: always },
    StepDef { id: StepId::Confirm, applies: always },
];

pub fn table(flow: Flow) -> &'static [StepDef] {
    match flow {
        Flow::Trip => TRIP_STEPS,
        Flow::Booking => BOOKING_STEPS,
    }
}

pub fn first_step(flow: Flow) -> StepId {
    table(flow).first().map(|s| s.id).unwrap_or(StepId::Done)
}

/// The applicable step after `current`, or `Confirm` when `current` is unknown.
pub fn next_step(flow: Flow, current: StepId, draft: &TripDraft) -> StepId {
    let steps = table(flow);
    match steps.iter().position(|s| s.id == current) {
        Some(pos) => steps[pos + 1..]
            .iter()
            .find(|s| s.applies(draft))
            .map(|s| s.id)
            .unwrap_or(StepId::Done),
        None => StepId::Confirm,
    }
}

/// The applicable step before `current`; the first step has none.
pub fn previous_step(flow: Flow, current: StepId, draft: &TripDraft) -> Option<StepId> {
    let steps = table(flow);
    let pos = steps.iter().position(|s| s.id == current)?;
    steps[..pos].iter().rev().find(|s| s.applies(draft)).map(|s| s.id)
}

/// Ordered list of the steps `draft` will visit.
pub fn path(flow: Flow, draft: &TripDraft) -> Vec<StepId> {
    table(flow).iter().filter(|s| s.applies(draft)).map(|s| s.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(kind: TripKind, recurring: bool) -> TripDraft {
        TripDraft {
            kind: Some(kind),
            recurring,
            ..Default::default()
        }
    }

    #[test]
    fn test_driver_path() {
        assert_eq!(
            path(Flow::Trip, &draft(TripKind::DriverOffer, false)),
            vec![
                StepId::Role,
                StepId::Options,
                StepId::Origin,
                StepId::Destination,
                StepId::DateTime,
                StepId::Seats,
                StepId::Price,
                StepId::Preferences,
                StepId::Confirm
            ]
        );
    }

    #[test]
    fn test_recurring_passenger_path() {
        assert_eq!(
            path(Flow::Trip, &draft(TripKind::PassengerRequest, true)),
            vec![
                StepId::Role,
                StepId::Options,
                StepId::Origin,
                StepId::Destination,
                StepId::DateTime,
                StepId::Recurrence,
                StepId::SeatsNeeded,
                StepId::Preferences,
                StepId::Confirm
            ]
        );
    }

    #[test]
    fn test_navigation_skips_inapplicable_rows() {
        let d = draft(TripKind::DriverOffer, false);
        assert_eq!(next_step(Flow::Trip, StepId::DateTime, &d), StepId::Seats);
        assert_eq!(previous_step(Flow::Trip, StepId::Seats, &d), Some(StepId::DateTime));
        assert_eq!(previous_step(Flow::Trip, StepId::Role, &d), None);
        assert_eq!(next_step(Flow::Trip, StepId::Confirm, &d), StepId::Done);

        let p = draft(TripKind::PassengerRequest, false);
        assert_eq!(next_step(Flow::Trip, StepId::DateTime, &p), StepId::SeatsNeeded);
        assert_eq!(previous_step(Flow::Trip, StepId::Preferences, &p), Some(StepId::SeatsNeeded));
    }

    #[test]
    fn test_booking_flow() {
        assert_eq!(first_step(Flow::Booking), StepId::BookingSeats);
        assert_eq!(
            next_step(Flow::Booking, StepId::BookingSeats, &TripDraft::default()),
            StepId::Confirm
        );
    }

    #[test]
    fn test_weekday_toggle() {
        let mut d = TripDraft::default();
        d.toggle_weekday(Weekday::Mon);
        d.toggle_weekday(Weekday::Wed);
        d.toggle_weekday(Weekday::Mon);
        assert_eq!(d.weekdays, vec![Weekday::Wed]);
    }
}
