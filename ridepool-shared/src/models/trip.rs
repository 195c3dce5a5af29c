use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripKind {
    /// A driver offering seats.
    DriverOffer,
    /// A passenger looking for a ride.
    PassengerRequest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Draft,
    Published,
    Cancelled,
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Draft => "DRAFT",
            TripStatus::Published => "PUBLISHED",
            TripStatus::Cancelled => "CANCELLED",
            TripStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(TripStatus::Draft),
            "PUBLISHED" => Some(TripStatus::Published),
            "CANCELLED" => Some(TripStatus::Cancelled),
            "COMPLETED" => Some(TripStatus::Completed),
            _ => None,
        }
    }
}

impl TripKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripKind::DriverOffer => "DRIVER_OFFER",
            TripKind::PassengerRequest => "PASSENGER_REQUEST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRIVER_OFFER" => Some(TripKind::DriverOffer),
            "PASSENGER_REQUEST" => Some(TripKind::PassengerRequest),
            _ => None,
        }
    }
}

/// A named place with coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    pub name: String,
    pub zip: String,
    pub canton: String,
    pub lat: f64,
    pub lon: f64,
}

impl Waypoint {
    pub fn label(&self) -> String {
        format!("{} {} ({})", self.zip, self.name, self.canton)
    }
}

/// Coarse departure window used instead of an exact clock time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlexSlot {
    Morning,
    Afternoon,
    Evening,
    ToBeDetermined,
}

impl FlexSlot {
    /// Hour stored on the departure instant for this window.
    pub fn representative_hour(&self) -> u32 {
        match self {
            FlexSlot::Morning => 9,
            FlexSlot::Afternoon => 14,
            FlexSlot::Evening => 20,
            FlexSlot::ToBeDetermined => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlexSlot::Morning => "morning",
            FlexSlot::Afternoon => "afternoon",
            FlexSlot::Evening => "evening",
            FlexSlot::ToBeDetermined => "tbd",
        }
    }

    pub fn all() -> [FlexSlot; 4] {
        [FlexSlot::Morning, FlexSlot::Afternoon, FlexSlot::Evening, FlexSlot::ToBeDetermined]
    }
}

impl FromStr for FlexSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(FlexSlot::Morning),
            "afternoon" => Ok(FlexSlot::Afternoon),
            "evening" => Ok(FlexSlot::Evening),
            "tbd" => Ok(FlexSlot::ToBeDetermined),
            other => Err(format!("unknown flex slot '{}'", other)),
        }
    }
}

impl fmt::Display for FlexSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When the trip leaves. Local civil time; `flex` marks a coarse window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Departure {
    pub at: NaiveDateTime,
    pub flex: Option<FlexSlot>,
}

impl Departure {
    pub fn exact(at: NaiveDateTime) -> Self {
        Self { at, flex: None }
    }

    pub fn flexible(date: chrono::NaiveDate, slot: FlexSlot) -> Option<Self> {
        let at = date.and_hms_opt(slot.representative_hour(), 0, 0)?;
        Some(Self { at, flex: Some(slot) })
    }

    /// A flex window is still open for the whole of its day.
    pub fn is_past(&self, now: NaiveDateTime) -> bool {
        match self.flex {
            Some(_) => self.at.date() < now.date(),
            None => self.at < now,
        }
    }

    pub fn describe(&self) -> String {
        match self.flex {
            Some(slot) => format!("{} ({})", self.at.format("%d.%m.%Y"), slot),
            None => format!("{} {:02}:{:02}", self.at.format("%d.%m.%Y"), self.at.hour(), self.at.minute()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LuggageSize {
    None,
    #[default]
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TalkPreference {
    Quiet,
    #[default]
    Some,
    Chatty,
}

impl LuggageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            LuggageSize::None => "none",
            LuggageSize::Small => "small",
            LuggageSize::Medium => "medium",
            LuggageSize::Large => "large",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(LuggageSize::None),
            "small" => Some(LuggageSize::Small),
            "medium" => Some(LuggageSize::Medium),
            "large" => Some(LuggageSize::Large),
            _ => None,
        }
    }
}

impl TalkPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            TalkPreference::Quiet => "quiet",
            TalkPreference::Some => "some",
            TalkPreference::Chatty => "chatty",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quiet" => Some(TalkPreference::Quiet),
            "some" => Some(TalkPreference::Some),
            "chatty" => Some(TalkPreference::Chatty),
            _ => None,
        }
    }
}

/// Travel preferences attached to a trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TripPreferences {
    pub smoking: bool,
    pub pets: bool,
    pub women_only: bool,
    pub instant_booking: bool,
    pub luggage: LuggageSize,
    pub talk: TalkPreference,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistanceProvenance {
    Routed,
    #[default]
    GreatCircle,
}

impl DistanceProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceProvenance::Routed => "ROUTED",
            DistanceProvenance::GreatCircle => "GREAT_CIRCLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ROUTED" => Some(DistanceProvenance::Routed),
            "GREAT_CIRCLE" => Some(DistanceProvenance::GreatCircle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub kind: TripKind,
    pub owner_id: Uuid,
    pub origin: Waypoint,
    pub destination: Waypoint,
    pub departure: Departure,
    pub seats_total: i32,
    pub seats_available: i32,
    /// Current per-seat price. Changes only through repricing.
    pub price_per_seat_cents: i64,
    /// Price the driver asked for; repricing splits this.
    pub base_price_per_seat_cents: i64,
    pub price_overridden: bool,
    pub currency: String,
    pub distance_km: Option<f64>,
    pub distance_provenance: Option<DistanceProvenance>,
    pub status: TripStatus,
    pub recurrence_group_id: Option<Uuid>,
    pub preferences: TripPreferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: TripKind,
        owner_id: Uuid,
        origin: Waypoint,
        destination: Waypoint,
        departure: Departure,
        seats_total: i32,
        price_per_seat_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            owner_id,
            origin,
            destination,
            departure,
            seats_total,
            seats_available: seats_total,
            price_per_seat_cents,
            base_price_per_seat_cents: price_per_seat_cents,
            price_overridden: false,
            currency: currency.into(),
            distance_km: None,
            distance_provenance: None,
            status: TripStatus::Draft,
            recurrence_group_id: None,
            preferences: TripPreferences::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_bookable(&self) -> bool {
        self.kind == TripKind::DriverOffer && self.status == TripStatus::Published
    }

    pub fn seats_booked(&self) -> i32 {
        self.seats_total - self.seats_available
    }

    pub fn summary(&self) -> String {
        format!(
            "{} -> {}, {}",
            self.origin.name,
            self.destination.name,
            self.departure.describe()
        )
    }
}

/// Audit row written whenever a trip's per-seat price is recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepricingRecord {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub old_price_cents: i64,
    pub new_price_cents: i64,
    pub booked_seats: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_flexible_departure_uses_slot_hour() {
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let dep = Departure::flexible(date, FlexSlot::Evening).unwrap();
        assert_eq!(dep.at.hour(), 20);
        assert_eq!(dep.describe(), "01.05.2026 (evening)");
        assert_eq!("tbd".parse::<FlexSlot>().unwrap(), FlexSlot::ToBeDetermined);
    }

    #[test]
    fn test_flex_departure_today_is_not_past() {
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let now = date.and_hms_opt(10, 20, 0).unwrap();
        let morning = Departure::flexible(date, FlexSlot::Morning).unwrap();
        assert!(!morning.is_past(now));
        assert!(Departure::exact(morning.at).is_past(now));

        let yesterday = Departure::flexible(date.pred_opt().unwrap(), FlexSlot::Evening).unwrap();
        assert!(yesterday.is_past(now));
    }
}
