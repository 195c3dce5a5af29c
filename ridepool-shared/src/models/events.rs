use serde::{Deserialize, Serialize};
use uuid::Uuid;


#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripPublishedEvent {
    pub trip_id: Uuid,
    pub owner_id: Uuid,
    pub recurrence_group_id: Option<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripCancelledEvent {
    pub trip_id: Uuid,
    pub affected_bookings: Vec<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeatsReservedEvent {
    pub trip_id: Uuid,
    pub booking_id: Uuid,
    pub seats: i32,
    pub seats_available: i32,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeatsReleasedEvent {
    pub trip_id: Uuid,
    pub booking_id: Uuid,
    pub seats: i32,
    pub seats_available: i32,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub passenger_id: Uuid,
    pub amount_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub refund_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefundIssuedEvent {
    pub booking_id: Uuid,
    pub refund_id: String,
    pub amount_cents: i64,
    pub timestamp: i64,
}

/// Raised when a refund could not be issued and needs operator attention.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefundFailedEvent {
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TripRepricedEvent {
    pub trip_id: Uuid,
    pub old_price_cents: i64,
    pub new_price_cents: i64,
    pub booked_seats: i32,
    pub timestamp: i64,
}

/// Every event the engine emits, tagged for the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    TripPublished(TripPublishedEvent),
    TripCancelled(TripCancelledEvent),
    SeatsReserved(SeatsReservedEvent),
    SeatsReleased(SeatsReleasedEvent),
    BookingConfirmed(BookingConfirmedEvent),
    BookingCancelled(BookingCancelledEvent),
    RefundIssued(RefundIssuedEvent),
    RefundFailed(RefundFailedEvent),
    TripRepriced(TripRepricedEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::TripPublished(_) => "trip.published",
            DomainEvent::TripCancelled(_) => "trip.cancelled",
            DomainEvent::TripRepriced(_) => "trip.repriced",
            DomainEvent::SeatsReserved(_) => "booking.reserved",
            DomainEvent::SeatsReleased(_) => "booking.released",
            DomainEvent::BookingConfirmed(_) => "booking.confirmed",
            DomainEvent::BookingCancelled(_) => "booking.cancelled",
            DomainEvent::RefundIssued(_) => "payment.refunded",
            DomainEvent::RefundFailed(_) => "payment.refund_failed",
        }
    }

    /// Partition key. Events about one trip stay ordered.
    pub fn key(&self) -> String {
        match self {
            DomainEvent::TripPublished(e) => e.trip_id.to_string(),
            DomainEvent::TripCancelled(e) => e.trip_id.to_string(),
            DomainEvent::TripRepriced(e) => e.trip_id.to_string(),
            DomainEvent::SeatsReserved(e) => e.trip_id.to_string(),
            DomainEvent::SeatsReleased(e) => e.trip_id.to_string(),
            DomainEvent::BookingConfirmed(e) => e.trip_id.to_string(),
            DomainEvent::BookingCancelled(e) => e.trip_id.to_string(),
            DomainEvent::RefundIssued(e) => e.booking_id.to_string(),
            DomainEvent::RefundFailed(e) => e.booking_id.to_string(),
        }
    }
}
