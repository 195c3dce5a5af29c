pub mod models;
pub mod money;
pub mod pii;

pub use models::booking::{Booking, BookingStatus, PaymentStatus, PaymentTransitionError};
pub use models::trip::{
    Departure, DistanceProvenance, FlexSlot, LuggageSize, RepricingRecord, TalkPreference, Trip, TripKind,
    TripPreferences, TripStatus, Waypoint,
};
pub use models::user::User;
pub use pii::Masked;
