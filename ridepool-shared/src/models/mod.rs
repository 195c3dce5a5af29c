pub mod booking;
pub mod events;
pub mod trip;
pub mod user;
