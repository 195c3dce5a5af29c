pub mod gazetteer;
pub mod geo;
pub mod inventory;
pub mod pricing;
pub mod repricing;

pub use gazetteer::Gazetteer;
pub use geo::{RouteDistance, RouteResolver, ResolverConfig};
pub use inventory::{ReservationToken, SeatInventory};
pub use pricing::{PriceTier, PricingConfig, PricingEngine, PricingError};
pub use repricing::{paying_passengers, NoRepricing, RefundInstruction, RepricingPolicy, SplitCostPolicy};
