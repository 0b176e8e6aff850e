//! Smart order routing.
//!
//! Splits an approved trade across venues by fee-adjusted price, rejects
//! plans that breach the slippage bound, and dispatches child orders with
//! bounded per-venue timeouts.

pub mod error;
pub mod paper;
pub mod planner;
pub mod router;
pub mod venue;

pub use error::{RouterError, RouterResult};
pub use paper::PaperVenue;
pub use planner::{plan, Plan, PlannedLeg};
pub use router::{ChildResult, PlannedComposite, RouterConfig, SmartOrderRouter};
pub use venue::{VenueClient, VenueFill, VenueQuote};
