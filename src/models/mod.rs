//! Domain records for the dispatch pipeline.

pub mod app;
pub mod connection;
pub mod delivery;
pub mod occurrence;

pub use app::App;
pub use connection::{Connection, WILDCARD_SIGNAL};
pub use delivery::{Delivery, DeliveryStatus, OutcomeRecord, RequestRecord};
pub use occurrence::Occurrence;
