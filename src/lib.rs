//! Webhook signal fan-out engine.
//!
//! When something happens to an object owned by an account, demux notifies
//! every external app subscribed to that kind of signal for that account,
//! delivers the notification over HTTP with a verifiable HMAC-SHA256
//! signature, and records the outcome.
//!
//! The pipeline: a [`Signal`] describes an occurrence; the [`Demuxer`]
//! resolves subscribers through the [`Registry`], enqueues deduplicated
//! deliveries in the [`Ledger`], and transmits everything queued for the
//! occurrence's fingerprint through the [`Transport`]. The dedup invariant
//! (at most one queued delivery per (app, fingerprint) pair) is enforced by
//! the backing [`Store`]'s scoped-uniqueness insert, so redundant trigger
//! calls are cheap and safe.

pub mod config;
pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod models;
pub mod registry;
pub mod signal;
pub mod store;
pub mod transport;
pub mod validation;

pub use config::DemuxConfig;
pub use dispatcher::Demuxer;
pub use error::{DemuxError, DemuxResult};
pub use ledger::{Enqueue, Ledger};
pub use models::{App, Connection, Delivery, DeliveryStatus, Occurrence, WILDCARD_SIGNAL};
pub use registry::Registry;
pub use signal::{Signal, SignalRegistry};
pub use store::{InsertOutcome, MemoryStore, Store};
pub use transport::{Receipt, SignalRequest, Transport};
