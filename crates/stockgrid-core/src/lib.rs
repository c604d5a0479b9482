//! Core systems for stockgrid.
//!
//! This crate provides the event hub that decouples the widgets of the
//! stock-management grid (tables, toolbars, counters, export buttons):
//!
//! - **Event Hub**: A typed publish/subscribe registry with wildcard handlers
//! - **Subscriptions**: Opaque ids and RAII guards for deregistration
//! - **Logging**: `tracing` targets and a registry debug dump
//!
//! # Example
//!
//! ```
//! use stockgrid_core::{EventHub, HubEvent, Topic};
//!
//! #[derive(Debug)]
//! struct Refresh;
//!
//! impl HubEvent for Refresh {
//!     type Kind = ();
//!     fn kind(&self) {}
//! }
//!
//! let hub = EventHub::<Refresh>::new();
//! let id = hub.on((), |_| println!("refresh requested"));
//! hub.emit(Refresh);
//! assert_eq!(hub.handler_count(Topic::Event(())), 1);
//! hub.off(id);
//! ```

mod error;
pub mod hub;
pub mod logging;

pub use error::{HubError, Result};
pub use hub::{Emission, EventHub, HubEvent, SubscriptionGuard, SubscriptionId, Topic};
pub use logging::HubDebug;
