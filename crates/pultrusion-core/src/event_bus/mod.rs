//! # Event Bus Module
//!
//! Publish/subscribe distribution of rig events.
//!
//! - The read task publishes decoded telemetry and acknowledgments
//! - Controls publish the outcome of each request
//! - Consumers take a filtered stream for use inside a tokio task
//!
//! ```rust,ignore
//! use pultrusion_core::event_bus::{EventBus, EventCategory, EventFilter};
//!
//! let bus = EventBus::new();
//! let mut device = bus.subscribe(EventFilter::Categories(vec![EventCategory::Device]));
//! while let Some(event) = device.next().await {
//!     println!("{}", event.description());
//! }
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
