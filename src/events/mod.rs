//! Event bus and event names

mod bus;
pub mod names;

pub use bus::{Channel, Event, EventBus, Handler, SubscriptionId};
