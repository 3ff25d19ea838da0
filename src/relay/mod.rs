//! Publish/subscribe hub shared by every mount of one store.
//!
//! A relay owns a table of subscriber callbacks keyed by issued
//! [`SubscriptionId`]s and fans each published value out to all of them.

mod relay;

pub use relay::{Callback, PublishReport, Relay, Subscription, SubscriptionId};
