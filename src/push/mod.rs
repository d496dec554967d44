mod client;
mod dispatch;

pub use client::{classify_status, Delivery, PushClient};
pub use dispatch::{send_to_all, send_to_subscriber, SubscriptionRegistry};
