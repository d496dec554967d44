mod push;
mod subscription;

pub use push::{
    Claims, DeliveryOutcome, DispatchResult, NotificationPayload, PushHeader,
    Urgency, BODY_MAX_CHARS, TITLE_MAX_CHARS,
};
pub use subscription::{SubscribeRequest, SubscriptionKeys};
