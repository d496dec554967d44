use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One registered push endpoint for one subscriber. A row is never
/// updated in place except to clear `active`; credential changes go
/// through unsubscribe + subscribe.
#[derive(Debug, Clone, FromRow)]
pub struct Subscription {
    pub id: i64,
    pub subscriber_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
