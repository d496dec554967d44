use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::{
    configuration::{AppState, State},
    error::Error,
    model::{Subscription, Table},
    push::Delivery,
    types::{DeliveryOutcome, DispatchResult, NotificationPayload},
};

/// The slice of the store the dispatcher needs: resolving the target
/// set and pruning endpoints the provider reports gone.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    async fn list_active(
        &self,
        subscriber_id: Option<String>,
    ) -> Result<Vec<Subscription>, Error>;

    async fn deactivate(&self, id: i64) -> Result<(), Error>;
}

#[async_trait]
impl SubscriptionRegistry for Table<Subscription> {
    async fn list_active(
        &self,
        subscriber_id: Option<String>,
    ) -> Result<Vec<Subscription>, Error> {
        Ok(Table::list_active(self, subscriber_id).await?)
    }

    async fn deactivate(&self, id: i64) -> Result<(), Error> {
        Table::deactivate(self, id).await?;
        Ok(())
    }
}

pub async fn send_to_subscriber(
    state: &AppState<State>,
    subscriber_id: &str,
    payload: &NotificationPayload,
) -> Result<DispatchResult, Error> {
    dispatch(
        &state.database.subscription,
        state.push.as_ref(),
        state.push_permits.clone(),
        Some(subscriber_id.to_owned()),
        payload,
    )
    .await
}

pub async fn send_to_all(
    state: &AppState<State>,
    payload: &NotificationPayload,
) -> Result<DispatchResult, Error> {
    dispatch(
        &state.database.subscription,
        state.push.as_ref(),
        state.push_permits.clone(),
        None,
        payload,
    )
    .await
}

/// Best effort, self-healing, no head-of-line blocking: one stale or
/// slow endpoint degrades only its own attempt, and endpoints the
/// provider reports gone are pruned from the registry on the way out.
async fn dispatch<R, D>(
    registry: &R,
    client: Option<&D>,
    permits: Arc<Semaphore>,
    subscriber_id: Option<String>,
    payload: &NotificationPayload,
) -> Result<DispatchResult, Error>
where
    R: SubscriptionRegistry,
    D: Delivery,
{
    let targets = registry.list_active(subscriber_id).await?;

    if targets.is_empty() {
        return Ok(DispatchResult::empty());
    }

    let total = targets.len();

    let Some(client) = client else {
        warn!("push delivery disabled, no VAPID credentials configured");
        return Ok(DispatchResult {
            success: false,
            sent: 0,
            total,
        });
    };

    let outcomes = fan_out(client, &targets, payload, permits).await;
    let (result, expired) = aggregate(&outcomes, total);

    // pruning is best effort; a store failure here is logged, never
    // surfaced, and does not change the reported counts
    for id in expired {
        if let Err(e) = registry.deactivate(id).await {
            error!("Failed to prune subscription {}: {}", id, e);
        }
    }

    Ok(result)
}

/// Delivers to every target concurrently, bounded by the permit pool,
/// and waits for the whole batch. Attempts are independent; outcomes
/// may complete in any order.
async fn fan_out<D: Delivery>(
    client: &D,
    targets: &[Subscription],
    payload: &NotificationPayload,
    permits: Arc<Semaphore>,
) -> Vec<DeliveryOutcome> {
    join_all(targets.iter().map(|subscription| {
        let permits = permits.clone();
        async move {
            let _permit = match permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return DeliveryOutcome::TransientFailure {
                        subscription_id: subscription.id,
                        reason: String::from("delivery permit pool closed"),
                    };
                },
            };
            client.deliver(subscription, payload).await
        }
    }))
    .await
}

fn aggregate(
    outcomes: &[DeliveryOutcome],
    total: usize,
) -> (DispatchResult, Vec<i64>) {
    let mut sent = 0;
    let mut expired = Vec::new();

    for outcome in outcomes {
        match outcome {
            DeliveryOutcome::Delivered { .. } => sent += 1,
            DeliveryOutcome::TransientFailure {
                subscription_id,
                reason,
            } => {
                debug!(
                    "Delivery to subscription {} failed: {}",
                    subscription_id, reason
                );
            },
            DeliveryOutcome::PermanentFailure {
                subscription_id,
                status,
            } => {
                info!(
                    "Subscription {} expired (status {})",
                    subscription_id, status
                );
                expired.push(*subscription_id);
            },
        }
    }

    (
        DispatchResult {
            success: sent > 0,
            sent,
            total,
        },
        expired,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::classify_status;
    use chrono::Utc;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    fn subscription_for(id: i64, subscriber_id: &str) -> Subscription {
        Subscription {
            id,
            subscriber_id: subscriber_id.to_owned(),
            endpoint: format!("https://push.example.com/ep/{}", id),
            p256dh: String::from("BNc1ZG5t"),
            auth: String::from("8u7aPs1q"),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn subscription(id: i64) -> Subscription {
        subscription_for(id, &format!("user-{}", id))
    }

    fn payload() -> NotificationPayload {
        NotificationPayload::new(
            String::from("Report ready"),
            String::from("Your weekly report was approved"),
            HashMap::new(),
        )
        .unwrap()
    }

    /// Returns a scripted provider status per subscription id and
    /// tracks how many deliveries run at once.
    struct ScriptedDelivery {
        statuses: HashMap<i64, u16>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl ScriptedDelivery {
        fn new(statuses: &[(i64, u16)]) -> ScriptedDelivery {
            ScriptedDelivery {
                statuses: statuses.iter().copied().collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Delivery for ScriptedDelivery {
        async fn deliver(
            &self,
            subscription: &Subscription,
            _payload: &NotificationPayload,
        ) -> DeliveryOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let status =
                *self.statuses.get(&subscription.id).unwrap_or(&201);
            classify_status(subscription.id, status)
        }
    }

    /// In-memory registry so dispatch runs end to end without Postgres.
    struct MemoryRegistry {
        rows: Mutex<Vec<Subscription>>,
        fail_deactivate: bool,
    }

    impl MemoryRegistry {
        fn new(rows: Vec<Subscription>) -> MemoryRegistry {
            MemoryRegistry {
                rows: Mutex::new(rows),
                fail_deactivate: false,
            }
        }

        fn active_ids(&self) -> Vec<i64> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .filter(|row| row.active)
                .map(|row| row.id)
                .collect()
        }
    }

    #[async_trait]
    impl SubscriptionRegistry for MemoryRegistry {
        async fn list_active(
            &self,
            subscriber_id: Option<String>,
        ) -> Result<Vec<Subscription>, Error> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|row| row.active)
                .filter(|row| match &subscriber_id {
                    Some(id) => &row.subscriber_id == id,
                    None => true,
                })
                .cloned()
                .collect())
        }

        async fn deactivate(&self, id: i64) -> Result<(), Error> {
            if self.fail_deactivate {
                return Err(sqlx::Error::PoolClosed.into());
            }
            for row in self.rows.lock().unwrap().iter_mut() {
                if row.id == id {
                    row.active = false;
                }
            }
            Ok(())
        }
    }

    fn permits(count: usize) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(count))
    }

    #[tokio::test]
    async fn expired_endpoint_is_pruned_from_the_registry() {
        // one subscriber, two endpoints, the provider reports one gone
        let registry = MemoryRegistry::new(vec![
            subscription_for(1, "user-a"),
            subscription_for(2, "user-a"),
        ]);
        let client = ScriptedDelivery::new(&[(1, 201), (2, 410)]);

        let result = dispatch(
            &registry,
            Some(&client),
            permits(4),
            Some(String::from("user-a")),
            &payload(),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            DispatchResult {
                success: true,
                sent: 1,
                total: 2
            }
        );
        assert_eq!(registry.active_ids(), vec![1]);

        // the pruned endpoint no longer resolves as a target
        let remaining = registry
            .list_active(Some(String::from("user-a")))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, 1);
    }

    #[tokio::test]
    async fn transient_failure_leaves_the_registry_unchanged() {
        let registry =
            MemoryRegistry::new(vec![subscription_for(1, "user-a")]);
        let client = ScriptedDelivery::new(&[(1, 503)]);

        let result = dispatch(
            &registry,
            Some(&client),
            permits(4),
            Some(String::from("user-a")),
            &payload(),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            DispatchResult {
                success: false,
                sent: 0,
                total: 1
            }
        );
        assert_eq!(registry.active_ids(), vec![1]);
    }

    #[tokio::test]
    async fn empty_target_set_never_reaches_the_client() {
        let registry =
            MemoryRegistry::new(vec![subscription_for(1, "user-a")]);
        let client = ScriptedDelivery::new(&[]);

        let result = dispatch(
            &registry,
            Some(&client),
            permits(4),
            Some(String::from("user-b")),
            &payload(),
        )
        .await
        .unwrap();

        assert_eq!(result, DispatchResult::empty());
        assert_eq!(client.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        // 5 endpoints across 3 subscribers, none failing
        let registry = MemoryRegistry::new(vec![
            subscription_for(1, "user-a"),
            subscription_for(2, "user-a"),
            subscription_for(3, "user-b"),
            subscription_for(4, "user-c"),
            subscription_for(5, "user-c"),
        ]);
        let client = ScriptedDelivery::new(&[]);

        let result =
            dispatch(&registry, Some(&client), permits(8), None, &payload())
                .await
                .unwrap();

        assert_eq!(
            result,
            DispatchResult {
                success: true,
                sent: 5,
                total: 5
            }
        );
        assert_eq!(registry.active_ids(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn missing_credentials_disable_delivery_only() {
        let registry = MemoryRegistry::new(vec![
            subscription_for(1, "user-a"),
            subscription_for(2, "user-a"),
        ]);

        let result = dispatch(
            &registry,
            None::<&ScriptedDelivery>,
            permits(4),
            Some(String::from("user-a")),
            &payload(),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            DispatchResult {
                success: false,
                sent: 0,
                total: 2
            }
        );
        assert_eq!(registry.active_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn prune_failure_does_not_change_the_result() {
        let mut registry =
            MemoryRegistry::new(vec![subscription_for(1, "user-a")]);
        registry.fail_deactivate = true;
        let client = ScriptedDelivery::new(&[(1, 410)]);

        let result = dispatch(
            &registry,
            Some(&client),
            permits(4),
            Some(String::from("user-a")),
            &payload(),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            DispatchResult {
                success: false,
                sent: 0,
                total: 1
            }
        );
    }

    #[tokio::test]
    async fn partial_failure_does_not_block_siblings() {
        let client = ScriptedDelivery::new(&[
            (1, 201),
            (2, 410),
            (3, 500),
            (4, 201),
            (5, 404),
        ]);
        let targets: Vec<Subscription> = (1..=5).map(subscription).collect();

        let outcomes =
            fan_out(&client, &targets, &payload(), permits(8)).await;
        let (result, expired) = aggregate(&outcomes, targets.len());

        assert_eq!(client.attempts.load(Ordering::SeqCst), 5);
        assert_eq!(
            result,
            DispatchResult {
                success: true,
                sent: 2,
                total: 5
            }
        );

        let mut expired = expired;
        expired.sort_unstable();
        assert_eq!(expired, vec![2, 5]);
    }

    #[tokio::test]
    async fn fan_out_respects_permit_bound() {
        let client = ScriptedDelivery::new(&[]);
        let targets: Vec<Subscription> = (1..=6).map(subscription).collect();

        let outcomes =
            fan_out(&client, &targets, &payload(), permits(2)).await;

        assert_eq!(outcomes.len(), 6);
        assert!(client.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn all_failed_is_reported_not_raised() {
        let client = ScriptedDelivery::new(&[(1, 503), (2, 410)]);
        let targets: Vec<Subscription> = (1..=2).map(subscription).collect();

        let outcomes =
            fan_out(&client, &targets, &payload(), permits(4)).await;
        let (result, expired) = aggregate(&outcomes, targets.len());

        assert_eq!(
            result,
            DispatchResult {
                success: false,
                sent: 0,
                total: 2
            }
        );
        assert_eq!(expired, vec![2]);
    }

    #[test]
    fn aggregate_of_nothing_is_the_empty_result() {
        let (result, expired) = aggregate(&[], 0);
        assert_eq!(result, DispatchResult::empty());
        assert!(expired.is_empty());
    }
}
