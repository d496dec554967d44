use super::QueryResult;
use crate::model::{Subscription, Table};
use sqlx::error::Error;

impl Table<Subscription> {
    /// Registering the same (subscriber, endpoint) pair again supersedes
    /// the prior record instead of duplicating it; the delete and insert
    /// share one transaction.
    pub async fn register(
        &self,
        subscriber_id: String,
        endpoint: String,
        p256dh: String,
        auth: String,
    ) -> Result<Subscription, Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM subscription WHERE subscriber_id=$1 AND endpoint=$2
            "#,
        )
        .bind(&subscriber_id)
        .bind(&endpoint)
        .execute(&mut *tx)
        .await?;

        let subscription: Subscription = sqlx::query_as(
            r#"
            INSERT INTO subscription (subscriber_id, endpoint, p256dh, auth)
            VALUES($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&subscriber_id)
        .bind(&endpoint)
        .bind(&p256dh)
        .bind(&auth)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(subscription)
    }

    pub async fn unregister_all(
        &self,
        subscriber_id: String,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM subscription WHERE subscriber_id=$1
            "#,
        )
        .bind(subscriber_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Active rows for one subscriber, or for everyone on `None`.
    /// Ordering is unspecified.
    pub async fn list_active(
        &self,
        subscriber_id: Option<String>,
    ) -> Result<Vec<Subscription>, Error> {
        let data = match subscriber_id {
            Some(subscriber_id) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM subscription WHERE active = true AND subscriber_id=$1
                    "#,
                )
                .bind(subscriber_id)
                .fetch_all(&self.pool)
                .await?
            },
            None => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM subscription WHERE active = true
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            },
        };

        Ok(data)
    }

    pub async fn count_active(
        &self,
        subscriber_id: String,
    ) -> Result<i64, Error> {
        let (value,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM subscription WHERE active = true AND subscriber_id=$1
            "#,
        )
        .bind(subscriber_id)
        .persistent(true)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }

    /// Idempotent; a missing or already-inactive id is a no-op.
    pub async fn deactivate(&self, id: i64) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE subscription SET active = false, updated_at = NOW() WHERE id=$1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
    }
}
