use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Url,
};

use crate::{
    error::Error,
    model::Subscription,
    types::{Claims, DeliveryOutcome, NotificationPayload, PushHeader},
};

const USER_AGENT: &str = "notifier";

/// Seam between the dispatcher and the wire; lets tests drive the
/// fan-out with scripted outcomes.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(
        &self,
        subscription: &Subscription,
        payload: &NotificationPayload,
    ) -> DeliveryOutcome;
}

/// Web Push delivery client. Provider credentials are constructor
/// parameters; there is no process-wide configuration to mutate.
#[derive(Debug)]
pub struct PushClient {
    http: Client,
    vapid_private_key: Vec<u8>,
    vapid_public_key: String,
    contact: String,
    header: PushHeader,
}

impl PushClient {
    pub fn new(
        vapid_private_key: Vec<u8>,
        vapid_public_key: String,
        contact: String,
        header: PushHeader,
        timeout: u64,
    ) -> Result<PushClient, Error> {
        // reject unusable key material at startup, not on first send
        EncodingKey::from_ec_pem(&vapid_private_key)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(PushClient {
            http,
            vapid_private_key,
            vapid_public_key,
            contact,
            header,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.vapid_public_key
    }

    fn vapid_token(&self, endpoint: &Url) -> Result<String, Error> {
        let host = match endpoint.host() {
            Some(host) => host.to_string(),
            None => {
                return Err(Error::ValidationError(String::from(
                    "endpoint URL has no host",
                )));
            },
        };

        let aud = format!("{}://{}", endpoint.scheme(), host);
        let sub = format!("mailto:{}", &self.contact);
        let exp = Utc::now().timestamp() + self.header.ttl;

        let key = EncodingKey::from_ec_pem(&self.vapid_private_key)?;
        let claims = Claims { aud, sub, exp };

        Ok(encode(&Header::new(Algorithm::ES256), &claims, &key)?)
    }

    fn push_headers(&self, token: &str) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        let bearer = format!("WebPush {}", token);

        header_map.insert(
            HeaderName::from_str("user-agent")?,
            HeaderValue::from_str(USER_AGENT)?,
        );
        header_map.insert(
            HeaderName::from_str("authorization")?,
            HeaderValue::from_str(bearer.as_str())?,
        );
        header_map.insert(
            HeaderName::from_str("content-encoding")?,
            HeaderValue::from_str("aes128gcm")?,
        );
        header_map.insert(
            HeaderName::from_str("ttl")?,
            HeaderValue::from_str(&self.header.ttl.to_string())?,
        );
        header_map.insert(
            HeaderName::from_str("urgency")?,
            HeaderValue::from_str(&self.header.urgency.to_string())?,
        );

        let crypto_key_value =
            format!("p256ecdsa={}", self.vapid_public_key.trim());
        header_map.insert(
            HeaderName::from_static("crypto-key"),
            HeaderValue::from_str(&crypto_key_value)?,
        );

        Ok(header_map)
    }

    async fn post_push(
        &self,
        subscription: &Subscription,
        payload: &NotificationPayload,
    ) -> Result<u16, Error> {
        let url = Url::parse(&subscription.endpoint)?;
        let token = self.vapid_token(&url)?;
        let headers = self.push_headers(&token)?;

        let p256dh = BASE64_URL.decode(&subscription.p256dh)?;
        let auth = BASE64_URL.decode(&subscription.auth)?;
        let data = ece::encrypt(&p256dh, &auth, &payload.to_wire()?)?;

        let response = self
            .http
            .post(url)
            .headers(headers)
            .body(data)
            .send()
            .await?;

        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl Delivery for PushClient {
    async fn deliver(
        &self,
        subscription: &Subscription,
        payload: &NotificationPayload,
    ) -> DeliveryOutcome {
        match self.post_push(subscription, payload).await {
            Ok(status) => classify_status(subscription.id, status),
            // timeouts, connection failures and local encoding errors all
            // count as transient; they never prune the subscription
            Err(e) => DeliveryOutcome::TransientFailure {
                subscription_id: subscription.id,
                reason: e.to_string(),
            },
        }
    }
}

/// 2xx delivered; 404/410 mean the endpoint is gone and are the only
/// statuses that mark a subscription permanently invalid.
pub fn classify_status(subscription_id: i64, status: u16) -> DeliveryOutcome {
    match status {
        200..=299 => DeliveryOutcome::Delivered { subscription_id },
        404 | 410 => DeliveryOutcome::PermanentFailure {
            subscription_id,
            status,
        },
        _ => DeliveryOutcome::TransientFailure {
            subscription_id,
            reason: format!("provider returned status {}", status),
        },
    }
}
