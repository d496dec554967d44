use serde::Deserialize;
use url::Url;

use crate::error::Error;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

impl SubscribeRequest {
    pub fn validate(&self) -> Result<(), Error> {
        let url = Url::parse(&self.endpoint).map_err(|_| {
            Error::ValidationError(format!(
                "endpoint is not a valid URL: {}",
                self.endpoint
            ))
        })?;

        if url.host().is_none() {
            return Err(Error::ValidationError(String::from(
                "endpoint URL has no host",
            )));
        }

        if self.keys.p256dh.trim().is_empty() {
            return Err(Error::ValidationError(String::from(
                "p256dh key is required",
            )));
        }

        if self.keys.auth.trim().is_empty() {
            return Err(Error::ValidationError(String::from(
                "auth secret is required",
            )));
        }

        Ok(())
    }
}
