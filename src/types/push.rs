//! Push notification types
//!
//! Payload validation, wire formatting, delivery outcomes and the
//! aggregate result reported by the send endpoints.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, io, str::FromStr};

use crate::error::Error;

pub const TITLE_MAX_CHARS: usize = 100;
pub const BODY_MAX_CHARS: usize = 300;

const ICON_PATH: &str = "/icons/icon-192x192.png";
const BADGE_PATH: &str = "/icons/badge-72x72.png";

// =============================================================================
// Push Message Types
// =============================================================================

#[derive(Debug, Clone)]
pub struct PushHeader {
    pub ttl: i64,
    pub urgency: Urgency,
}

/// Ephemeral message handed to the dispatcher; never persisted.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

impl NotificationPayload {
    pub fn new(
        title: String,
        body: String,
        data: HashMap<String, String>,
    ) -> Result<NotificationPayload, Error> {
        let payload = NotificationPayload { title, body, data };
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let title_chars = self.title.chars().count();
        if title_chars == 0 || title_chars > TITLE_MAX_CHARS {
            return Err(Error::ValidationError(format!(
                "title must be 1 to {} characters",
                TITLE_MAX_CHARS
            )));
        }

        let body_chars = self.body.chars().count();
        if body_chars == 0 || body_chars > BODY_MAX_CHARS {
            return Err(Error::ValidationError(format!(
                "message must be 1 to {} characters",
                BODY_MAX_CHARS
            )));
        }

        Ok(())
    }

    /// JSON bytes in the shape the service worker expects, encrypted
    /// before they leave the process.
    pub fn to_wire(&self) -> Result<Vec<u8>, Error> {
        let message = WireMessage {
            title: &self.title,
            body: &self.body,
            icon: ICON_PATH,
            badge: BADGE_PATH,
            data: &self.data,
        };
        Ok(serde_json::to_vec(&message)?)
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    title: &'a str,
    body: &'a str,
    icon: &'a str,
    badge: &'a str,
    data: &'a HashMap<String, String>,
}

// =============================================================================
// Delivery Outcomes
// =============================================================================

/// Result of one delivery attempt against one subscription. The client
/// never raises past its boundary; every attempt folds into one of these.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Delivered {
        subscription_id: i64,
    },
    TransientFailure {
        subscription_id: i64,
        reason: String,
    },
    PermanentFailure {
        subscription_id: i64,
        status: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub success: bool,
    pub sent: usize,
    pub total: usize,
}

impl DispatchResult {
    /// The "no recipients" result; a normal outcome, not an error.
    pub fn empty() -> DispatchResult {
        DispatchResult {
            success: false,
            sent: 0,
            total: 0,
        }
    }
}

// =============================================================================
// Urgency Enum
// =============================================================================

#[derive(Debug, Clone)]
pub enum Urgency {
    VeryLow,
    Low,
    Normal,
    High,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Urgency::VeryLow => write!(f, "very-low"),
            Urgency::Low => write!(f, "low"),
            Urgency::Normal => write!(f, "normal"),
            Urgency::High => write!(f, "high"),
        }
    }
}

impl FromStr for Urgency {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<Urgency, Self::Err> {
        match value {
            "very-low" => Ok(Urgency::VeryLow),
            "low" => Ok(Urgency::Low),
            "normal" => Ok(Urgency::Normal),
            "high" => Ok(Urgency::High),
            _ => Err(io::Error::other("Urgency not supported")),
        }
    }
}

// =============================================================================
// JWT Claims
// =============================================================================

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub aud: String,
    pub sub: String,
    pub exp: i64,
}
