//! Webhook signature verification and event parsing.
//!
//! The provider signs every notification with HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"` and sends the result in a header of the form
//! `t=<unix seconds>,v1=<hex signature>[,v1=<hex signature>...]`. Several
//! `v1` entries appear while a signing secret is being rotated.

use chrono::Utc;
use common::SessionId;
use domain::PaymentOutcome;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed timestamp, in seconds.
pub const MAX_EVENT_AGE_SECS: i64 = 300;

/// Tolerated clock skew for timestamps from the future, in seconds.
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 60;

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        if header.trim().is_empty() {
            return Err(WebhookError::MissingSignature);
        }

        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| WebhookError::MalformedHeader("invalid timestamp"))?,
                    );
                }
                "v1" => {
                    let bytes = hex::decode(value)
                        .map_err(|_| WebhookError::MalformedHeader("signature is not hex"))?;
                    signatures.push(bytes);
                }
                // Legacy schemes (v0) and unknown keys are ignored.
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader("missing timestamp"))?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader("missing v1 signature"));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verifies webhook signatures with a shared signing secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies `payload` against `header` using the current time.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verifies `payload` against `header` as of the unix time `now`.
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(header)?;

        // The timestamp is unauthenticated here, so extreme values must not overflow.
        let too_old = now
            .checked_sub(header.timestamp)
            .is_none_or(|age| age > MAX_EVENT_AGE_SECS);
        let too_new = header
            .timestamp
            .checked_sub(now)
            .is_none_or(|ahead| ahead > CLOCK_SKEW_TOLERANCE_SECS);
        if too_old || too_new {
            return Err(WebhookError::TimestampOutOfRange);
        }

        let expected = self.compute(header.timestamp, payload)?;
        let matched = header
            .signatures
            .iter()
            .any(|candidate| bool::from(expected.as_slice().ct_eq(candidate.as_slice())));

        if matched {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Produces a complete signature header for `payload` at `timestamp`.
    ///
    /// Used by local tooling and tests to simulate provider deliveries.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let signature = self.compute(timestamp, payload)?;
        Ok(format!("t={timestamp},v1={}", hex::encode(signature)))
    }

    fn compute(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::NotConfigured)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Event kinds the processor understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SessionCompleted,
    SessionAsyncPaymentSucceeded,
    SessionExpired,
    SessionAsyncPaymentFailed,
    Other(String),
}

impl EventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => EventKind::SessionCompleted,
            "checkout.session.async_payment_succeeded" => EventKind::SessionAsyncPaymentSucceeded,
            "checkout.session.expired" => EventKind::SessionExpired,
            "checkout.session.async_payment_failed" => EventKind::SessionAsyncPaymentFailed,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::SessionCompleted => "checkout.session.completed",
            EventKind::SessionAsyncPaymentSucceeded => "checkout.session.async_payment_succeeded",
            EventKind::SessionExpired => "checkout.session.expired",
            EventKind::SessionAsyncPaymentFailed => "checkout.session.async_payment_failed",
            EventKind::Other(other) => other,
        }
    }

    /// The payment outcome this kind of event drives, if any.
    pub fn outcome(&self) -> Option<PaymentOutcome> {
        match self {
            EventKind::SessionCompleted | EventKind::SessionAsyncPaymentSucceeded => {
                Some(PaymentOutcome::Paid)
            }
            EventKind::SessionExpired | EventKind::SessionAsyncPaymentFailed => {
                Some(PaymentOutcome::Failed)
            }
            EventKind::Other(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: RawSessionObject,
}

#[derive(Debug, Deserialize)]
struct RawSessionObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

/// A verified payment notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub event_id: Option<String>,
    pub kind: EventKind,
    pub session_id: Option<SessionId>,
    pub payment_status: Option<String>,
}

impl PaymentEvent {
    /// Parses a notification body.
    ///
    /// Events that drive an outcome must name the session they refer to.
    pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        let kind = EventKind::parse(&raw.event_type);
        let session_id = raw.data.object.id.filter(|id| !id.is_empty()).map(SessionId::new);

        if kind.outcome().is_some() && session_id.is_none() {
            return Err(WebhookError::MalformedPayload(
                "session event without a session id".to_string(),
            ));
        }

        Ok(Self {
            event_id: raw.id,
            kind,
            session_id,
            payment_status: raw.data.object.payment_status,
        })
    }

    /// The outcome to apply, if this event drives one.
    ///
    /// A completed session whose payment is still processing (delayed
    /// payment methods) is not yet paid; its later
    /// `async_payment_succeeded` event settles it.
    pub fn outcome(&self) -> Option<PaymentOutcome> {
        match (&self.kind, self.payment_status.as_deref()) {
            (EventKind::SessionCompleted, Some("unpaid")) => None,
            (kind, _) => kind.outcome(),
        }
    }
}
