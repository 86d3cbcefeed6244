use crate::error::DeliveryError;
use crate::types::{Ack, Subscription, VerificationResult};
use crate::verification::{self, SIGNATURE_HEADER};
use axum::http::HeaderMap;
use serde_json::Value;

/// How the receiver treats deliveries that arrive without a signature header
/// for a subscription that has a secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// Skip verification when the header is missing.
    #[default]
    Opportunistic,
    /// Reject unsigned deliveries once a secret is known.
    Required,
}

/// Outcome of running one delivery through the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Forward(Value),
    Reject(Ack),
}

/// Verify, parse and filter a single inbound delivery.
///
/// Only reads the subscription. The signature is checked against the exact raw
/// body before anything is parsed.
pub fn process(
    subscription: &Subscription,
    policy: SignaturePolicy,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Disposition, DeliveryError> {
    let header = headers.get(SIGNATURE_HEADER).map(|v| v.as_bytes());
    let secret = subscription.signing_secret();

    let result = verification::verify(secret, body, header);
    if !result.is_accepted() {
        tracing::warn!(
            trigger_id = %subscription.trigger_id,
            result = ?result,
            "webhook signature verification failed"
        );
        return Ok(Disposition::Reject(Ack::InvalidSignature));
    }
    if result == VerificationResult::Unsigned && secret.is_some() {
        if policy == SignaturePolicy::Required {
            tracing::warn!(
                trigger_id = %subscription.trigger_id,
                "rejecting unsigned delivery, signature required"
            );
            return Ok(Disposition::Reject(Ack::InvalidSignature));
        }
        tracing::warn!(
            trigger_id = %subscription.trigger_id,
            "delivery has no {SIGNATURE_HEADER} header, skipping verification"
        );
    }

    let payload: Value = serde_json::from_slice(body)?;
    if !payload.is_object() {
        return Err(DeliveryError::NotAnObject);
    }

    let event = payload.get("event").and_then(Value::as_str);
    if !subscription.event_filter.matches(event) {
        tracing::debug!(
            trigger_id = %subscription.trigger_id,
            event = event.unwrap_or("<none>"),
            filter = %subscription.event_filter,
            "event filtered"
        );
        return Ok(Disposition::Reject(Ack::Filtered));
    }

    Ok(Disposition::Forward(payload))
}
