use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

/// The webhook events we act on, as a closed union.  Anything else Stripe
/// sends lands in `Unknown` and is acknowledged without effect.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum StripeEvent {
    #[serde(rename = "checkout.session.completed")]
    CheckoutCompleted { data: EventObject<CheckoutSession> },
    #[serde(rename = "payment_intent.succeeded")]
    PaymentIntentSucceeded { data: EventObject<PaymentIntent> },
    #[serde(rename = "payment_intent.payment_failed")]
    PaymentIntentFailed { data: EventObject<PaymentIntent> },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
pub struct EventObject<T> {
    pub object: T,
}

#[derive(Deserialize, Debug)]
pub struct CheckoutSession {
    pub id: String,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Deserialize, Debug)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub last_payment_error: Option<PaymentError>,
}

#[derive(Deserialize, Debug)]
pub struct PaymentError {
    pub message: Option<String>,
}

/// Pull the Call id out of event metadata.  Absent metadata is not an error:
/// payment links created outside the booking flow carry none.
pub fn call_id_from_metadata(metadata: &HashMap<String, String>) -> Option<Uuid> {
    metadata.get("call_id").and_then(|v| Uuid::parse_str(v).ok())
}

pub fn include_recording_from_metadata(metadata: &HashMap<String, String>) -> bool {
    metadata.get("include_recording").map(String::as_str) == Some("true")
}

/// Post-call recording upsells reuse the checkout webhook; the `type` metadata
/// key tells them apart from booking payments.
pub fn is_recording_purchase(metadata: &HashMap<String, String>) -> bool {
    metadata.get("type").map(String::as_str) == Some("recording_purchase")
}

#[derive(Deserialize, Debug)]
pub struct PaymentIntentCreated {
    pub id: String,
    pub client_secret: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CheckoutSessionCreated {
    pub id: String,
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checkout_completed_deserializes() {
        let payload = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_123",
                    "payment_intent": "pi_123",
                    "amount_total": 2999,
                    "currency": "usd",
                    "metadata": {
                        "call_id": "9b8e7cc2-5a54-4f3e-9a21-1db1f6f8f9a0",
                        "include_recording": "true"
                    }
                }
            }
        });
        let event: StripeEvent = serde_json::from_value(payload).unwrap();
        match event {
            StripeEvent::CheckoutCompleted { data } => {
                let session = data.object;
                assert_eq!(session.id, "cs_test_123");
                assert_eq!(session.payment_intent.as_deref(), Some("pi_123"));
                assert!(call_id_from_metadata(&session.metadata).is_some());
                assert!(include_recording_from_metadata(&session.metadata));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn payment_failed_carries_error_message() {
        let payload = json!({
            "type": "payment_intent.payment_failed",
            "data": {
                "object": {
                    "id": "pi_456",
                    "amount": 2999,
                    "currency": "usd",
                    "metadata": { "call_id": "9b8e7cc2-5a54-4f3e-9a21-1db1f6f8f9a0" },
                    "last_payment_error": { "message": "Your card was declined." }
                }
            }
        });
        let event: StripeEvent = serde_json::from_value(payload).unwrap();
        match event {
            StripeEvent::PaymentIntentFailed { data } => {
                let msg = data.object.last_payment_error.unwrap().message.unwrap();
                assert_eq!(msg, "Your card was declined.");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_are_tolerated() {
        let payload = json!({
            "type": "customer.subscription.updated",
            "data": { "object": { "id": "sub_1" } }
        });
        let event: StripeEvent = serde_json::from_value(payload).unwrap();
        assert!(matches!(event, StripeEvent::Unknown));
    }

    #[test]
    fn missing_metadata_yields_no_call_id() {
        let metadata = HashMap::new();
        assert!(call_id_from_metadata(&metadata).is_none());
        assert!(!include_recording_from_metadata(&metadata));
    }

    #[test]
    fn recording_purchase_discriminator() {
        let mut metadata = HashMap::new();
        metadata.insert(
            "call_id".to_string(),
            "9b8e7cc2-5a54-4f3e-9a21-1db1f6f8f9a0".to_string(),
        );
        assert!(!is_recording_purchase(&metadata));
        metadata.insert("type".to_string(), "recording_purchase".to_string());
        assert!(is_recording_purchase(&metadata));
    }
}
