use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of a booked call.
///
/// ```text
/// pending -> scheduled -> queued -> completed | failed | no_answer
/// ```
/// `completed`, `failed`, `no_answer` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "call_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Scheduled,
    Queued,
    Completed,
    Failed,
    NoAnswer,
    Cancelled,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Failed | CallStatus::NoAnswer | CallStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// Sub-lifecycle of the shareable video; the column is NULL until a recording
/// arrives and a render is owed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "video_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One booking of a Santa call.  Root entity of the system.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Call {
    pub id: Uuid,

    pub child_name: String,
    pub child_age: i32,
    pub child_info_text: Option<String>,
    pub child_info_voice_url: Option<String>,
    pub child_info_voice_transcript: Option<String>,

    pub phone_number: String,
    pub phone_country_code: String,
    pub parent_email: String,

    pub scheduled_at: OffsetDateTime,
    pub timezone: String,
    pub call_now: bool,
    pub gift_budget: i32,

    pub base_amount_cents: i32,
    pub recording_purchased: bool,
    pub recording_purchased_at: Option<OffsetDateTime>,
    pub recording_amount_cents: Option<i32>,
    pub total_amount_cents: i32,
    pub currency: String,
    pub payment_status: PaymentStatus,

    pub stripe_payment_intent_id: Option<String>,
    pub stripe_checkout_session_id: Option<String>,
    pub twilio_call_sid: Option<String>,
    pub elevenlabs_conversation_id: Option<String>,

    pub call_status: CallStatus,
    pub call_started_at: Option<OffsetDateTime>,
    pub call_ended_at: Option<OffsetDateTime>,
    pub call_duration_seconds: Option<i32>,
    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    pub transcript_sent_at: Option<OffsetDateTime>,

    pub video_status: Option<VideoStatus>,
    pub video_url: Option<String>,
    pub video_generated_at: Option<OffsetDateTime>,

    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Typed tags for the audit log.  Stored as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEventType {
    PaymentReceived,
    PaymentIntentSucceeded,
    PaymentFailed,
    RecordingPurchased,
    CallInitiated,
    CallFailed,
    PostCallTranscription,
    PostCallAudio,
    CallInitiationFailure,
    ReminderEmailSent,
    PostCallEmailSent,
    VideoRenderCompleted,
}

impl CallEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            CallEventType::PaymentReceived => "payment_received",
            CallEventType::PaymentIntentSucceeded => "payment_intent_succeeded",
            CallEventType::PaymentFailed => "payment_failed",
            CallEventType::RecordingPurchased => "recording_purchased",
            CallEventType::CallInitiated => "call_initiated",
            CallEventType::CallFailed => "call_failed",
            CallEventType::PostCallTranscription => "post_call_transcription",
            CallEventType::PostCallAudio => "post_call_audio",
            CallEventType::CallInitiationFailure => "call_initiation_failure",
            CallEventType::ReminderEmailSent => "reminder_email_sent",
            CallEventType::PostCallEmailSent => "post_call_email_sent",
            CallEventType::VideoRenderCompleted => "video_render_completed",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Pricing {
    pub base_price_cents: i32,
    pub recording_addon_cents: i32,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(CallStatus::NoAnswer.is_terminal());
        assert!(CallStatus::Cancelled.is_terminal());
        assert!(!CallStatus::Pending.is_terminal());
        assert!(!CallStatus::Scheduled.is_terminal());
        assert!(!CallStatus::Queued.is_terminal());
    }

    #[test]
    fn audit_tags_match_stored_text() {
        assert_eq!(CallEventType::PaymentReceived.as_str(), "payment_received");
        assert_eq!(
            CallEventType::RecordingPurchased.as_str(),
            "recording_purchased"
        );
        assert_eq!(
            CallEventType::CallInitiationFailure.as_str(),
            "call_initiation_failure"
        );
    }

    #[test]
    fn statuses_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(CallStatus::NoAnswer).unwrap(),
            serde_json::json!("no_answer")
        );
        assert_eq!(
            serde_json::to_value(PaymentStatus::Paid).unwrap(),
            serde_json::json!("paid")
        );
        assert_eq!(
            serde_json::to_value(VideoStatus::Processing).unwrap(),
            serde_json::json!("processing")
        );
    }
}
