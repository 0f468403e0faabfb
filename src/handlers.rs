use crate::db::NewCall;
use crate::db_types::{CallEventType, CallStatus};
use crate::dispatch::DispatchData;
use crate::elevenlabs_types::{ElevenLabsEvent, TranscriptTurn};
use crate::error::AppError;
use crate::signature::{verify_elevenlabs_signature, verify_stripe_signature};
use crate::storage::{RECORDINGS_BUCKET, VOICE_NOTES_BUCKET};
use crate::stripe_types::{
    call_id_from_metadata, include_recording_from_metadata, is_recording_purchase, StripeEvent,
};
use crate::types::AppState;

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

const MAX_VOICE_NOTE_BYTES: usize = 10 * 1024 * 1024;
const VOICE_NOTE_MIME_TYPES: &[&str] = &[
    "audio/webm",
    "audio/mp4",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
];

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub async fn hello() -> &'static str {
    "Santa's switchboard is up!"
}

//
// ---- payment settlement ----
//

/// What a successful payment event should do to the call, given where the
/// call currently is.  Replayed events land on `Nothing`.
#[derive(Debug, PartialEq, Eq)]
enum SettleAction {
    DispatchNow,
    Defer,
    Nothing,
}

fn settlement_action(status: &CallStatus, call_now: bool, has_conversation: bool) -> SettleAction {
    if *status != CallStatus::Pending || has_conversation {
        return SettleAction::Nothing;
    }
    if call_now {
        SettleAction::DispatchNow
    } else {
        SettleAction::Defer
    }
}

pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::BadSignature("missing stripe-signature header"))?;
    verify_stripe_signature(&body, signature, &state.stripe_webhook_secret, now_unix())?;

    let event: StripeEvent = serde_json::from_str(&body).map_err(|e| {
        error!(error=%e, "unparseable stripe event");
        AppError::BadRequest("unparseable event payload".to_string())
    })?;

    match event {
        StripeEvent::CheckoutCompleted { data } => {
            let session = data.object;
            let Some(call_id) = call_id_from_metadata(&session.metadata) else {
                info!(session_id=%session.id, "checkout session without call metadata, ignoring");
                return Ok(Json(json!({ "received": true })));
            };
            // Post-call recording upsell: flag the purchase and stop; the
            // payment and call lifecycle of the booking are long settled.
            if is_recording_purchase(&session.metadata) {
                state
                    .store
                    .get_call(call_id)
                    .await?
                    .ok_or(AppError::CallNotFound(call_id))?;
                state.store.set_recording_purchased(call_id).await?;
                state
                    .store
                    .log_event(
                        call_id,
                        CallEventType::RecordingPurchased,
                        json!({ "session_id": session.id, "amount": session.amount_total }),
                    )
                    .await;
                info!(call_id=%call_id, "post-call recording purchased");
                return Ok(Json(json!({ "received": true })));
            }

            let include_recording = include_recording_from_metadata(&session.metadata);
            settle_payment(
                &state,
                call_id,
                session.payment_intent.as_deref(),
                include_recording,
                CallEventType::PaymentReceived,
                json!({ "checkout_session_id": session.id, "amount_total": session.amount_total }),
            )
            .await?;

            // Confirmation email only on the hosted-checkout path; failures
            // must not fail the webhook.
            if let Ok(Some(call)) = state.store.get_call(call_id).await {
                if let Err(e) = state.email.send_booking_confirmation(&call).await {
                    warn!(error=%e, call_id=%call_id, "booking confirmation email failed");
                }
            }
        }
        StripeEvent::PaymentIntentSucceeded { data } => {
            let intent = data.object;
            let Some(call_id) = call_id_from_metadata(&intent.metadata) else {
                info!(payment_intent=%intent.id, "payment intent without call metadata, ignoring");
                return Ok(Json(json!({ "received": true })));
            };
            let include_recording = include_recording_from_metadata(&intent.metadata);
            settle_payment(
                &state,
                call_id,
                Some(&intent.id),
                include_recording,
                CallEventType::PaymentIntentSucceeded,
                json!({ "payment_intent_id": intent.id, "amount": intent.amount }),
            )
            .await?;
        }
        StripeEvent::PaymentIntentFailed { data } => {
            let intent = data.object;
            let Some(call_id) = call_id_from_metadata(&intent.metadata) else {
                info!(payment_intent=%intent.id, "failed intent without call metadata, ignoring");
                return Ok(Json(json!({ "received": true })));
            };
            let message = intent
                .last_payment_error
                .as_ref()
                .and_then(|e| e.message.clone());
            state.store.set_payment_failed(call_id, &intent.id).await?;
            state
                .store
                .log_event(
                    call_id,
                    CallEventType::PaymentFailed,
                    json!({ "payment_intent_id": intent.id, "error": message }),
                )
                .await;
            info!(call_id=%call_id, "payment marked failed");
        }
        StripeEvent::Unknown => {
            info!("unhandled stripe event type, acknowledging");
        }
    }

    Ok(Json(json!({ "received": true })))
}

/// Dispatch follow-up owed in the audit log after a settled payment.
#[derive(Debug, PartialEq, Eq)]
enum DispatchAudit {
    None,
    Initiated(String),
    Failed(String),
}

/// Ordered audit entries for one settled payment event: the payment entry
/// always comes first, the dispatch outcome (if any) second.
fn settlement_audit_trail(
    payment_event: CallEventType,
    payment_data: Value,
    dispatch: DispatchAudit,
) -> Vec<(CallEventType, Value)> {
    let mut trail = vec![(payment_event, payment_data)];
    match dispatch {
        DispatchAudit::None => {}
        DispatchAudit::Initiated(conversation_id) => trail.push((
            CallEventType::CallInitiated,
            json!({ "conversation_id": conversation_id }),
        )),
        DispatchAudit::Failed(error) => {
            trail.push((CallEventType::CallFailed, json!({ "error": error })))
        }
    }
    trail
}

/// Shared settlement path for both payment-success event shapes.  Payment
/// success and dispatch outcome are recorded independently: a failed dispatch
/// leaves the call paid but failed, never unpaid.
async fn settle_payment(
    state: &AppState,
    call_id: Uuid,
    payment_intent_id: Option<&str>,
    include_recording: bool,
    event_type: CallEventType,
    event_data: Value,
) -> Result<(), AppError> {
    let call = state
        .store
        .get_call(call_id)
        .await?
        .ok_or(AppError::CallNotFound(call_id))?;

    state
        .store
        .set_paid(call_id, payment_intent_id, include_recording)
        .await?;

    let dispatch_audit = match settlement_action(
        &call.call_status,
        call.call_now,
        call.elevenlabs_conversation_id.is_some(),
    ) {
        SettleAction::DispatchNow => {
            let data = DispatchData {
                child_name: call.child_name.clone(),
                child_age: call.child_age,
                gift_budget: call.gift_budget,
                child_info_text: call.child_info_text.clone(),
                child_info_voice_transcript: call.child_info_voice_transcript.clone(),
            };
            match state.voice.dispatch(&call.phone_number, &data).await {
                Ok(result) => {
                    state
                        .store
                        .mark_dispatched(
                            call_id,
                            &result.conversation_id,
                            result.call_sid.as_deref(),
                        )
                        .await?;
                    info!(call_id=%call_id, "immediate call dispatched on payment");
                    DispatchAudit::Initiated(result.conversation_id)
                }
                Err(e) => {
                    error!(error=%e, call_id=%call_id, "immediate dispatch failed");
                    state.store.mark_call_failed(call_id).await?;
                    DispatchAudit::Failed(e.to_string())
                }
            }
        }
        SettleAction::Defer => {
            state.store.advance_to_scheduled(call_id).await?;
            info!(call_id=%call_id, "call scheduled for dispatch");
            DispatchAudit::None
        }
        SettleAction::Nothing => {
            info!(call_id=%call_id, status=?call.call_status, "payment event replay, call already in flight");
            DispatchAudit::None
        }
    };

    for (event, data) in settlement_audit_trail(event_type, event_data, dispatch_audit) {
        state.store.log_event(call_id, event, data).await;
    }
    Ok(())
}

//
// ---- voice-provider webhook ----
//

pub async fn elevenlabs_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn elevenlabs_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("elevenlabs-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    verify_elevenlabs_signature(&body, signature, &state.elevenlabs_webhook_secret, now_unix())?;

    let event: ElevenLabsEvent = serde_json::from_str(&body).map_err(|e| {
        error!(error=%e, "unparseable voice-provider event");
        AppError::BadRequest("unparseable event payload".to_string())
    })?;

    match event {
        ElevenLabsEvent::Transcription { data } => {
            let Some(call) = state.store.find_by_conversation(&data.conversation_id).await? else {
                warn!(conversation_id=%data.conversation_id, "transcription for unknown conversation");
                return Ok(Json(json!({ "received": true, "warning": "Call not found" })));
            };

            let transcript = format_transcript(&data.transcript);
            let status = map_transcription_status(data.status.as_deref().unwrap_or("done"));
            let duration = data
                .metadata
                .as_ref()
                .and_then(|m| m.call_duration_secs)
                .map(|secs| secs as i32);
            state
                .store
                .complete_call(call.id, status, Some(&transcript), duration)
                .await?;
            state
                .store
                .log_event(
                    call.id,
                    CallEventType::PostCallTranscription,
                    json!({
                        "status": data.status,
                        "call_successful": data.analysis.as_ref().and_then(|a| a.call_successful.clone()),
                        "summary": data.analysis.as_ref().and_then(|a| a.transcript_summary.clone()),
                    }),
                )
                .await;
            info!(call_id=%call.id, "transcription stored");
            Ok(Json(json!({
                "received": true,
                "callId": call.id,
                "type": "post_call_transcription",
            })))
        }
        ElevenLabsEvent::Audio { data } => {
            let Some(call) = state.store.find_by_conversation(&data.conversation_id).await? else {
                warn!(conversation_id=%data.conversation_id, "audio for unknown conversation");
                return Ok(Json(json!({ "received": true, "warning": "Call not found" })));
            };

            let audio = base64::engine::general_purpose::STANDARD
                .decode(&data.full_audio)
                .map_err(|e| {
                    error!(error=%e, call_id=%call.id, "audio payload is not valid base64");
                    AppError::BadRequest("invalid audio payload".to_string())
                })?;
            let byte_count = audio.len();
            let object_path = format!("{}.mp3", call.id);
            state
                .storage
                .upload(RECORDINGS_BUCKET, &object_path, audio, "audio/mpeg")
                .await?;
            let recording_url = state.storage.public_url(RECORDINGS_BUCKET, &object_path);
            state.store.set_recording_url(call.id, &recording_url).await?;
            // Hand the recording to the render queue; the cron drains it.
            state.store.enqueue_render(call.id).await?;
            state
                .store
                .log_event(
                    call.id,
                    CallEventType::PostCallAudio,
                    json!({ "bytes": byte_count }),
                )
                .await;
            info!(call_id=%call.id, bytes=byte_count, "recording stored, render enqueued");
            Ok(Json(json!({
                "received": true,
                "callId": call.id,
                "type": "post_call_audio",
            })))
        }
        ElevenLabsEvent::Failure { data } => {
            let Some(call) = state.store.find_by_conversation(&data.conversation_id).await? else {
                warn!(conversation_id=%data.conversation_id, "failure report for unknown conversation");
                return Ok(Json(json!({ "received": true, "warning": "Call not found" })));
            };

            let status = map_failure_reason(&data.failure_reason);
            state.store.end_call_with_status(call.id, status).await?;
            state
                .store
                .log_event(
                    call.id,
                    CallEventType::CallInitiationFailure,
                    json!({
                        "reason": data.failure_reason,
                        "provider_error_type": data.metadata.as_ref().and_then(|m| m.kind.clone()),
                        "provider_error_body": data.metadata.as_ref().and_then(|m| m.body.clone()),
                    }),
                )
                .await;
            info!(call_id=%call.id, status=?status, "call ended by provider failure report");
            Ok(Json(json!({
                "received": true,
                "callId": call.id,
                "type": "call_initiation_failure",
            })))
        }
        ElevenLabsEvent::Unknown => Ok(Json(json!({ "received": true }))),
    }
}

/// Render the provider's turn list as alternating speaker lines.
fn format_transcript(turns: &[TranscriptTurn]) -> String {
    turns
        .iter()
        .filter(|t| !t.message.trim().is_empty())
        .map(|t| {
            let speaker = if t.role == "agent" { "Santa" } else { "Child" };
            format!("{}: {}", speaker, t.message.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn map_transcription_status(status: &str) -> CallStatus {
    match status {
        "done" | "completed" => CallStatus::Completed,
        "failed" | "error" => CallStatus::Failed,
        // Provider statuses we have not seen yet still carry a transcript.
        _ => CallStatus::Completed,
    }
}

fn map_failure_reason(reason: &str) -> CallStatus {
    match reason {
        "no-answer" | "no_answer" => CallStatus::NoAnswer,
        _ => CallStatus::Failed,
    }
}

//
// ---- booking intake ----
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingRequest {
    child_name: String,
    child_age: i32,
    #[serde(default)]
    child_info_text: Option<String>,
    phone_number: String,
    phone_country_code: String,
    parent_email: String,
    scheduled_at: String,
    timezone: String,
    #[serde(default)]
    call_now: bool,
    gift_budget: i32,
    #[serde(default)]
    include_recording: bool,
}

struct VoiceNote {
    bytes: Vec<u8>,
    mime_type: String,
}

fn validate_booking(req: &BookingRequest) -> Result<OffsetDateTime, AppError> {
    let mut problems = Vec::new();
    if req.child_name.trim().is_empty() {
        problems.push("childName is required".to_string());
    }
    if !(1..=120).contains(&req.child_age) {
        problems.push("childAge must be between 1 and 120".to_string());
    }
    if req.phone_number.trim().is_empty() {
        problems.push("phoneNumber is required".to_string());
    }
    if !req.parent_email.contains('@') {
        problems.push("parentEmail must be a valid email address".to_string());
    }
    if req.timezone.trim().is_empty() {
        problems.push("timezone is required".to_string());
    }
    if !(0..=1000).contains(&req.gift_budget) {
        problems.push("giftBudget must be between 0 and 1000".to_string());
    }

    let scheduled_at = match OffsetDateTime::parse(&req.scheduled_at, &Rfc3339) {
        Ok(ts) => Some(ts),
        Err(_) => {
            problems.push("scheduledAt must be an RFC 3339 timestamp".to_string());
            None
        }
    };

    if problems.is_empty() {
        Ok(scheduled_at.unwrap_or_else(OffsetDateTime::now_utc))
    } else {
        Err(AppError::BadRequest(problems.join("; ")))
    }
}

pub async fn create_call(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut booking: Option<BookingRequest> = None;
    let mut voice_note: Option<VoiceNote> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("unreadable multipart body: {e}")))?
    {
        match field.name() {
            Some("data") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("unreadable data field: {e}")))?;
                let parsed: BookingRequest = serde_json::from_str(&raw)
                    .map_err(|e| AppError::BadRequest(format!("invalid booking data: {e}")))?;
                booking = Some(parsed);
            }
            Some("voiceRecording") => {
                let mime_type = field
                    .content_type()
                    .map(|m| m.to_string())
                    .unwrap_or_default();
                if !VOICE_NOTE_MIME_TYPES.contains(&mime_type.as_str()) {
                    return Err(AppError::BadRequest(format!(
                        "unsupported voice recording type: {mime_type}"
                    )));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("unreadable voice recording: {e}")))?;
                if bytes.len() > MAX_VOICE_NOTE_BYTES {
                    return Err(AppError::BadRequest(
                        "voice recording exceeds 10MB".to_string(),
                    ));
                }
                voice_note = Some(VoiceNote {
                    bytes: bytes.to_vec(),
                    mime_type,
                });
            }
            _ => {}
        }
    }

    let booking = booking.ok_or_else(|| AppError::BadRequest("missing data field".to_string()))?;
    let scheduled_at = validate_booking(&booking)?;

    // Voice note is an enhancement: upload and transcription failures degrade
    // to a booking without it.
    let mut voice_url = None;
    let mut voice_transcript = None;
    if let Some(note) = voice_note {
        let extension = match note.mime_type.as_str() {
            "audio/webm" => "webm",
            "audio/mp4" => "m4a",
            "audio/wav" => "wav",
            "audio/ogg" => "ogg",
            _ => "mp3",
        };
        let object_path = format!("{}.{extension}", Uuid::new_v4());
        match state
            .storage
            .upload(
                VOICE_NOTES_BUCKET,
                &object_path,
                note.bytes.clone(),
                &note.mime_type,
            )
            .await
        {
            Ok(()) => {
                voice_url = Some(state.storage.public_url(VOICE_NOTES_BUCKET, &object_path));
                match state
                    .voice
                    .transcribe(note.bytes, &object_path, &note.mime_type)
                    .await
                {
                    Ok(text) => voice_transcript = text,
                    Err(e) => warn!(error=%e, "voice note transcription failed"),
                }
            }
            Err(e) => warn!(error=%e, "voice note upload failed"),
        }
    }

    let pricing = state
        .store
        .active_pricing()
        .await?
        .ok_or_else(|| AppError::Internal("no active pricing configured".to_string()))?;
    let recording_amount = booking
        .include_recording
        .then_some(pricing.recording_addon_cents);
    let total = pricing.base_price_cents + recording_amount.unwrap_or(0);

    let call = state
        .store
        .insert_call(NewCall {
            child_name: booking.child_name.trim().to_string(),
            child_age: booking.child_age,
            child_info_text: booking.child_info_text,
            child_info_voice_url: voice_url,
            child_info_voice_transcript: voice_transcript,
            phone_number: booking.phone_number.trim().to_string(),
            phone_country_code: booking.phone_country_code,
            parent_email: booking.parent_email.trim().to_string(),
            scheduled_at,
            timezone: booking.timezone,
            call_now: booking.call_now,
            gift_budget: booking.gift_budget,
            base_amount_cents: pricing.base_price_cents,
            recording_purchased: booking.include_recording,
            recording_amount_cents: recording_amount,
            total_amount_cents: total,
            currency: pricing.currency.clone(),
        })
        .await?;

    let intent = state
        .stripe
        .create_payment_intent(&call, booking.include_recording)
        .await?;
    let checkout = state
        .stripe
        .create_checkout_session(&call, booking.include_recording)
        .await?;
    state
        .store
        .set_stripe_ids(call.id, &intent.id, &checkout.session_id)
        .await?;

    info!(call_id=%call.id, amount=total, "booking created");
    Ok(Json(json!({
        "callId": call.id,
        "clientSecret": intent.client_secret,
        "amount": total,
        "currency": pricing.currency,
        "checkoutUrl": checkout.url,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: &str, message: &str) -> TranscriptTurn {
        TranscriptTurn {
            role: role.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn transcript_formatting_labels_speakers() {
        let turns = vec![
            turn("agent", "Ho ho ho! Is this Emma?"),
            turn("user", "Yes!!"),
            turn("agent", "What would you like for Christmas?"),
        ];
        assert_eq!(
            format_transcript(&turns),
            "Santa: Ho ho ho! Is this Emma?\n\nChild: Yes!!\n\nSanta: What would you like for Christmas?"
        );
    }

    #[test]
    fn transcript_formatting_skips_empty_turns() {
        let turns = vec![turn("agent", "Hello!"), turn("user", "   "), turn("user", "Hi")];
        assert_eq!(format_transcript(&turns), "Santa: Hello!\n\nChild: Hi");
    }

    #[test]
    fn transcription_status_mapping() {
        assert_eq!(map_transcription_status("done"), CallStatus::Completed);
        assert_eq!(map_transcription_status("completed"), CallStatus::Completed);
        assert_eq!(map_transcription_status("failed"), CallStatus::Failed);
        assert_eq!(map_transcription_status("error"), CallStatus::Failed);
        assert_eq!(map_transcription_status("processing"), CallStatus::Completed);
    }

    #[test]
    fn failure_reason_mapping() {
        assert_eq!(map_failure_reason("no-answer"), CallStatus::NoAnswer);
        assert_eq!(map_failure_reason("no_answer"), CallStatus::NoAnswer);
        assert_eq!(map_failure_reason("busy"), CallStatus::Failed);
        assert_eq!(map_failure_reason(""), CallStatus::Failed);
    }

    #[test]
    fn settlement_dispatches_only_fresh_immediate_calls() {
        assert_eq!(
            settlement_action(&CallStatus::Pending, true, false),
            SettleAction::DispatchNow
        );
        assert_eq!(
            settlement_action(&CallStatus::Pending, false, false),
            SettleAction::Defer
        );
        // Replay after dispatch: identifiers already present.
        assert_eq!(
            settlement_action(&CallStatus::Pending, true, true),
            SettleAction::Nothing
        );
        assert_eq!(
            settlement_action(&CallStatus::Queued, true, false),
            SettleAction::Nothing
        );
        assert_eq!(
            settlement_action(&CallStatus::Scheduled, false, false),
            SettleAction::Nothing
        );
    }

    #[test]
    fn payment_audit_precedes_dispatch_audit() {
        let trail = settlement_audit_trail(
            CallEventType::PaymentReceived,
            json!({ "checkout_session_id": "cs_1" }),
            DispatchAudit::Initiated("conv_1".to_string()),
        );
        let events: Vec<_> = trail.iter().map(|(event, _)| *event).collect();
        assert_eq!(
            events,
            vec![CallEventType::PaymentReceived, CallEventType::CallInitiated]
        );

        let trail = settlement_audit_trail(
            CallEventType::PaymentIntentSucceeded,
            json!({}),
            DispatchAudit::Failed("line busy".to_string()),
        );
        assert_eq!(trail[0].0, CallEventType::PaymentIntentSucceeded);
        assert_eq!(trail[1].0, CallEventType::CallFailed);
    }

    #[test]
    fn deferred_settlement_logs_only_the_payment() {
        let trail = settlement_audit_trail(
            CallEventType::PaymentReceived,
            json!({}),
            DispatchAudit::None,
        );
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].0, CallEventType::PaymentReceived);
    }

    #[test]
    fn booking_validation_bounds_gift_budget() {
        let mut req = BookingRequest {
            child_name: "Emma".to_string(),
            child_age: 7,
            child_info_text: None,
            phone_number: "+15551234567".to_string(),
            phone_country_code: "+1".to_string(),
            parent_email: "parent@example.com".to_string(),
            scheduled_at: "2025-12-24T18:00:00Z".to_string(),
            timezone: "America/New_York".to_string(),
            call_now: false,
            gift_budget: 1001,
            include_recording: false,
        };
        assert!(validate_booking(&req).is_err());
        req.gift_budget = 1000;
        assert!(validate_booking(&req).is_ok());
        req.gift_budget = -1;
        assert!(validate_booking(&req).is_err());
    }

    #[test]
    fn booking_validation_collects_all_problems() {
        let req = BookingRequest {
            child_name: " ".to_string(),
            child_age: 0,
            child_info_text: None,
            phone_number: String::new(),
            phone_country_code: "+1".to_string(),
            parent_email: "not-an-email".to_string(),
            scheduled_at: "tomorrow".to_string(),
            timezone: String::new(),
            call_now: false,
            gift_budget: -5,
            include_recording: false,
        };
        let err = validate_booking(&req).unwrap_err();
        let message = err.to_string();
        for expected in [
            "childName",
            "childAge",
            "phoneNumber",
            "parentEmail",
            "timezone",
            "giftBudget",
            "scheduledAt",
        ] {
            assert!(message.contains(expected), "missing {expected} in {message}");
        }
    }

    #[test]
    fn booking_validation_accepts_well_formed_request() {
        let req = BookingRequest {
            child_name: "Emma".to_string(),
            child_age: 7,
            child_info_text: Some("Loves dinosaurs".to_string()),
            phone_number: "+15551234567".to_string(),
            phone_country_code: "+1".to_string(),
            parent_email: "parent@example.com".to_string(),
            scheduled_at: "2025-12-24T18:00:00Z".to_string(),
            timezone: "America/New_York".to_string(),
            call_now: false,
            gift_budget: 100,
            include_recording: true,
        };
        let ts = validate_booking(&req).unwrap();
        assert_eq!(ts.year(), 2025);
        assert_eq!(ts.hour(), 18);
    }
}
