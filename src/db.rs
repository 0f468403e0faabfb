use crate::db_types::{Call, CallEventType, CallStatus, PaymentStatus, Pricing, VideoStatus};
use crate::error::AppError;

use sqlx::{Pool, Postgres};
use time::{Duration, OffsetDateTime};
use tracing::error;
use uuid::Uuid;

/// Dispatch look-ahead: a call scheduled at T is picked up by the tick at or
/// before T, never after.
pub const DISPATCH_LOOKAHEAD: Duration = Duration::seconds(60);
/// Reminder window: 55-65 minutes out, so 5-minute cron jitter cannot skip or
/// double-select a call at the boundary.
pub const REMINDER_WINDOW_START: Duration = Duration::minutes(55);
pub const REMINDER_WINDOW_END: Duration = Duration::minutes(65);

pub const VIDEO_BATCH_LIMIT: i64 = 10;

/// All SQL lives here.  Status-changing updates on the payment path are
/// conditional on the expected prior status, so replayed events and
/// concurrent ticks cannot move a call backwards or claim it twice.
#[derive(Clone)]
pub struct CallStore {
    pool: Pool<Postgres>,
}

/// Booking-intake insert payload.
pub struct NewCall {
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
    pub recording_amount_cents: Option<i32>,
    pub total_amount_cents: i32,
    pub currency: String,
}

impl CallStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn insert_call(&self, new: NewCall) -> Result<Call, AppError> {
        let call = sqlx::query_as::<_, Call>(
            "
            insert into calls (
              child_name, child_age, child_info_text,
              child_info_voice_url, child_info_voice_transcript,
              phone_number, phone_country_code, parent_email,
              scheduled_at, timezone, call_now, gift_budget,
              base_amount_cents, recording_purchased, recording_amount_cents,
              total_amount_cents, currency
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
              $11, $12, $13, $14, $15, $16, $17
            )
            returning *
            ",
        )
        .bind(&new.child_name)
        .bind(new.child_age)
        .bind(&new.child_info_text)
        .bind(&new.child_info_voice_url)
        .bind(&new.child_info_voice_transcript)
        .bind(&new.phone_number)
        .bind(&new.phone_country_code)
        .bind(&new.parent_email)
        .bind(new.scheduled_at)
        .bind(&new.timezone)
        .bind(new.call_now)
        .bind(new.gift_budget)
        .bind(new.base_amount_cents)
        .bind(new.recording_purchased)
        .bind(new.recording_amount_cents)
        .bind(new.total_amount_cents)
        .bind(&new.currency)
        .fetch_one(&self.pool)
        .await?;
        Ok(call)
    }

    pub async fn get_call(&self, id: Uuid) -> Result<Option<Call>, AppError> {
        let call = sqlx::query_as::<_, Call>("select * from calls where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(call)
    }

    pub async fn find_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Call>, AppError> {
        let call = sqlx::query_as::<_, Call>(
            "select * from calls where elevenlabs_conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(call)
    }

    pub async fn set_stripe_ids(
        &self,
        id: Uuid,
        payment_intent_id: &str,
        checkout_session_id: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set stripe_payment_intent_id = $2,
                stripe_checkout_session_id = $3,
                updated_at = now()
            where id = $1
            ",
        )
        .bind(id)
        .bind(payment_intent_id)
        .bind(checkout_session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Absolute payment fields; safe to re-apply on event replay.
    pub async fn set_paid(
        &self,
        id: Uuid,
        payment_intent_id: Option<&str>,
        recording_purchased: bool,
    ) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set payment_status = $2,
                stripe_payment_intent_id = coalesce($3, stripe_payment_intent_id),
                recording_purchased = $4,
                updated_at = now()
            where id = $1
            ",
        )
        .bind(id)
        .bind(PaymentStatus::Paid)
        .bind(payment_intent_id)
        .bind(recording_purchased)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Post-call recording upsell: flips the purchase flag and stamps when it
    /// happened.  Payment and call lifecycle columns are untouched.
    pub async fn set_recording_purchased(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set recording_purchased = true,
                recording_purchased_at = now(),
                updated_at = now()
            where id = $1
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Advance pending -> scheduled for the deferred-dispatch branch.  The
    /// status guard keeps a replayed payment event from dragging a queued or
    /// finished call back to scheduled (which would re-expose it to the cron).
    pub async fn advance_to_scheduled(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set call_status = $2, updated_at = now()
            where id = $1 and call_status = $3
            ",
        )
        .bind(id)
        .bind(CallStatus::Scheduled)
        .bind(CallStatus::Pending)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Immediate-dispatch success: status, provider identifiers and start
    /// timestamp in one guarded write.
    pub async fn mark_dispatched(
        &self,
        id: Uuid,
        conversation_id: &str,
        call_sid: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set call_status = $2,
                elevenlabs_conversation_id = $3,
                twilio_call_sid = $4,
                call_started_at = now(),
                updated_at = now()
            where id = $1 and call_status in ($5, $6)
            ",
        )
        .bind(id)
        .bind(CallStatus::Queued)
        .bind(conversation_id)
        .bind(call_sid)
        .bind(CallStatus::Pending)
        .bind(CallStatus::Scheduled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store provider identifiers after a cron-claimed dispatch succeeded
    /// (the claim already moved the row to queued).
    pub async fn set_dispatch_ids(
        &self,
        id: Uuid,
        conversation_id: &str,
        call_sid: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set elevenlabs_conversation_id = $2,
                twilio_call_sid = $3,
                call_started_at = now(),
                updated_at = now()
            where id = $1
            ",
        )
        .bind(id)
        .bind(conversation_id)
        .bind(call_sid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal failure from a dispatch attempt.  Guarded so it never
    /// clobbers a call that already reached a terminal state.
    pub async fn mark_call_failed(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set call_status = $2, updated_at = now()
            where id = $1 and call_status not in ($3, $4, $5, $6)
            ",
        )
        .bind(id)
        .bind(CallStatus::Failed)
        .bind(CallStatus::Completed)
        .bind(CallStatus::Failed)
        .bind(CallStatus::NoAnswer)
        .bind(CallStatus::Cancelled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Payment failure never overwrites a prior paid state.
    pub async fn set_payment_failed(
        &self,
        id: Uuid,
        payment_intent_id: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set payment_status = $2,
                stripe_payment_intent_id = $3,
                updated_at = now()
            where id = $1 and payment_status <> $4
            ",
        )
        .bind(id)
        .bind(PaymentStatus::Failed)
        .bind(payment_intent_id)
        .bind(PaymentStatus::Paid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomic claim for the call cron: scheduled -> queued, exactly one tick
    /// wins.  Returns false when another tick already took the row.
    pub async fn claim_scheduled(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "
            update calls
            set call_status = $2, updated_at = now()
            where id = $1 and call_status = $3
            ",
        )
        .bind(id)
        .bind(CallStatus::Queued)
        .bind(CallStatus::Scheduled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Calls whose time has arrived, per the look-ahead window.
    pub async fn due_scheduled_calls(&self, now: OffsetDateTime) -> Result<Vec<Call>, AppError> {
        let calls = sqlx::query_as::<_, Call>(
            "
            select * from calls
            where call_status = $1
              and payment_status = $2
              and call_now = false
              and scheduled_at <= $3
            order by scheduled_at
            ",
        )
        .bind(CallStatus::Scheduled)
        .bind(PaymentStatus::Paid)
        .bind(now + DISPATCH_LOOKAHEAD)
        .fetch_all(&self.pool)
        .await?;
        Ok(calls)
    }

    pub async fn calls_in_reminder_window(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<Call>, AppError> {
        let calls = sqlx::query_as::<_, Call>(
            "
            select * from calls
            where call_status = $1
              and payment_status = $2
              and scheduled_at >= $3
              and scheduled_at <= $4
            order by scheduled_at
            ",
        )
        .bind(CallStatus::Scheduled)
        .bind(PaymentStatus::Paid)
        .bind(now + REMINDER_WINDOW_START)
        .bind(now + REMINDER_WINDOW_END)
        .fetch_all(&self.pool)
        .await?;
        Ok(calls)
    }

    /// Provider webhook terminal write: last-write-wins by design, since the
    /// provider does not guarantee delivery order between transcription and
    /// failure events.
    pub async fn complete_call(
        &self,
        id: Uuid,
        status: CallStatus,
        transcript: Option<&str>,
        duration_seconds: Option<i32>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set call_status = $2,
                transcript = $3,
                call_duration_seconds = $4,
                call_ended_at = now(),
                updated_at = now()
            where id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .bind(transcript)
        .bind(duration_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn end_call_with_status(&self, id: Uuid, status: CallStatus) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set call_status = $2,
                call_ended_at = now(),
                updated_at = now()
            where id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_recording_url(&self, id: Uuid, url: &str) -> Result<(), AppError> {
        sqlx::query(
            "update calls set recording_url = $2, updated_at = now() where id = $1",
        )
        .bind(id)
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Enqueue a render.  Only from the absent state: re-delivered audio
    /// events must not reset a render that is running or finished.
    pub async fn enqueue_render(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set video_status = $2, updated_at = now()
            where id = $1 and video_status is null
            ",
        )
        .bind(id)
        .bind(VideoStatus::Pending)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomic claim for the render cron: pending -> processing.
    pub async fn claim_video_render(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "
            update calls
            set video_status = $2, updated_at = now()
            where id = $1 and video_status = $3
            ",
        )
        .bind(id)
        .bind(VideoStatus::Processing)
        .bind(VideoStatus::Pending)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_video_status(&self, id: Uuid, status: VideoStatus) -> Result<(), AppError> {
        sqlx::query("update calls set video_status = $2, updated_at = now() where id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_video_completed(&self, id: Uuid, video_url: &str) -> Result<(), AppError> {
        sqlx::query(
            "
            update calls
            set video_url = $2,
                video_status = $3,
                video_generated_at = now(),
                updated_at = now()
            where id = $1
            ",
        )
        .bind(id)
        .bind(video_url)
        .bind(VideoStatus::Completed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn pending_video_renders(&self) -> Result<Vec<Call>, AppError> {
        let calls = sqlx::query_as::<_, Call>(
            "
            select * from calls
            where video_status = $1
              and recording_url is not null
            order by updated_at
            limit $2
            ",
        )
        .bind(VideoStatus::Pending)
        .bind(VIDEO_BATCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(calls)
    }

    pub async fn stamp_transcript_sent(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "update calls set transcript_sent_at = now(), updated_at = now() where id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Append an audit event.  Failures are logged and swallowed: the log is
    /// forensics, not state, and must never abort the workflow that emits it.
    pub async fn log_event(
        &self,
        call_id: Uuid,
        event_type: CallEventType,
        event_data: serde_json::Value,
    ) {
        let res = sqlx::query(
            "insert into call_events (call_id, event_type, event_data) values ($1, $2, $3)",
        )
        .bind(call_id)
        .bind(event_type.as_str())
        .bind(event_data)
        .execute(&self.pool)
        .await;
        if let Err(e) = res {
            error!(error=%e, call_id=%call_id, event_type=%event_type.as_str(), "failed to append call event");
        }
    }

    /// Idempotency probe against the audit log.
    pub async fn has_event(
        &self,
        call_id: Uuid,
        event_type: CallEventType,
    ) -> Result<bool, AppError> {
        let exists: (bool,) = sqlx::query_as(
            "
            select exists (
              select 1 from call_events where call_id = $1 and event_type = $2
            )
            ",
        )
        .bind(call_id)
        .bind(event_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists.0)
    }

    pub async fn active_pricing(&self) -> Result<Option<Pricing>, AppError> {
        let pricing = sqlx::query_as::<_, Pricing>(
            "
            select base_price_cents, recording_addon_cents, currency
            from pricing_config
            where is_active = true
            limit 1
            ",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(pricing)
    }
}
