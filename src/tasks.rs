use crate::db_types::CallEventType;
use crate::dispatch::DispatchData;
use crate::error::AppError;
use crate::types::AppState;
use crate::video;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

/// All cron endpoints share one bearer secret, supplied by the scheduler.
fn check_cron_auth(headers: &HeaderMap, secret: &str) -> Result<(), AppError> {
    let expected = format!("Bearer {secret}");
    match headers.get(axum::http::header::AUTHORIZATION) {
        Some(value) if value.to_str().map(|v| v == expected).unwrap_or(false) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

#[derive(Debug, Serialize)]
pub struct CronReport {
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    pub results: Vec<CronItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronItem {
    pub call_id: Uuid,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CronReport {
    fn new() -> Self {
        Self {
            processed: 0,
            success: 0,
            failed: 0,
            results: Vec::new(),
        }
    }

    fn ok(&mut self, call_id: Uuid) {
        self.processed += 1;
        self.success += 1;
        self.results.push(CronItem {
            call_id,
            status: "success",
            error: None,
        });
    }

    fn fail(&mut self, call_id: Uuid, error: String) {
        self.processed += 1;
        self.failed += 1;
        self.results.push(CronItem {
            call_id,
            status: "failed",
            error: Some(error),
        });
    }

    fn skip(&mut self, call_id: Uuid) {
        self.processed += 1;
        self.results.push(CronItem {
            call_id,
            status: "skipped",
            error: None,
        });
    }
}

/// Dispatch every paid scheduled call whose time has arrived.  Each call is
/// claimed before dispatch so overlapping ticks cannot double-dial a child.
pub async fn schedule_calls(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CronReport>, AppError> {
    check_cron_auth(&headers, &state.cron_secret)?;

    let due = state
        .store
        .due_scheduled_calls(OffsetDateTime::now_utc())
        .await?;
    info!(count = due.len(), "due scheduled calls");

    let mut report = CronReport::new();
    for call in due {
        if !state.store.claim_scheduled(call.id).await? {
            report.skip(call.id);
            continue;
        }

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
                    .set_dispatch_ids(call.id, &result.conversation_id, result.call_sid.as_deref())
                    .await?;
                state
                    .store
                    .log_event(
                        call.id,
                        CallEventType::CallInitiated,
                        json!({ "conversation_id": result.conversation_id }),
                    )
                    .await;
                report.ok(call.id);
            }
            Err(e) => {
                error!(error=%e, call_id=%call.id, "scheduled dispatch failed");
                state.store.mark_call_failed(call.id).await?;
                state
                    .store
                    .log_event(
                        call.id,
                        CallEventType::CallFailed,
                        json!({ "error": e.to_string() }),
                    )
                    .await;
                report.fail(call.id, e.to_string());
            }
        }
    }

    info!(processed = report.processed, failed = report.failed, "schedule tick done");
    Ok(Json(report))
}

/// One reminder email per call, keyed on the audit log.  The selection window
/// is wider than the cron period so boundary calls are never skipped; the
/// audit check keeps the overlap from double-sending.
pub async fn send_reminders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CronReport>, AppError> {
    check_cron_auth(&headers, &state.cron_secret)?;

    let upcoming = state
        .store
        .calls_in_reminder_window(OffsetDateTime::now_utc())
        .await?;
    info!(count = upcoming.len(), "calls in reminder window");

    let mut report = CronReport::new();
    for call in upcoming {
        if state
            .store
            .has_event(call.id, CallEventType::ReminderEmailSent)
            .await?
        {
            report.skip(call.id);
            continue;
        }
        match state.email.send_reminder(&call).await {
            Ok(email_id) => {
                state
                    .store
                    .log_event(
                        call.id,
                        CallEventType::ReminderEmailSent,
                        json!({ "email_id": email_id }),
                    )
                    .await;
                report.ok(call.id);
            }
            Err(e) => {
                error!(error=%e, call_id=%call.id, "reminder email failed");
                report.fail(call.id, e.to_string());
            }
        }
    }

    Ok(Json(report))
}

/// Drain the render queue.  The pipeline reports failure as a value, so one
/// bad recording never stops the batch.
pub async fn render_videos(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CronReport>, AppError> {
    check_cron_auth(&headers, &state.cron_secret)?;

    let pending = state.store.pending_video_renders().await?;
    info!(count = pending.len(), "pending video renders");

    let mut report = CronReport::new();
    for call in pending {
        if !state.store.claim_video_render(call.id).await? {
            report.skip(call.id);
            continue;
        }
        let outcome = video::render_call_video(&state, &call).await;
        if outcome.success {
            report.ok(call.id);
        } else {
            report.fail(
                call.id,
                outcome.error.unwrap_or_else(|| "render failed".to_string()),
            );
        }
    }

    info!(processed = report.processed, failed = report.failed, "render tick done");
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DISPATCH_LOOKAHEAD, REMINDER_WINDOW_END, REMINDER_WINDOW_START};

    #[test]
    fn cron_auth_requires_exact_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(check_cron_auth(&headers, "secret").is_err());

        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong".parse().unwrap(),
        );
        assert!(check_cron_auth(&headers, "secret").is_err());

        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer secret".parse().unwrap(),
        );
        assert!(check_cron_auth(&headers, "secret").is_ok());
    }

    #[test]
    fn reminder_window_covers_cron_jitter() {
        // A 5-minute cron sees every instant of the hour-out boundary exactly
        // once when the window is twice the period wide.
        let width = REMINDER_WINDOW_END - REMINDER_WINDOW_START;
        assert_eq!(width.whole_minutes(), 10);
        assert!(DISPATCH_LOOKAHEAD.whole_seconds() == 60);
    }

    #[test]
    fn report_counts_track_results() {
        let mut report = CronReport::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        report.ok(a);
        report.fail(b, "boom".to_string());
        report.skip(c);
        assert_eq!(report.processed, 3);
        assert_eq!(report.success, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.results[2].status, "skipped");
    }
}
