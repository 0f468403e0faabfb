use crate::db_types::Call;
use crate::error::AppError;

use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

const RESEND_URL: &str = "https://api.resend.com/emails";

/// Transactional email via the Resend REST API.  Every send here is
/// best-effort by contract: callers log failures and keep going.
#[derive(Clone)]
pub struct EmailClient {
    http: reqwest::Client,
    api_key: String,
    from: String,
    app_url: String,
}

#[derive(Deserialize)]
struct SendResponse {
    id: Option<String>,
}

impl EmailClient {
    pub fn new(http: reqwest::Client, api_key: String, from: String, app_url: String) -> Self {
        Self {
            http,
            api_key,
            from,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<String, AppError> {
        let resp = self
            .http
            .post(RESEND_URL)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("email request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status=%status, body=%body, "email send rejected");
            return Err(AppError::Provider(format!("email send failed: {status}")));
        }

        let parsed: SendResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("bad email response: {e}")))?;
        let id = parsed.id.unwrap_or_default();
        info!(email_id=%id, "email sent");
        Ok(id)
    }

    pub async fn send_booking_confirmation(&self, call: &Call) -> Result<String, AppError> {
        let subject = format!("Ho Ho Ho! Santa Call Confirmed for {}!", call.child_name);
        let html = format!(
            "<h1>Santa's call with {name} is booked!</h1>\
             <p>Santa will call {phone} as scheduled. Keep the phone nearby!</p>\
             <p>Booking reference: {id}</p>",
            name = call.child_name,
            phone = call.phone_number,
            id = call.id,
        );
        self.send(&call.parent_email, &subject, &html).await
    }

    pub async fn send_reminder(&self, call: &Call) -> Result<String, AppError> {
        let subject = format!("Reminder: Santa is calling {} in 1 hour!", call.child_name);
        let html = format!(
            "<h1>One hour to go!</h1>\
             <p>Santa calls {name} at {phone} in about an hour. \
             Make sure the phone is charged and somewhere festive.</p>",
            name = call.child_name,
            phone = call.phone_number,
        );
        self.send(&call.parent_email, &subject, &html).await
    }

    /// Links to both the audio recording page and the video tab.
    pub async fn send_post_call(&self, call: &Call, video_url: &str) -> Result<String, AppError> {
        let recording_page = format!("{}/recording/{}", self.app_url, call.id);
        let video_page = format!("{}/recording/{}?tab=video", self.app_url, call.id);
        let duration = call
            .call_duration_seconds
            .map(|secs| format!("<p>Call duration: {}m {}s</p>", secs / 60, secs % 60))
            .unwrap_or_default();
        let transcript = call
            .transcript
            .as_deref()
            .map(|t| format!("<h3>Call Transcript</h3><pre>{t}</pre>"))
            .unwrap_or_default();

        let subject = format!(
            "Santa's Call with {} - Recording & Video Ready!",
            call.child_name
        );
        let html = format!(
            "<h1>Santa called {name}!</h1>\
             {duration}\
             <p><a href=\"{recording_page}\">Download the recording</a></p>\
             <p><a href=\"{video_page}\">Download the shareable video</a></p>\
             <p><a href=\"{video_url}\">Direct video link</a></p>\
             {transcript}",
            name = call.child_name,
        );
        self.send(&call.parent_email, &subject, &html).await
    }
}
