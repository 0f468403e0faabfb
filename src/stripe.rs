use crate::db_types::Call;
use crate::error::AppError;
use crate::stripe_types::{CheckoutSessionCreated, PaymentIntentCreated};

use tracing::error;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Payment-provider client for the booking flow.  Stripe's API is
/// form-encoded, bracketed keys and all, so requests are built as key/value
/// pairs rather than JSON.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    call_price_id: String,
    recording_price_id: String,
    app_url: String,
}

pub struct CheckoutResult {
    pub session_id: String,
    pub url: String,
}

impl StripeClient {
    pub fn new(
        http: reqwest::Client,
        secret_key: String,
        call_price_id: String,
        recording_price_id: String,
        app_url: String,
    ) -> Self {
        Self {
            http,
            secret_key,
            call_price_id,
            recording_price_id,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, AppError> {
        let resp = self
            .http
            .post(format!("{API_BASE}{path}"))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, path=%path, "stripe request failed");
                AppError::Provider(format!("stripe request failed: {e}"))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status=%status, path=%path, body=%body, "stripe rejected request");
            return Err(AppError::Provider(format!("stripe error: {status}")));
        }

        resp.json::<T>().await.map_err(|e| {
            error!(error=%e, path=%path, "failed to deserialize stripe response");
            AppError::Provider(format!("bad stripe response: {e}"))
        })
    }

    /// Payment intent for in-app wallets.  Metadata carries the Call id so the
    /// settlement webhook can correlate the event back to the booking.
    pub async fn create_payment_intent(
        &self,
        call: &Call,
        include_recording: bool,
    ) -> Result<PaymentIntentCreated, AppError> {
        let form = vec![
            ("amount", call.total_amount_cents.to_string()),
            ("currency", call.currency.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[call_id]", call.id.to_string()),
            ("metadata[child_name]", call.child_name.clone()),
            (
                "metadata[include_recording]",
                include_recording.to_string(),
            ),
            ("receipt_email", call.parent_email.clone()),
        ];
        self.post_form("/payment_intents", &form).await
    }

    /// Legacy hosted-checkout fallback.
    pub async fn create_checkout_session(
        &self,
        call: &Call,
        include_recording: bool,
    ) -> Result<CheckoutResult, AppError> {
        let mut form = vec![
            ("mode", "payment".to_string()),
            ("line_items[0][price]", self.call_price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "success_url",
                format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", self.app_url),
            ),
            (
                "cancel_url",
                format!("{}/cancelled?call_id={}", self.app_url, call.id),
            ),
            ("customer_email", call.parent_email.clone()),
            ("metadata[call_id]", call.id.to_string()),
            ("metadata[child_name]", call.child_name.clone()),
            (
                "metadata[include_recording]",
                include_recording.to_string(),
            ),
            (
                "payment_intent_data[metadata][call_id]",
                call.id.to_string(),
            ),
        ];
        if include_recording {
            form.push(("line_items[1][price]", self.recording_price_id.clone()));
            form.push(("line_items[1][quantity]", "1".to_string()));
        }

        let session: CheckoutSessionCreated = self.post_form("/checkout/sessions", &form).await?;
        let url = session.url.ok_or_else(|| {
            AppError::Provider("checkout session created without a URL".to_string())
        })?;
        Ok(CheckoutResult {
            session_id: session.id,
            url,
        })
    }
}
