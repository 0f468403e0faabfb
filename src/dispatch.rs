use crate::elevenlabs_types::{
    ClientData, DynamicVariables, OutboundCallRequest, OutboundCallResponse, SpeechToTextResponse,
};
use crate::error::AppError;

use tracing::{debug, error, info};

const OUTBOUND_CALL_URL: &str = "https://api.elevenlabs.io/v1/convai/twilio/outbound-call";
const SPEECH_TO_TEXT_URL: &str = "https://api.elevenlabs.io/v1/speech-to-text";

/// Everything the agent needs to personalize one call.
#[derive(Debug, Clone)]
pub struct DispatchData {
    pub child_name: String,
    pub child_age: i32,
    pub gift_budget: i32,
    pub child_info_text: Option<String>,
    pub child_info_voice_transcript: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub conversation_id: String,
    pub call_sid: Option<String>,
}

/// Client for the conversational-voice provider's REST API.
#[derive(Clone)]
pub struct VoiceClient {
    http: reqwest::Client,
    api_key: String,
    agent_id: String,
    phone_number_id: String,
}

impl VoiceClient {
    pub fn new(
        http: reqwest::Client,
        api_key: String,
        agent_id: String,
        phone_number_id: String,
    ) -> Self {
        Self {
            http,
            api_key,
            agent_id,
            phone_number_id,
        }
    }

    /// Instruct the provider to place the outbound call.  No retries here;
    /// supervision (cron re-attempt, terminal failure state) belongs to the
    /// caller.
    pub async fn dispatch(
        &self,
        to_number: &str,
        data: &DispatchData,
    ) -> Result<DispatchResult, AppError> {
        let request = OutboundCallRequest {
            agent_id: self.agent_id.clone(),
            agent_phone_number_id: self.phone_number_id.clone(),
            to_number: to_number.to_string(),
            conversation_initiation_client_data: ClientData {
                dynamic_variables: DynamicVariables {
                    child_name: data.child_name.clone(),
                    child_age: data.child_age.to_string(),
                    gift_budget: gift_budget_guidance(data.gift_budget).to_string(),
                    child_info: data.child_info_text.clone().unwrap_or_default(),
                    voice_info: data.child_info_voice_transcript.clone().unwrap_or_default(),
                },
            },
        };

        let resp = self
            .http
            .post(OUTBOUND_CALL_URL)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to reach outbound-call endpoint");
                AppError::Provider(format!("outbound call request failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status=%status, body=%body, "outbound call rejected");
            return Err(AppError::Provider(format!(
                "outbound call failed: {status} - {body}"
            )));
        }

        let parsed: OutboundCallResponse = resp.json().await.map_err(|e| {
            error!(error=%e, "failed to deserialize outbound-call response");
            AppError::Provider(format!("bad outbound-call response: {e}"))
        })?;
        debug!(response=?parsed, "outbound call response");

        // A 2xx with no identifiers means the call may have failed
        // asynchronously; treat it as a failure rather than record an
        // ambiguous dispatch.
        let success = parsed.success.unwrap_or(parsed.conversation_id.is_some());
        let conversation_id = match (success, parsed.conversation_id) {
            (true, Some(id)) => id,
            _ => {
                return Err(AppError::Provider(
                    "outbound call returned no conversation id".to_string(),
                ))
            }
        };

        info!(conversation_id=%conversation_id, "outbound call dispatched");
        Ok(DispatchResult {
            conversation_id,
            call_sid: parsed.call_sid,
        })
    }

    /// Transcribe a parent's voice note.  Best-effort; callers degrade to no
    /// transcript on failure.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<Option<String>, AppError> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| AppError::Provider(format!("bad audio mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("model_id", "scribe_v1")
            .part("file", part);

        let resp = self
            .http
            .post(SPEECH_TO_TEXT_URL)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("speech-to-text request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "speech-to-text failed: {status} - {body}"
            )));
        }

        let parsed: SpeechToTextResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("bad speech-to-text response: {e}")))?;
        Ok(parsed.text)
    }
}

/// Translate a dollar budget into guidance for the agent.  Fixed thresholds,
/// deterministic lookup.
pub fn gift_budget_guidance(budget_dollars: i32) -> &'static str {
    if budget_dollars <= 50 {
        "If the child asks for expensive gifts, gently suggest that Santa's elves are quite busy this year and maybe something smaller would be just as magical. Keep gift suggestions under $50."
    } else if budget_dollars <= 150 {
        "Most reasonable gift requests are fine. For very expensive items over $150, suggest Santa will see what he can do."
    } else if budget_dollars <= 500 {
        "Be generous with gift promises but stay realistic. Most gifts up to a few hundred dollars are fine to promise."
    } else {
        "Any gift request is acceptable to promise. The family has indicated a generous budget."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_guidance_thresholds() {
        assert!(gift_budget_guidance(0).contains("under $50"));
        assert!(gift_budget_guidance(50).contains("under $50"));
        assert!(gift_budget_guidance(51).contains("over $150"));
        assert!(gift_budget_guidance(150).contains("over $150"));
        assert!(gift_budget_guidance(151).contains("few hundred dollars"));
        assert!(gift_budget_guidance(500).contains("few hundred dollars"));
        assert!(gift_budget_guidance(501).contains("generous budget"));
        assert!(gift_budget_guidance(1000).contains("generous budget"));
    }

    #[test]
    fn dynamic_variables_serialize_age_as_string() {
        let request = OutboundCallRequest {
            agent_id: "agent".into(),
            agent_phone_number_id: "phone".into(),
            to_number: "+15551234567".into(),
            conversation_initiation_client_data: ClientData {
                dynamic_variables: DynamicVariables {
                    child_name: "Maja".into(),
                    child_age: 7.to_string(),
                    gift_budget: gift_budget_guidance(120).to_string(),
                    child_info: String::new(),
                    voice_info: String::new(),
                },
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["conversation_initiation_client_data"]["dynamic_variables"]["child_age"],
            serde_json::json!("7")
        );
    }
}
