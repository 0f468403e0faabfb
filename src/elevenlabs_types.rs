use serde::{Deserialize, Serialize};

/// Post-call webhook events from the voice provider, as a closed union keyed
/// on the `type` discriminator.  Unknown kinds are acknowledged and logged,
/// never a runtime error.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ElevenLabsEvent {
    #[serde(rename = "post_call_transcription")]
    Transcription { data: TranscriptionData },
    #[serde(rename = "post_call_audio")]
    Audio { data: AudioData },
    #[serde(rename = "call_initiation_failure")]
    Failure { data: FailureData },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
pub struct TranscriptionData {
    pub conversation_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptTurn>,
    #[serde(default)]
    pub metadata: Option<TranscriptionMetadata>,
    #[serde(default)]
    pub analysis: Option<TranscriptionAnalysis>,
}

#[derive(Deserialize, Debug)]
pub struct TranscriptTurn {
    pub role: String,
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct TranscriptionMetadata {
    pub call_duration_secs: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct TranscriptionAnalysis {
    pub call_successful: Option<String>,
    pub transcript_summary: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AudioData {
    pub conversation_id: String,
    /// Base64-encoded MP3 of the whole call.
    pub full_audio: String,
}

#[derive(Deserialize, Debug)]
pub struct FailureData {
    pub conversation_id: String,
    pub failure_reason: String,
    #[serde(default)]
    pub metadata: Option<FailureMetadata>,
}

#[derive(Deserialize, Debug)]
pub struct FailureMetadata {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// Request body for the outbound-call endpoint.
#[derive(Serialize, Debug)]
pub struct OutboundCallRequest {
    pub agent_id: String,
    pub agent_phone_number_id: String,
    pub to_number: String,
    pub conversation_initiation_client_data: ClientData,
}

#[derive(Serialize, Debug)]
pub struct ClientData {
    pub dynamic_variables: DynamicVariables,
}

#[derive(Serialize, Debug)]
pub struct DynamicVariables {
    pub child_name: String,
    pub child_age: String,
    pub gift_budget: String,
    pub child_info: String,
    pub voice_info: String,
}

/// Response from the outbound-call endpoint; the provider answers in
/// snake_case but older deployments used camelCase for the call SID.
#[derive(Deserialize, Debug)]
pub struct OutboundCallResponse {
    pub conversation_id: Option<String>,
    #[serde(alias = "callSid")]
    pub call_sid: Option<String>,
    pub success: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct SpeechToTextResponse {
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transcription_event_deserializes() {
        let payload = json!({
            "type": "post_call_transcription",
            "event_timestamp": 1_700_000_000,
            "data": {
                "agent_id": "agent_1",
                "conversation_id": "conv_abc",
                "status": "done",
                "transcript": [
                    { "role": "agent", "message": "Ho ho ho!", "time_in_call_secs": 0 },
                    { "role": "user", "message": "Santa?!", "time_in_call_secs": 2 }
                ],
                "metadata": { "start_time_unix_secs": 1_700_000_000, "call_duration_secs": 142, "cost": 3 },
                "analysis": { "call_successful": "success", "transcript_summary": "A joyful call." }
            }
        });
        let event: ElevenLabsEvent = serde_json::from_value(payload).unwrap();
        match event {
            ElevenLabsEvent::Transcription { data } => {
                assert_eq!(data.conversation_id, "conv_abc");
                assert_eq!(data.status.as_deref(), Some("done"));
                assert_eq!(data.transcript.len(), 2);
                assert_eq!(data.metadata.unwrap().call_duration_secs, Some(142));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn failure_event_deserializes() {
        let payload = json!({
            "type": "call_initiation_failure",
            "data": {
                "agent_id": "agent_1",
                "conversation_id": "conv_abc",
                "failure_reason": "no-answer",
                "metadata": { "type": "twilio", "body": { "code": 486 } }
            }
        });
        let event: ElevenLabsEvent = serde_json::from_value(payload).unwrap();
        match event {
            ElevenLabsEvent::Failure { data } => {
                assert_eq!(data.failure_reason, "no-answer");
                assert_eq!(data.metadata.unwrap().kind.as_deref(), Some("twilio"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_kind_is_tolerated() {
        let payload = json!({ "type": "agent_response_correction", "data": {} });
        let event: ElevenLabsEvent = serde_json::from_value(payload).unwrap();
        assert!(matches!(event, ElevenLabsEvent::Unknown));
    }

    #[test]
    fn outbound_response_accepts_camel_case_call_sid() {
        let resp: OutboundCallResponse =
            serde_json::from_value(json!({ "conversation_id": "c1", "callSid": "CA123" })).unwrap();
        assert_eq!(resp.call_sid.as_deref(), Some("CA123"));
    }
}
