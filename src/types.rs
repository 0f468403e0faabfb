use crate::db::CallStore;
use crate::dispatch::VoiceClient;
use crate::email::EmailClient;
use crate::storage::StorageClient;
use crate::stripe::StripeClient;

use std::env;
use std::path::PathBuf;

/// Everything read from the environment at startup.  Missing variables are a
/// deployment error and abort the process immediately.
pub struct Config {
    pub database_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_call_price_id: String,
    pub stripe_recording_price_id: String,
    pub elevenlabs_api_key: String,
    pub elevenlabs_agent_id: String,
    pub elevenlabs_phone_number_id: String,
    pub elevenlabs_webhook_secret: String,
    pub cron_secret: String,
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub resend_api_key: String,
    pub email_from: String,
    pub app_url: String,
    /// Optional branded outro clip appended to rendered videos.
    pub outro_video_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL not set!"),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY not set!"),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET not set!"),
            stripe_call_price_id: env::var("STRIPE_CALL_PRICE_ID")
                .expect("STRIPE_CALL_PRICE_ID not set!"),
            stripe_recording_price_id: env::var("STRIPE_RECORDING_PRICE_ID")
                .expect("STRIPE_RECORDING_PRICE_ID not set!"),
            elevenlabs_api_key: env::var("ELEVENLABS_API_KEY")
                .expect("ELEVENLABS_API_KEY not set!"),
            elevenlabs_agent_id: env::var("ELEVENLABS_AGENT_ID")
                .expect("ELEVENLABS_AGENT_ID not set!"),
            elevenlabs_phone_number_id: env::var("ELEVENLABS_AGENT_PHONE_NUMBER_ID")
                .expect("ELEVENLABS_AGENT_PHONE_NUMBER_ID not set!"),
            elevenlabs_webhook_secret: env::var("ELEVENLABS_WEBHOOK_SECRET")
                .expect("ELEVENLABS_WEBHOOK_SECRET not set!"),
            cron_secret: env::var("CRON_SECRET").expect("CRON_SECRET not set!"),
            supabase_url: env::var("SUPABASE_URL").expect("SUPABASE_URL not set!"),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .expect("SUPABASE_SERVICE_ROLE_KEY not set!"),
            resend_api_key: env::var("RESEND_API_KEY").expect("RESEND_API_KEY not set!"),
            email_from: env::var("EMAIL_FROM").expect("EMAIL_FROM not set!"),
            app_url: env::var("APP_URL").expect("APP_URL not set!"),
            outro_video_path: env::var("OUTRO_VIDEO_PATH").ok().map(PathBuf::from),
        }
    }
}

pub struct AppState {
    pub store: CallStore,
    pub http_client: reqwest::Client,
    pub storage: StorageClient,
    pub email: EmailClient,
    pub stripe: StripeClient,
    pub voice: VoiceClient,
    pub stripe_webhook_secret: String,
    pub elevenlabs_webhook_secret: String,
    pub cron_secret: String,
    pub outro_video_path: Option<PathBuf>,
}
