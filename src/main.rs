mod db;
mod db_types;
mod dispatch;
mod elevenlabs_types;
mod email;
mod error;
mod handlers;
mod signature;
mod storage;
mod stripe;
mod stripe_types;
mod tasks;
mod types;
mod video;

use crate::types::{AppState, Config};

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

/// Post-call audio arrives base64-encoded in the webhook body; allow room for
/// a long call plus the 10MB booking voice note.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("santacall_rs", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("could not connect to database!");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("database migration failed!");

    let http_client = reqwest::Client::new();
    let app_state = Arc::new(AppState {
        store: db::CallStore::new(pool),
        storage: storage::StorageClient::new(
            http_client.clone(),
            config.supabase_url,
            config.supabase_service_key,
        ),
        email: email::EmailClient::new(
            http_client.clone(),
            config.resend_api_key,
            config.email_from,
            config.app_url.clone(),
        ),
        stripe: stripe::StripeClient::new(
            http_client.clone(),
            config.stripe_secret_key,
            config.stripe_call_price_id,
            config.stripe_recording_price_id,
            config.app_url,
        ),
        voice: dispatch::VoiceClient::new(
            http_client.clone(),
            config.elevenlabs_api_key,
            config.elevenlabs_agent_id,
            config.elevenlabs_phone_number_id,
        ),
        http_client,
        stripe_webhook_secret: config.stripe_webhook_secret,
        elevenlabs_webhook_secret: config.elevenlabs_webhook_secret,
        cron_secret: config.cron_secret,
        outro_video_path: config.outro_video_path,
    });

    let app = Router::new()
        .route("/", get(handlers::hello))
        .route("/api/calls", post(handlers::create_call))
        .route("/api/webhooks/stripe", post(handlers::stripe_webhook))
        .route(
            "/api/webhooks/elevenlabs",
            get(handlers::elevenlabs_health).post(handlers::elevenlabs_webhook),
        )
        .route("/api/cron/schedule-calls", get(tasks::schedule_calls))
        .route("/api/cron/send-reminders", get(tasks::send_reminders))
        .route("/api/cron/render-videos", get(tasks::render_videos))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state);

    axum::Server::bind(&"0.0.0.0:3000".parse().unwrap())
        .serve(app.into_make_service())
        .await
        .unwrap();
}
