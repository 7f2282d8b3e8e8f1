//! Dual-mode entrypoint: Lambda or local dev server.
//!
//! Detects Lambda runtime via `AWS_LAMBDA_RUNTIME_API` env var.
//! - Lambda: `lambda_http::run(app)`: API Gateway v2 → HTTP
//! - Local: `axum::serve(listener, app)`: standard TCP server

use std::env;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

use session_keeper::auth::mailer::{LogSender, Mailer, ResendSender};
use session_keeper::config::Config;
use session_keeper::identity::db;
use session_keeper::kv::AnyKv;
use session_keeper::kv::dynamodb::DynamoDbKv;
use session_keeper::kv::memory::MemoryKv;
use session_keeper::{AppState, create_app};

#[tokio::main]
async fn main() {
    let is_lambda = env::var("AWS_LAMBDA_RUNTIME_API").is_ok();

    // Init tracing: JSON for Lambda, pretty for local
    if is_lambda {
        fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    } else {
        // Load .env for local dev
        let _ = dotenvy::dotenv();
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    let config = Config::from_env().expect("Failed to load configuration");

    // KV backend: DynamoDB for production, in-memory for dev
    let kv = if config.kv_backend == "dynamodb" {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let dynamo_client = if config.dynamodb_endpoint.is_empty() {
            aws_sdk_dynamodb::Client::new(&sdk_config)
        } else {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(&config.dynamodb_endpoint)
                .build();
            aws_sdk_dynamodb::Client::from_conf(dynamo_config)
        };
        tracing::info!("Using DynamoDB KV backend (table: {})", config.dynamodb_table);
        AnyKv::DynamoDb(DynamoDbKv::new(dynamo_client, config.dynamodb_table.clone()))
    } else {
        tracing::info!("Using in-memory KV backend");
        AnyKv::Memory(MemoryKv::new())
    };

    let pool = db::connect(&config.database_url)
        .await
        .expect("Failed to open user database");

    let http_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build HTTP client");

    let mailer = match &config.resend_api_key {
        Some(key) if config.environment != "development" => {
            tracing::info!("Sending sign-in codes through Resend");
            Mailer::Resend(ResendSender::new(
                http_client.clone(),
                key.clone(),
                config.email_from.clone(),
            ))
        }
        _ => {
            tracing::warn!("No mail provider in use: sign-in codes are written to the log");
            Mailer::Log(LogSender)
        }
    };

    let port = config.port;
    let state = AppState::new(config, kv, pool, mailer, http_client)
        .expect("Failed to initialize application state");
    let app = create_app(Arc::new(state));

    if is_lambda {
        tracing::info!("Starting in Lambda mode");
        lambda_http::run(app).await.expect("Lambda runtime error");
    } else {
        let addr = format!("0.0.0.0:{}", port);
        tracing::info!("Starting local server on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind");
        axum::serve(listener, app).await.expect("Server error");
    }
}
