//! PoA Verifier - reads the declared value off a document photo and issues it on-chain.

mod chain;
mod config;
mod error;
mod inference;
mod normalize;
mod ocr;
mod pipeline;
mod schema;

#[cfg(test)]
mod test_support;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use chain::RpcIssuer;
use config::PipelineConfig;
use inference::InferenceClient;
use pipeline::{Orchestrator, RunOutcome, RunRejected};
use schema::UploadedDocument;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const INDEX_PAGE: &str = include_str!("../static/index.html");
const SUCCESS_PAGE: &str = include_str!("../static/success.html");
const FAIL_PAGE: &str = include_str!("../static/fail.html");

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    chain: Arc<RpcIssuer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "poa_verifier=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env()?;
    info!(
        "Verifier contract {} via {}, OCR provider {:?}",
        config.contract_address, config.rpc_url, config.ocr.provider
    );

    let http = reqwest::Client::new();
    let ocr = ocr::build_provider(&config.ocr, http.clone());
    let extractor = Arc::new(InferenceClient::new(
        http.clone(),
        config.inference_endpoint.clone(),
        config.bearer_token.clone(),
    ));
    let chain = Arc::new(RpcIssuer::new(&config, http));

    match chain.token_address().await {
        Ok(token) => info!("Verifier issues into token contract {}", token),
        Err(e) => warn!("Could not read token() from verifier: {}", e),
    }

    let orchestrator = Orchestrator::new(ocr, extractor, chain.clone(), config.question.clone());
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        chain,
    };

    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(|| async { Html(INDEX_PAGE) }))
        .route("/success.html", get(|| async { Html(SUCCESS_PAGE) }))
        .route("/fail.html", get(|| async { Html(FAIL_PAGE) }))
        .route("/health", get(health))
        .route("/state", get(current_state))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check, with the verifier's token contract when the node answers.
async fn health(State(state): State<AppState>) -> String {
    match state.chain.token_address().await {
        Ok(token) => format!("ok token={}", token),
        Err(_) => "ok token=unreachable".to_string(),
    }
}

async fn current_state(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "state": state.orchestrator.state() }))
}

/// Accept a document and run it through the pipeline, redirecting on the outcome.
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut filename = String::new();
    let mut file_data = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)).into_response()
            }
        };
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("document").to_string();
            file_data = match field.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(e) => {
                    return (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
                        .into_response()
                }
            };
            break;
        }
    }

    if file_data.is_empty() {
        return (StatusCode::BAD_REQUEST, "No file uploaded").into_response();
    }

    info!("Received file: {} ({} bytes)", filename, file_data.len());
    let document = UploadedDocument::new(filename, file_data);

    // Detached so a dropped connection cannot cut a run short.
    let orchestrator = Arc::clone(&state.orchestrator);
    let run = tokio::spawn(async move { orchestrator.submit(document).await });

    match run.await {
        Ok(Ok(RunOutcome::Succeeded { receipt })) => {
            info!(
                "Issued in tx {} (block {}, hash {})",
                receipt.transaction_hash,
                receipt.block_number.as_deref().unwrap_or("?"),
                receipt.block_hash.as_deref().unwrap_or("?")
            );
            Redirect::to("/success.html").into_response()
        }
        Ok(Ok(RunOutcome::Failed { error })) => {
            warn!("Verification failed at {} stage", error.kind());
            Redirect::to("/fail.html").into_response()
        }
        Ok(Err(RunRejected::Busy)) => {
            (StatusCode::CONFLICT, "A document is already being verified").into_response()
        }
        Err(e) => {
            error!("Pipeline task panicked: {}", e);
            Redirect::to("/fail.html").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        orchestrator, spawn_server, test_config, FixedOcr, RecordingIssuer, ScriptedExtractor,
    };
    use reqwest::multipart::{Form, Part};

    async fn serve(answer: &str, issuer: Arc<RecordingIssuer>) -> String {
        let orch = orchestrator(
            FixedOcr::text("The assessed value is $10,000"),
            ScriptedExtractor::answers(&[answer]),
            issuer,
        );
        let mut config = test_config();
        config.rpc_url = "http://127.0.0.1:9".to_string();
        let state = AppState {
            orchestrator: Arc::new(orch),
            chain: Arc::new(RpcIssuer::new(&config, reqwest::Client::new())),
        };
        spawn_server(router(state, 1024 * 1024)).await
    }

    fn no_redirects() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    fn form() -> Form {
        Form::new().part(
            "file",
            Part::bytes(crate::ocr::PNG_MAGIC.to_vec()).file_name("scan.png"),
        )
    }

    #[tokio::test]
    async fn test_upload_redirects_to_success() {
        let issuer = RecordingIssuer::new();
        let url = serve("$10,000", issuer.clone()).await;

        let resp = no_redirects()
            .post(format!("{}/upload", url))
            .multipart(form())
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 303);
        assert_eq!(resp.headers()["location"], "/success.html");
        assert_eq!(issuer.values(), vec!["10000"]);

        let state: serde_json::Value = reqwest::get(format!("{}/state", url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["state"], "succeeded");
    }

    #[tokio::test]
    async fn test_upload_redirects_to_failure() {
        let issuer = RecordingIssuer::new();
        let url = serve("$12.5", issuer.clone()).await;

        let resp = no_redirects()
            .post(format!("{}/upload", url))
            .multipart(form())
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 303);
        assert_eq!(resp.headers()["location"], "/fail.html");
        assert!(issuer.values().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_file() {
        let url = serve("$1", RecordingIssuer::new()).await;

        let resp = no_redirects()
            .post(format!("{}/upload", url))
            .multipart(Form::new().text("note", "nothing attached"))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_static_pages_and_health() {
        let url = serve("$1", RecordingIssuer::new()).await;

        let index = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(index.contains("class=\"dropbox\""));
        assert!(index.contains("class=\"loader\""));

        let health = reqwest::get(format!("{}/health", url)).await.unwrap().text().await.unwrap();
        assert_eq!(health, "ok token=unreachable");
    }
}
