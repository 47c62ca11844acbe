// Fraud Scan - Web Server
// REST API with Axum: accounts, bank linking, fraud detection

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fraud_scan::{
    authenticate, exchange_setup_token, register_user, summarize_account, AccountStore, AuthError,
    BankDataSource, DetectionEngine, DetectionError, EngineConfig, FixtureSource, SimpleFinSource,
    SqliteAccountStore, UserRecord,
};

const SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteAccountStore>>,
    engine: Arc<DetectionEngine>,
    source: Arc<dyn BankDataSource>,
    setup_http: reqwest::blocking::Client,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Error response: status + message
struct ApiError(StatusCode, String);

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError(status, message) = self;
        if status.is_server_error() {
            error!(%status, "{}", message);
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DetectionError> for ApiError {
    fn from(err: DetectionError) -> Self {
        let status = match &err {
            DetectionError::MalformedInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DetectionError::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
            DetectionError::ClassifierUnavailable(_) | DetectionError::ClassifierResponseInvalid(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        ApiError(status, err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::UnknownUser => StatusCode::NOT_FOUND,
            AuthError::IncorrectPassword => StatusCode::FORBIDDEN,
            AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(format!("{:#}", err))
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
struct AuthDetails {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct AuthRequest {
    auth_details: AuthDetails,
}

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    friendly_name: String,
}

#[derive(Deserialize)]
struct SetupSourceRequest {
    auth_details: AuthDetails,
    setup_token: String,
}

#[derive(Deserialize)]
struct DetectRequest {
    transactions: Vec<Value>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

// ============================================================================
// Helpers
// ============================================================================

/// Run blocking work (SQLite, blocking HTTP, detection) off the async executor
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::internal(format!("worker failed: {}", e)))?
}

fn authorize(state: &AppState, auth: &AuthDetails) -> Result<UserRecord, ApiError> {
    let store = state
        .store
        .lock()
        .map_err(|_| ApiError::internal("account store lock poisoned"))?;
    Ok(authenticate(&*store, &auth.username, &auth.password)?)
}

fn linked_handle(user: &UserRecord) -> Result<String, ApiError> {
    user.access_handle.clone().ok_or_else(|| {
        ApiError(
            StatusCode::BAD_REQUEST,
            format!("{} has not linked a bank yet", user.username),
        )
    })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/detect - Run detection over raw transactions in the body
async fn detect(
    State(state): State<AppState>,
    Json(request): Json<DetectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = blocking(move || Ok(state.engine.scan_raw(&request.transactions)?)).await?;
    Ok(Json(ApiResponse::ok(report)))
}

/// POST /api/users - Create a user
async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(move || {
        let store = state
            .store
            .lock()
            .map_err(|_| ApiError::internal("account store lock poisoned"))?;
        Ok(register_user(&*store, &request.username, &request.password, &request.friendly_name)?)
    })
    .await?;

    info!(username = %user.username, "user created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(user))))
}

/// POST /api/credential_check - Verify credentials
async fn credential_check(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(move || authorize(&state, &request.auth_details)).await?;

    Ok(Json(ApiResponse::ok(MessageResponse {
        message: format!("Authenticated {} successfully!", user.friendly_name),
    })))
}

/// POST /api/setup_source - Exchange a bank setup token and store the access handle
async fn setup_source(
    State(state): State<AppState>,
    Json(request): Json<SetupSourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = blocking(move || {
        let user = authorize(&state, &request.auth_details)?;
        let access_handle = exchange_setup_token(&state.setup_http, &request.setup_token)?;

        let store = state
            .store
            .lock()
            .map_err(|_| ApiError::internal("account store lock poisoned"))?;
        store.set_access_handle(&user.username, &access_handle)?;
        Ok(user.username)
    })
    .await?;

    info!(%username, "bank linked");
    Ok(Json(ApiResponse::ok(MessageResponse {
        message: format!("Linked bank data source for {} successfully!", username),
    })))
}

/// POST /api/summary - Primary account summary
async fn account_summary(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = blocking(move || {
        let user = authorize(&state, &request.auth_details)?;
        let accounts = state.source.fetch_accounts(&linked_handle(&user)?)?;
        Ok(summarize_account(&accounts)?)
    })
    .await?;

    Ok(Json(ApiResponse::ok(summary)))
}

/// POST /api/scan - Fetch the caller's transactions and run detection
async fn scan(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = blocking(move || {
        let user = authorize(&state, &request.auth_details)?;
        let raw = state.source.fetch_transactions(&linked_handle(&user)?)?;
        Ok(state.engine.scan_raw(&raw)?)
    })
    .await?;

    Ok(Json(ApiResponse::ok(report)))
}

// ============================================================================
// Main Server
// ============================================================================

/// Blocking HTTP clients must be built outside the async executor
fn build_state(config: &EngineConfig) -> anyhow::Result<AppState> {
    let store = SqliteAccountStore::open(&config.database_path)?;
    info!(path = %config.database_path.display(), "account store opened");

    let engine = DetectionEngine::from_config(config)?;
    info!(classifier = engine.classifier_name(), "detection engine ready");

    let source: Arc<dyn BankDataSource> = match &config.fixture_path {
        Some(path) => {
            info!(path = %path.display(), "serving mock bank data");
            Arc::new(FixtureSource::new(path))
        }
        None => Arc::new(SimpleFinSource::new(SOURCE_TIMEOUT)?),
    };

    let setup_http = reqwest::blocking::Client::builder()
        .timeout(SOURCE_TIMEOUT)
        .build()?;

    Ok(AppState {
        store: Arc::new(Mutex::new(store)),
        engine: Arc::new(engine),
        source,
        setup_http,
    })
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fraud_scan=info,fraud_server=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("🌐 Fraud Scan - Web Server");

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    let addr = config.bind_addr.clone();

    let state = match tokio::task::spawn_blocking(move || build_state(&config)).await {
        Ok(Ok(state)) => state,
        Ok(Err(e)) => {
            error!("Failed to start: {:#}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Startup task failed: {}", e);
            std::process::exit(1);
        }
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/detect", post(detect))
        .route("/users", post(create_user))
        .route("/credential_check", post(credential_check))
        .route("/setup_source", post(setup_source))
        .route("/summary", post(account_summary))
        .route("/scan", post(scan))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!("🚀 Server running on http://{}", addr);
    info!("   API: http://{}/api/health", addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
