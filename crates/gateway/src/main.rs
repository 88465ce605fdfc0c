//! MenuChat API Gateway
//!
//! The HTTP entry point for chat and conversation management.
//! Handles:
//! - Request routing and validation
//! - Wiring the chat pipeline to its providers and the database
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    http::StatusCode,
    routing::{delete, get, post, put},
    Router,
};
use menuchat_common::{
    chat::{self, ChatPipeline, ConversationService},
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, PgVectorSearch, Repository},
    embeddings::create_embedder,
    llm::LlmBackend,
    metrics,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Absent when the conversation store is not database-backed
    pub db: Option<DbPool>,
    pub service: ConversationService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting MenuChat API Gateway v{}",
        menuchat_common::VERSION
    );

    init_metrics(&config.observability)?;

    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }

    let repository = Arc::new(Repository::new(db.clone()));
    let embedder = create_embedder(&config.embedding)?;
    info!(
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedder ready"
    );
    let search = PgVectorSearch::new(db.clone(), embedder, &config.retrieval.table)?;
    let llm = LlmBackend::from_config(&config.llm)?;
    let template = chat::answer_template(&config.chat)?;

    let pipeline = ChatPipeline::new(
        repository.clone(),
        Arc::new(llm),
        Arc::new(search),
        template,
    );
    let service = ConversationService::new(repository, Arc::new(pipeline));

    let state = AppState {
        config: config.clone(),
        db: Some(db),
        service,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::LLM_LATENCY_BUCKETS,
        )?
        .install()?;

    metrics::register_metrics();
    info!(port = config.metrics_port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let timeout =
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, state.config.request_timeout());

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/chat", post(handlers::chat::chat))
        .route("/conversations", post(handlers::conversations::create_conversation))
        .route(
            "/conversations/user/{user_id}",
            get(handlers::conversations::list_user_conversations),
        )
        .route(
            "/conversations/add/message",
            post(handlers::conversations::add_message),
        )
        .route(
            "/conversations/{conversation_id}",
            delete(handlers::conversations::delete_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(handlers::conversations::list_messages),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}",
            put(handlers::conversations::update_message),
        )
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use menuchat_common::chat::{InMemoryConversationStore, PromptTemplate, RetrievedDocument, VectorSearch};
    use menuchat_common::errors::Result;
    use menuchat_common::llm::TextGenerator;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Canned;

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(r#"{"message": "Try the dal", "suggestions": [{"name": "Dal"}]}"#.to_string())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    struct Menu;

    #[async_trait]
    impl VectorSearch for Menu {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedDocument>> {
            let metadata = json!({"dish_name": "Dal", "image_url": "http://img/dal.jpg"});
            let metadata = metadata.as_object().cloned().unwrap_or_default();
            Ok(vec![RetrievedDocument::new("Dal: lentils", metadata)])
        }
    }

    fn app() -> Router {
        let store = Arc::new(InMemoryConversationStore::new());
        let pipeline = ChatPipeline::new(
            store.clone(),
            Arc::new(Canned),
            Arc::new(Menu),
            PromptTemplate::new("{context}\n{question}"),
        );
        create_router(AppState {
            config: Arc::new(AppConfig::default()),
            db: None,
            service: ConversationService::new(store, Arc::new(pipeline)),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_and_ready_without_database() {
        let app = app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["database"]["status"], "skipped");
    }

    #[tokio::test]
    async fn test_chat_creates_conversation_and_enriches_answer() {
        let app = app();
        let (status, body) = send(&app, "POST", "/chat", Some(json!({"question": "Lentils?"}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["message"], "Try the dal");
        assert_eq!(body["data"]["suggestions"][0]["imageUrl"], "http://img/dal.jpg");

        let id = body["data"]["conversationId"].as_str().unwrap().to_string();
        let (status, body) = send(&app, "GET", &format!("/conversations/{}/messages", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_question() {
        let app = app();
        let (status, body) = send(&app, "POST", "/chat", Some(json!({"question": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_chat_unknown_conversation_is_404() {
        let app = app();
        let request = json!({"question": "Hi", "conversationId": uuid::Uuid::new_v4()});
        let (status, body) = send(&app, "POST", "/chat", Some(request)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "CONVERSATION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_conversation_lifecycle() {
        let app = app();
        let user_id = uuid::Uuid::new_v4();

        let (status, body) = send(
            &app,
            "POST",
            "/conversations",
            Some(json!({"name": "Dinner", "user_id": user_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            "/conversations/add/message",
            Some(json!({"conversation_id": id, "content": "Table for two", "role": "user"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let message_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/conversations/{}/messages/{}", id, message_id),
            Some(json!({"feedback": {"upvote": true}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["feedback"]["upvote"], true);

        let (_, body) = send(&app, "GET", &format!("/conversations/user/{}", user_id), None).await;
        let conversations = body["data"]["conversations"].as_array().unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0]["name"], "Table for two");

        let (status, body) = send(&app, "DELETE", &format!("/conversations/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], "CONVERSATION_DELETED_SUCCESSFULLY");

        let (status, body) = send(&app, "DELETE", &format!("/conversations/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "CONVERSATION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_add_message_rejects_unknown_role() {
        let app = app();
        let request = json!({"conversation_id": uuid::Uuid::new_v4(), "content": "x", "role": "robot"});
        let (status, _) = send(&app, "POST", "/conversations/add/message", Some(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
