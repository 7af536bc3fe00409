//! HTTP and WebSocket API gateway for Kindred.
//!
//! Exposes account, companion, history, and knowledge REST endpoints plus
//! the streaming chat WebSocket. Built on Axum; all heavyweight services
//! (provider client, chat engine, ingestion worker) are constructed once at
//! startup and injected by `Arc` — initialization failure aborts startup
//! instead of surfacing per-request.

pub mod auth;
pub mod chat_ws;
pub mod companions;
pub mod error;
pub mod knowledge;

use auth::JwtKeys;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use kindred_chat::{ChatEngine, EngineConfig};
use kindred_config::AppConfig;
use kindred_core::cache::CacheStore;
use kindred_core::storage::Storage;
use kindred_core::vector::VectorIndex;
use kindred_ingest::{IngestWorker, JobQueue};
use kindred_intent::IntentAnalyzer;
use kindred_memory::{InMemoryCache, RedisCache, SessionMemory};
use kindred_retrieval::{KnowledgeRetriever, SqliteVectorIndex};
use kindred_storage::SqliteStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared application state for the gateway.
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<dyn Storage>,
    pub engine: Arc<ChatEngine>,
    pub memory: Arc<SessionMemory>,
    pub index: Arc<dyn VectorIndex>,
    pub jobs: JobQueue,
    pub keys: JwtKeys,
}

pub type SharedState = Arc<AppState>;

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/companions",
            post(companions::create_handler).get(companions::list_handler),
        )
        .route(
            "/companions/{id}",
            get(companions::get_handler)
                .patch(companions::update_handler)
                .delete(companions::delete_handler),
        )
        .route(
            "/companions/{id}/knowledge/upload",
            post(knowledge::upload_handler),
        )
        .route("/companions/{id}/knowledge", get(knowledge::list_handler))
        .route("/knowledge/{file_id}", delete(knowledge::delete_handler))
        .route("/messages/{companion_id}", get(chat_ws::history_handler))
        .route("/ws/{companion_id}", get(chat_ws::ws_handler))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // uploads included
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build every subsystem once and start serving.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    // === Backing stores ===
    let storage: Arc<dyn Storage> = Arc::new(SqliteStore::new(&config.database_url).await?);
    let index: Arc<dyn VectorIndex> =
        Arc::new(SqliteVectorIndex::new(&config.vector_database_url).await?);

    let cache: Arc<dyn CacheStore> = match &config.cache.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).await?),
        None => {
            info!("No Redis configured, using the in-process session cache");
            Arc::new(InMemoryCache::new())
        }
    };

    // === Shared services, constructed once ===
    let provider = kindred_providers::build_from_config(&config);

    let memory = Arc::new(SessionMemory::new(
        cache,
        config.chat.memory_window,
        Duration::from_secs(config.chat.memory_ttl_secs),
    ));
    let retriever = Arc::new(KnowledgeRetriever::new(
        provider.clone(),
        index.clone(),
        config.llm.embedding_model.clone(),
        config.chat.retrieval_top_k,
    ));
    let analyzer = Arc::new(
        IntentAnalyzer::new(
            provider.clone(),
            config.llm.classifier_model.clone(),
            config.llm.classifier_temperature,
        )
        .with_history_window(config.chat.classifier_history_window),
    );

    let engine = Arc::new(ChatEngine::new(
        storage.clone(),
        memory.clone(),
        retriever,
        analyzer,
        provider.clone(),
        EngineConfig {
            chat_model: config.llm.chat_model.clone(),
            chat_temperature: config.llm.chat_temperature,
            max_reply_tokens: config.llm.max_reply_tokens,
            confidence_gate: config.chat.confidence_gate,
        },
    ));

    let worker = Arc::new(IngestWorker::new(
        storage.clone(),
        index.clone(),
        provider,
        config.llm.embedding_model.clone(),
        config.ingest.chunk_size,
        config.ingest.chunk_overlap,
        config.ingest.embed_batch_size,
    ));
    let jobs = JobQueue::start(worker);

    let jwt_secret = config.auth.jwt_secret.clone().unwrap_or_else(|| {
        warn!("auth.jwt_secret not set — using an ephemeral secret, tokens will not survive restarts");
        Uuid::new_v4().to_string()
    });
    let keys = JwtKeys::new(&jwt_secret, config.auth.token_ttl_minutes);

    let state = Arc::new(AppState {
        config,
        storage,
        engine,
        memory,
        index,
        jobs,
        keys,
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use kindred_core::error::ProviderError;
    use kindred_core::provider::{
        EmbeddingRequest, EmbeddingResponse, PromptMessage, Provider, ProviderRequest,
        ProviderResponse, StreamChunk,
    };
    use tower::ServiceExt;

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: PromptMessage::assistant(
                    r#"{"primary_intent": "casual_chat", "confidence": 0.9}"#,
                ),
                usage: None,
                model: "stub".into(),
                metadata: serde_json::Map::new(),
            })
        }

        async fn stream(
            &self,
            _request: ProviderRequest,
        ) -> Result<
            tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
            ProviderError,
        > {
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: Some("Hello!".into()),
                        done: false,
                        usage: None,
                    }))
                    .await;
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: None,
                        done: true,
                        usage: None,
                    }))
                    .await;
            });
            Ok(rx)
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: request.inputs.iter().map(|_| vec![1.0, 0.0]).collect(),
                model: request.model,
                usage: None,
            })
        }
    }

    async fn test_state() -> SharedState {
        let mut config = AppConfig::default();
        config.ingest.upload_dir = tempfile::tempdir().unwrap().keep().display().to_string();

        let storage: Arc<dyn Storage> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let index: Arc<dyn VectorIndex> =
            Arc::new(SqliteVectorIndex::in_memory().await.unwrap());
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
        let provider: Arc<dyn Provider> = Arc::new(StubProvider);

        let memory = Arc::new(SessionMemory::new(cache, 30, Duration::from_secs(3600)));
        let retriever = Arc::new(KnowledgeRetriever::new(
            provider.clone(),
            index.clone(),
            "stub",
            3,
        ));
        let analyzer = Arc::new(IntentAnalyzer::new(provider.clone(), "stub", 0.1));

        let engine = Arc::new(ChatEngine::new(
            storage.clone(),
            memory.clone(),
            retriever,
            analyzer,
            provider.clone(),
            EngineConfig {
                chat_model: "stub".into(),
                chat_temperature: 0.7,
                max_reply_tokens: 256,
                confidence_gate: 0.4,
            },
        ));

        let worker = Arc::new(IngestWorker::new(
            storage.clone(),
            index.clone(),
            provider,
            "stub",
            1000,
            200,
            100,
        ));
        let jobs = JobQueue::start(worker);

        Arc::new(AppState {
            config,
            storage,
            engine,
            memory,
            index,
            jobs,
            keys: JwtKeys::new("test-secret", 60),
        })
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Register a user and return (token, user_id).
    async fn register_and_login(app: &Router, email: &str) -> (String, Uuid) {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                serde_json::json!({"email": email, "password": "a strong password"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let user = body_json(response).await;
        let user_id = Uuid::parse_str(user["id"].as_str().unwrap()).unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                serde_json::json!({"email": email, "password": "a strong password"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await["access_token"]
            .as_str()
            .unwrap()
            .to_string();

        (token, user_id)
    }

    async fn create_companion(app: &Router, token: &str) -> Uuid {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/companions",
                Some(token),
                serde_json::json!({
                    "name": "Luna",
                    "description": "a gentle companion",
                    "instructions": "You are Luna.",
                    "seed": "User: hi\nLuna: hello!"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        Uuid::parse_str(body_json(response).await["id"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state().await);
        let response = app.oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_login_me_flow() {
        let app = build_router(test_state().await);
        let (token, user_id) = register_and_login(&app, "me@example.com").await;

        let response = app
            .clone()
            .oneshot(get_request("/api/v1/auth/me", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = body_json(response).await;
        assert_eq!(me["id"], user_id.to_string());
        assert_eq!(me["email"], "me@example.com");
        // The password hash never leaves the server
        assert!(me.get("hashed_password").is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let app = build_router(test_state().await);
        register_and_login(&app, "dup@example.com").await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                serde_json::json!({"email": "dup@example.com", "password": "a strong password"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = build_router(test_state().await);
        register_and_login(&app, "secure@example.com").await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                serde_json::json!({"email": "secure@example.com", "password": "wrong"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let app = build_router(test_state().await);

        let response = app
            .clone()
            .oneshot(get_request("/api/v1/auth/me", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(get_request("/api/v1/companions", Some("not.a.jwt")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn companion_crud_flow() {
        let app = build_router(test_state().await);
        let (token, _) = register_and_login(&app, "owner@example.com").await;
        let companion_id = create_companion(&app, &token).await;

        // List shows it
        let response = app
            .clone()
            .oneshot(get_request("/api/v1/companions", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        // Partial update
        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/api/v1/companions/{companion_id}"),
                Some(&token),
                serde_json::json!({"instructions": "You are Luna, playful."}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["instructions"], "You are Luna, playful.");
        assert_eq!(updated["name"], "Luna");

        // Unknown companion is 404, not a generic error
        let response = app
            .clone()
            .oneshot(get_request(
                &format!("/api/v1/companions/{}", Uuid::new_v4()),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ownership_is_enforced_distinctly_from_not_found() {
        let app = build_router(test_state().await);
        let (owner_token, _) = register_and_login(&app, "alice@example.com").await;
        let (intruder_token, _) = register_and_login(&app, "mallory@example.com").await;
        let companion_id = create_companion(&app, &owner_token).await;

        for (method, uri, body) in [
            ("GET", format!("/api/v1/companions/{companion_id}"), None),
            (
                "PATCH",
                format!("/api/v1/companions/{companion_id}"),
                Some(serde_json::json!({"name": "Mine now"})),
            ),
            ("DELETE", format!("/api/v1/companions/{companion_id}"), None),
            ("GET", format!("/api/v1/messages/{companion_id}"), None),
            (
                "GET",
                format!("/api/v1/companions/{companion_id}/knowledge"),
                None,
            ),
        ] {
            let request = match body {
                Some(body) => json_request(method, &uri, Some(&intruder_token), body),
                None => {
                    let mut builder = Request::builder().method(method).uri(&uri);
                    builder = builder
                        .header(header::AUTHORIZATION, format!("Bearer {intruder_token}"));
                    builder.body(Body::empty()).unwrap()
                }
            };
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(
                response.status(),
                StatusCode::FORBIDDEN,
                "{method} {uri} should be forbidden"
            );
        }
    }

    #[tokio::test]
    async fn empty_history_and_empty_knowledge_base() {
        let app = build_router(test_state().await);
        let (token, _) = register_and_login(&app, "fresh@example.com").await;
        let companion_id = create_companion(&app, &token).await;

        let response = app
            .clone()
            .oneshot(get_request(
                &format!("/api/v1/messages/{companion_id}"),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.as_array().unwrap().is_empty());

        let response = app
            .oneshot(get_request(
                &format!("/api/v1/companions/{companion_id}/knowledge"),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let knowledge = body_json(response).await;
        assert_eq!(knowledge["status"], "EMPTY");
        assert!(knowledge["files"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_companion_cascades_and_is_then_not_found() {
        let state = test_state().await;
        let app = build_router(state.clone());
        let (token, user_id) = register_and_login(&app, "gone@example.com").await;
        let companion_id = create_companion(&app, &token).await;

        // Seed a vector and a memory entry so deletion has something to clean.
        state
            .index
            .upsert(vec![kindred_core::vector::VectorRecord {
                id: "seed_0".into(),
                companion_id,
                file_id: Uuid::new_v4(),
                file_name: "seed.txt".into(),
                chunk_index: 0,
                text: "seeded".into(),
                embedding: vec![1.0, 0.0],
            }])
            .await
            .unwrap();
        state
            .memory
            .save(
                companion_id,
                user_id,
                &[kindred_core::message::Turn::user("remember me")],
            )
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot({
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/v1/companions/{companion_id}"))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap()
            })
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Vectors, memory, and the row are all gone.
        assert!(
            state
                .index
                .query(&[1.0, 0.0], companion_id, 10)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(state.memory.load(companion_id, user_id).await.is_empty());

        let response = app
            .oneshot(get_request(
                &format!("/api/v1/companions/{companion_id}"),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_route_rejects_plain_http() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(get_request(
                &format!("/api/v1/ws/{}?token=whatever", Uuid::new_v4()),
                None,
            ))
            .await
            .unwrap();
        // No upgrade headers — the handshake is refused before auth runs.
        assert_ne!(response.status(), StatusCode::OK);
    }
}
