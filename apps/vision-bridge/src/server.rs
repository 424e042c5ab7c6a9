//! Servidor HTTP

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use vision_db::collaborators::{AuthService, DetectionService};
use vision_db::VisionContext;

use crate::handlers;
use crate::session::SessionState;

/// Informações geradas em tempo de build
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Requisições simultâneas atendidas
const MAX_CONCURRENT_REQUESTS: usize = 64;

pub struct AppState {
    pub context: VisionContext,
    pub session: SessionState,
    pub detector: Arc<dyn DetectionService>,
    pub auth: Arc<dyn AuthService>,
    /// Janela padrão das estatísticas, em dias
    pub stats_days: u32,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        context: VisionContext,
        session: SessionState,
        detector: Arc<dyn DetectionService>,
        auth: Arc<dyn AuthService>,
        stats_days: u32,
    ) -> SharedState {
        Arc::new(Self {
            context,
            session,
            detector,
            auth,
            stats_days,
        })
    }
}

fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/session", get(handlers::current_session))
        .route("/detect", post(handlers::detect))
        .route(
            "/history",
            get(handlers::list_history)
                .post(handlers::add_history)
                .delete(handlers::clear_history),
        )
        .route("/history/:id", get(handlers::get_history_entry))
        .route("/patients", get(handlers::list_patients).post(handlers::create_patient))
        .route("/patients/current", get(handlers::current_patient))
        .route(
            "/patients/:id",
            get(handlers::get_patient)
                .put(handlers::update_patient)
                .delete(handlers::delete_patient),
        )
        .route("/patients/:id/analyses", get(handlers::patient_analyses))
        .route("/patients/:id/select", post(handlers::select_patient))
        .route("/stats/labels", get(handlers::label_stats))
        .route("/stats/classes", get(handlers::class_stats))
        .route("/stats/daily", get(handlers::daily_stats))
        .route("/stats/patients", get(handlers::patient_stats))
        .route("/stats/overview", get(handlers::overview_stats))
        .route("/notices", get(handlers::notices))
}

/// Monta o roteador completo com os middlewares globais
pub fn router(state: SharedState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS)),
        )
}

/// Atende até receber Ctrl+C
pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    info!("Servidor escutando em {}", addr);
    axum::Server::try_bind(&addr)
        .context(format!("Falha ao abrir {}", addr))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Falha no servidor HTTP")?;
    info!("Servidor encerrado");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Sinal de encerramento recebido");
    }
}
