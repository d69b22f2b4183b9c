use askama::Template;
use axum::{
    extract::State,
    response::Html,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::analytics::{INSTALLED_CAPACITY_KW, OPTIMAL_OUTPUT_KW};
use crate::ml::features::FeatureSpec;
use crate::ml::FEATURE_SPECS;
use super::{api, ApiError, AppState};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Dashboard page
        .route("/", get(serve_dashboard))
        // API endpoints
        .route("/api/health", get(api::health_check))
        .route("/api/schema", get(api::get_schema))
        .route("/api/model", get(api::get_model_info))
        .route("/api/importance", get(api::get_importance))
        .route("/api/forecast", post(api::post_forecast))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_dashboard_server(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Dashboard server starting on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Dashboard server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    features: &'static [FeatureSpec],
    capacity_kw: f64,
    optimal_low_kw: f64,
    optimal_high_kw: f64,
    n_trees: usize,
    trained_at: String,
}

async fn serve_dashboard(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let page = DashboardTemplate {
        features: &FEATURE_SPECS,
        capacity_kw: INSTALLED_CAPACITY_KW,
        optimal_low_kw: OPTIMAL_OUTPUT_KW.0,
        optimal_high_kw: OPTIMAL_OUTPUT_KW.1,
        n_trees: state.model.forest().n_trees(),
        trained_at: state.model.trained_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    };
    Ok(Html(page.render()?))
}
