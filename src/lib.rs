pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::intake::IntakeService;
use crate::services::storage::StorageService;
use crate::services::storage_lifecycle::StorageLifecycleService;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Allowance for multipart boundaries, part headers and the text field.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::analyze::analyze_images,
        api::handlers::health::health_check,
        api::handlers::admin::trigger_cleanup,
        api::handlers::admin::upload_status,
    ),
    components(
        schemas(
            services::intake::AnalysisOutcome,
            services::storage_lifecycle::UploadDirStatus,
            api::handlers::health::HealthResponse,
            api::handlers::admin::SweepResponse,
            api::error::FileRejection,
            models::ErrorKind,
        )
    ),
    tags(
        (name = "analyze", description = "Image upload and analysis"),
        (name = "system", description = "Health endpoints"),
        (name = "admin", description = "Manual upload directory maintenance")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageService>,
    pub lifecycle: Arc<StorageLifecycleService>,
    pub intake: Arc<IntakeService>,
    pub config: UploadConfig,
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_file_size
        .saturating_mul(state.config.max_files)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/analyze",
            post(api::handlers::analyze::analyze_images)
                .layer(axum::extract::DefaultBodyLimit::max(body_limit)),
        );

    if state.config.enable_admin_endpoints {
        router = router
            .route("/admin/cleanup", post(api::handlers::admin::trigger_cleanup))
            .route(
                "/admin/uploads/status",
                get(api::handlers::admin::upload_status),
            );
    }

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
