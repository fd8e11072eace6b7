use axum::Router;

pub mod catalog;
pub mod intake;
pub mod quality;
pub mod requests;
pub mod stock;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/intake", intake::router())
        .nest("/quality", quality::router())
        .nest("/stock", stock::router())
        .nest("/requests", requests::router())
        .nest("/catalog", catalog::router())
}
