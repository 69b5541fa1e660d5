use std::sync::Arc;

use axum::Router;

use crate::encodings::Encodings;
use crate::gee::EeClient;
use crate::model::SocModel;

mod extract;
mod health;
mod predict;

// ---

/// Shared state for the prediction API: the platform client and the
/// immutable artifacts, loaded once at startup.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub gee: Arc<EeClient>,
    pub model: Arc<SocModel>,
    pub encodings: Arc<Encodings>,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(predict::router())
        .merge(extract::router())
        .merge(health::router())
        .with_state(state)
}
