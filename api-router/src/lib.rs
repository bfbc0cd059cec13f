use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    documents::{delete_document, list_documents, upload_document},
    liveness::live,
    query::{ask, history, voice},
    readiness::ready,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let upload_limit = DefaultBodyLimit::max(app_state.config.upload_max_body_bytes);

    // Protected API endpoints (require auth)
    let protected = Router::new()
        .route(
            "/documents/upload",
            post(upload_document).layer(upload_limit.clone()),
        )
        .route("/documents/list", get(list_documents))
        .route("/documents/{id}", delete(delete_document))
        .route("/query/ask", post(ask))
        .route("/query/voice", post(voice).layer(upload_limit))
        .route("/query/history/{session_id}", get(history))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
