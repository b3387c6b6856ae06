use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::handlers::{admin, lookup, Ctx};

/// Initialize HTTP routes.
pub fn init_handlers(ctx: Arc<Ctx>) -> Router {
    // Public API routes.
    let pub_routes = Router::new()
        .route("/api/health", get(admin::health))
        .route("/api/lookup/{lang}/{word}", get(lookup::lookup))
        .route("/api/search/{lang}/{q}", get(lookup::search))
        .route("/api/popular/{lang}", get(lookup::popular));

    // Admin (requires auth).
    let admin_routes = Router::new()
        .route("/api/corpus/{lang}", put(admin::reload_corpus))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    Router::new()
        .merge(pub_routes)
        .merge(admin_routes)
        .with_state(ctx)
}

/// BasicAuth middleware checks for admin username & password defined in ctx constants.
async fn auth_middleware(
    State(ctx): State<Arc<Ctx>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if validate_basic_auth(
        request.headers(),
        &ctx.consts.admin_username,
        &ctx.consts.admin_password,
    ) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"lexicache\"")],
        "unauthorized",
    )
        .into_response()
}

/// Validate BasicAuth credentials from request headers. Empty configured
/// credentials never match.
fn validate_basic_auth(headers: &header::HeaderMap, username: &str, password: &str) -> bool {
    if username.is_empty() || password.is_empty() {
        return false;
    }

    let check = || {
        let hdr = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let decoded = base64_decode(hdr.strip_prefix("Basic ")?).ok()?;
        let (user, pass) = decoded.split_once(':')?;
        Some(user == username && pass == password)
    };
    check().unwrap_or(false)
}

fn base64_decode(s: &str) -> Result<String, ()> {
    let bytes = STANDARD.decode(s).map_err(|_| ())?;
    String::from_utf8(bytes).map_err(|_| ())
}
