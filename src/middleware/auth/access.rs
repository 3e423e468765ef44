//! Bearer token 検証 + role/scope policy 評価 → AuthCtx を extensions に入れる
//!
//! - policy は route ごとに固定 (`route_layer` で掛ける)
//! - 拒否理由は AuthGate 側でログに残し、レスポンスは常に body なしの 401

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::services::auth::AuthorizationPolicy;
use crate::state::AppState;

#[derive(Clone)]
struct AccessState {
    app: AppState,
    policy: Arc<AuthorizationPolicy>,
}

/// `router` の全 route に `policy` を要求する。
///
/// `route_layer` なので未定義パスは 404 のまま (認可は走らない)。
///
/// ```ignore
/// let read = Router::new().route("/volcanoes", get(list_volcanoes));
/// let read = middleware::auth::access::require(read, state.clone(), policies::read());
/// ```
pub fn require(
    router: Router<AppState>,
    state: AppState,
    policy: AuthorizationPolicy,
) -> Router<AppState> {
    let access = AccessState {
        app: state,
        policy: Arc::new(policy),
    };
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.route_layer(middleware::from_fn_with_state(access, access_middleware))
}

async fn access_middleware(
    State(access): State<AccessState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let principal = match access.app.auth.authorize(req.headers(), &access.policy).await {
        Ok(principal) => principal,
        Err(err) => {
            tracing::info!(
                method = %req.method(),
                path = %req.uri().path(),
                reason = err.kind(),
                "request unauthorized"
            );
            return Err(AppError::Unauthorized);
        }
    };

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(AuthCtx::new(principal));

    Ok(next.run(req).await)
}
