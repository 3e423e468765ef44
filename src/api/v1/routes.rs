/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - route ごとの認可 policy を route_layer で適用 (read / write)
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    api::v1::{
        handlers::{
            health::health,
            volcanoes::{find_volcano, list_volcanoes, update_volcano},
        },
        policies,
    },
    middleware::auth::access,
    state::AppState,
};

pub fn routes(state: AppState) -> Router<AppState> {
    let read = Router::new()
        .route("/volcanoes", get(list_volcanoes).post(list_volcanoes))
        .route("/volcano", get(find_volcano).post(find_volcano));
    let read = access::require(read, state.clone(), policies::read());

    let write = Router::new().route("/volcanoes/update", post(update_volcano));
    let write = access::require(write, state, policies::write());

    Router::new()
        .route("/health", get(health))
        .merge(read)
        .merge(write)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::{
        app::build_router,
        config::Config,
        repos::volcano_repo::InMemoryVolcanoStore,
        services::auth::test_support::{self, API_AUDIENCE, FakeSource, ISSUER, KID_A, gate_over},
        state::AppState,
    };

    fn app() -> (axum::Router, Arc<FakeSource>) {
        let source = Arc::new(FakeSource::new(&[KID_A]));
        let state = AppState::new(
            Arc::new(InMemoryVolcanoStore::new()),
            Arc::new(gate_over(source.clone())),
        );
        let config = Config::from_lookup(|key| match key {
            "AZURE_AD_INSTANCE" => Some("test-tenant".into()),
            "AZURE_AD_CLIENT_ID" => Some(test_support::CLIENT_ID.into()),
            _ => None,
        })
        .unwrap();
        (build_router(state, &config), source)
    }

    fn token_with_roles(roles: &[&str]) -> String {
        let mut claims = test_support::claims(ISSUER, API_AUDIENCE, 300);
        claims["roles"] = json!(roles);
        test_support::sign(Some(KID_A), &claims)
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_bytes(res: Response) -> Vec<u8> {
        to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn body_json(res: Response) -> Value {
        serde_json::from_slice(&body_bytes(res).await).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let (app, source) = app();
        let res = app
            .oneshot(request("GET", "/api/v1/health", None, None))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
        assert_eq!(res.headers()["x-content-type-options"], "nosniff");
        assert_eq!(body_json(res).await, json!({"status": "ok"}));
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn missing_token_is_bare_401() {
        let (app, source) = app();
        let res = app
            .oneshot(request("GET", "/api/v1/volcanoes", None, None))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(body_bytes(res).await.is_empty());
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn lowercase_bearer_scheme_is_401() {
        let (app, _) = app();
        let token = token_with_roles(&["Data.Read"]);
        let req = Request::builder()
            .uri("/api/v1/volcanoes")
            .header(header::AUTHORIZATION, format!("bearer {token}"))
            .body(Body::empty())
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn read_role_lists_volcanoes() {
        let (app, _) = app();
        let token = token_with_roles(&["Data.Read"]);

        for method in ["GET", "POST"] {
            let res = app
                .clone()
                .oneshot(request(method, "/api/v1/volcanoes", Some(&token), None))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK, "{method}");
            assert_eq!(body_json(res).await, json!([]));
        }
    }

    #[tokio::test]
    async fn guest_role_is_401() {
        let (app, _) = app();
        let token = token_with_roles(&["Guest"]);
        let res = app
            .oneshot(request("GET", "/api/v1/volcanoes", Some(&token), None))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(body_bytes(res).await.is_empty());
    }

    #[tokio::test]
    async fn write_requires_read_write_role() {
        let (app, _) = app();
        let body = json!({ "VolcanoName": "Hekla", "Country": "Iceland" });

        let read_only = token_with_roles(&["Data.Read"]);
        let res = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/volcanoes/update",
                Some(&read_only),
                Some(body.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let writer = token_with_roles(&["Data.ReadWrite"]);
        let res = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/volcanoes/update",
                Some(&writer),
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let stored = body_json(res).await;
        assert_eq!(stored["VolcanoName"], "Hekla");
        assert_eq!(stored["Country"], "Iceland");
        assert!(stored["id"].as_str().is_some_and(|id| !id.is_empty()));

        let res = app
            .oneshot(request("GET", "/api/v1/volcanoes", Some(&read_only), None))
            .await
            .unwrap();
        assert_eq!(body_json(res).await, json!([stored]));
    }

    #[tokio::test]
    async fn search_matches_exact_name() {
        let (app, _) = app();
        let writer = token_with_roles(&["Data.ReadWrite"]);
        for name in ["Hekla", "Katla"] {
            let res = app
                .clone()
                .oneshot(request(
                    "POST",
                    "/api/v1/volcanoes/update",
                    Some(&writer),
                    Some(json!({ "VolcanoName": name })),
                ))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let reader = token_with_roles(&["Data.Read"]);
        let res = app
            .clone()
            .oneshot(request(
                "GET",
                "/api/v1/volcano?volcanoname=Katla",
                Some(&reader),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let found = body_json(res).await;
        assert_eq!(found.as_array().map(Vec::len), Some(1));
        assert_eq!(found[0]["VolcanoName"], "Katla");

        // parameter name is case-insensitive, value is not
        let res = app
            .oneshot(request(
                "POST",
                "/api/v1/volcano?VolcanoName=katla",
                Some(&reader),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!([]));
    }

    #[tokio::test]
    async fn blank_search_term_is_404_only_after_auth() {
        let (app, _) = app();

        let res = app
            .clone()
            .oneshot(request("GET", "/api/v1/volcano?volcanoname=", None, None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let reader = token_with_roles(&["Data.Read"]);
        for uri in ["/api/v1/volcano", "/api/v1/volcano?volcanoname=%20%20"] {
            let res = app
                .clone()
                .oneshot(request("GET", uri, Some(&reader), None))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
            assert!(body_bytes(res).await.is_empty(), "{uri}");
        }
    }

    #[tokio::test]
    async fn invalid_documents_are_400() {
        let (app, _) = app();
        let writer = token_with_roles(&["Data.ReadWrite"]);

        let res = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/volcanoes/update",
                Some(&writer),
                Some(json!({ "VolcanoName": " " })),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"]["code"], "INVALID_VOLCANO");

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/volcanoes/update")
            .header(header::AUTHORIZATION, format!("Bearer {writer}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"]["code"], "INVALID_JSON");
    }

    #[tokio::test]
    async fn metadata_outage_is_401_not_500() {
        let (app, source) = app();
        source.set_failing(true);

        let token = token_with_roles(&["Data.Read"]);
        let res = app
            .oneshot(request("GET", "/api/v1/volcanoes", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(body_bytes(res).await.is_empty());
        assert_eq!(source.fetches(), 1);
    }
}
