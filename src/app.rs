use std::net::SocketAddr;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{collections, foods, history};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(foods::router())
                .merge(history::router())
                .merge(collections::router()),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

/// Serve until the process is stopped. Peer addresses are exposed to
/// handlers for history rows.
pub async fn serve(app: Router, bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr.parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, config::DatabaseConfig, db::test_pool};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let config = Arc::new(AppConfig {
            database: DatabaseConfig {
                url: "sqlite::memory:".into(),
                max_connections: 1,
            },
            host: "127.0.0.1".into(),
            port: 0,
        });
        build_app(AppState::from_parts(test_pool().await, config))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn apple() -> Value {
        json!({
            "fdcId": 173944,
            "description": "Apples, raw",
            "dataType": "SR Legacy",
            "foodNutrients": [{"nutrientId": 1008, "amount": 52}],
            "foodPortions": [{"amount": 1, "modifier": "medium", "gramWeight": 182}]
        })
    }

    #[tokio::test]
    async fn save_then_duplicate() {
        let app = app().await;

        let (status, body) = send(&app, with_json("POST", "/api/foods", apple())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Food saved successfully");
        assert_eq!(body["duplicate"], false);
        assert_eq!(body["food"]["fdcId"], 173944);
        assert_eq!(body["food"]["nutrients"][0]["value"], 52.0);

        let (status, body) = send(&app, with_json("POST", "/api/foods", apple())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duplicate"], true);
        assert_eq!(body["message"], "Food already saved");
    }

    #[tokio::test]
    async fn bad_payloads_are_rejected() {
        let app = app().await;

        let (status, body) = send(
            &app,
            with_json("POST", "/api/foods", json!({"description": "no id"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No FDC ID found in food data");

        let req = Request::builder()
            .method("POST")
            .uri("/api/foods")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No food data provided");
    }

    #[tokio::test]
    async fn malformed_query_strings_get_json_errors() {
        let app = app().await;

        for uri in [
            "/api/foods?limit=abc",
            "/api/search?q=milk&limit=nope",
            "/api/categories/Branded?limit=1.5",
            "/api/history?limit=many",
        ] {
            let (status, body) = send(&app, get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            let message = body["error"].as_str().unwrap_or_default();
            assert!(message.starts_with("Invalid query parameters"), "{uri}: {body}");
        }
    }

    #[tokio::test]
    async fn read_update_delete_cycle() {
        let app = app().await;
        let (_, saved) = send(&app, with_json("POST", "/api/foods", apple())).await;
        let id = saved["food"]["id"].as_i64().unwrap();

        let (status, body) = send(&app, get(&format!("/api/foods/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Apples, raw");

        let (status, body) = send(&app, get("/api/foods/fdc/173944")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id);

        let (status, body) = send(&app, get(&format!("/api/foods/{id}/summary"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["calories"], 52.0);
        assert_eq!(body["fat"], Value::Null);

        let (status, body) = send(&app, get(&format!("/api/foods/{id}/raw"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, apple());

        let (status, body) = send(
            &app,
            with_json(
                "PUT",
                &format!("/api/foods/{id}"),
                json!({"description": "Apple", "fdc_id": 1}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated_fields"], json!(["description"]));
        assert_eq!(body["food"]["fdc_id"], 173944);

        let (status, _) = send(
            &app,
            with_json("PUT", &format!("/api/foods/{id}"), json!({"fdc_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/foods/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Food deleted successfully");

        let (status, body) = send(&app, get(&format!("/api/foods/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Food not found");
    }

    #[tokio::test]
    async fn listing_search_and_categories() {
        let app = app().await;
        send(&app, with_json("POST", "/api/foods", apple())).await;
        send(
            &app,
            with_json(
                "POST",
                "/api/foods",
                json!({"fdcId": 2, "description": "Organic Whole Milk", "dataType": "Branded"}),
            ),
        )
        .await;

        let (_, body) = send(&app, get("/api/foods")).await;
        assert_eq!(body["count"], 2);

        let (_, body) = send(&app, get("/api/search?q=MILK")).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["query"], "MILK");

        let (_, body) = send(&app, get("/api/foods?search=apples")).await;
        assert_eq!(body["count"], 1);

        let (_, body) = send(&app, get("/api/categories/Branded")).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["category"], "Branded");

        let (_, body) = send(&app, get("/api/foods?category=SR%20Legacy")).await;
        assert_eq!(body["count"], 1);

        let (status, body) = send(&app, get("/api/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_foods"], 2);
        assert_eq!(body["data_types"], 2);

        let (status, body) = send(&app, get("/api/nutrients")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (_, body) = send(&app, get("/api/history?limit=10")).await;
        let actions: Vec<&str> = body["history"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|h| h["action"].as_str())
            .collect();
        assert_eq!(actions.iter().filter(|a| **a == "search").count(), 2);
        assert_eq!(actions.iter().filter(|a| **a == "save").count(), 2);
    }

    #[tokio::test]
    async fn health_reports_database() {
        let app = app().await;
        let (status, body) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database_connected"], true);
        assert_eq!(body["foods_stored"], 0);
    }

    #[tokio::test]
    async fn collection_routes() {
        let app = app().await;
        let (_, saved) = send(&app, with_json("POST", "/api/foods", apple())).await;
        let food_id = saved["food"]["id"].as_i64().unwrap();

        let (status, created) = send(
            &app,
            with_json("POST", "/api/collections", json!({"name": "Snacks"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["color"], "#007aff");
        let cid = created["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            with_json("POST", "/api/collections", json!({"name": "Snacks"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let uri = format!("/api/collections/{cid}/foods");
        let (status, _) = send(&app, with_json("POST", &uri, json!({"food_id": food_id}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) =
            send(&app, with_json("POST", &uri, json!({"food_id": food_id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["already_member"], true);

        let (_, body) = send(&app, get(&uri)).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["collection"]["food_count"], 1);

        let (_, body) = send(&app, get("/api/collections")).await;
        assert_eq!(body["count"], 1);

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("{uri}/{food_id}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/collections/{cid}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }
}
