use axum::Router;
use migration::MigratorTrait;
use sea_orm::Database;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::todo::api::TodoState;
use crate::todo::{InMemoryTodoStore, SeaOrmTodoStore, TodoStore};

pub mod api;

/// Builds the whole application: health check, JSON API and docs, traced and CORS-enabled.
pub fn create_app(todo_state: TodoState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(api::create_api_router(todo_state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Picks the record store from `config`: PostgreSQL through SeaORM when `DB_URL`
/// is set (pending migrations are applied first), otherwise an in-memory store.
pub async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn TodoStore>> {
    match &config.db_url {
        Some(db_url) => {
            let db = Database::connect(db_url).await?;
            migration::Migrator::up(&db, None).await?;
            tracing::info!("Database migrations applied successfully");
            Ok(Arc::new(SeaOrmTodoStore::new(db)))
        }
        None => {
            tracing::warn!("DB_URL is not set, todos are kept in memory and lost on exit");
            Ok(Arc::new(InMemoryTodoStore::new()))
        }
    }
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let store = connect_store(&config).await?;
    let todo_state = TodoState::new(store).with_page_size(config.page_size);
    let app = create_app(todo_state);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        create_app(TodoState::new(Arc::new(InMemoryTodoStore::new())))
    }

    async fn get(uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn can_check_health() {
        assert_eq!(get("/health").await, (StatusCode::OK, "OK".to_string()));
    }

    #[tokio::test]
    async fn can_serve_openapi_document() {
        let (status, body) = get(api::OPENAPI_PATH).await;
        assert_eq!(status, StatusCode::OK);
        let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(doc["paths"]["/api/todos/statistics/"].is_object());
    }

    #[tokio::test]
    async fn uses_in_memory_store_without_db_url() {
        let config = Config {
            db_url: None,
            port: 8080,
            page_size: 100,
        };
        let store = connect_store(&config).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
