use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::todo::api::{self as todo_api, TodoState};
use crate::todo::{CreateTodo, Priority, TodoPatch, TodoStatistics};

pub const OPENAPI_PATH: &str = "/api/schema/openapi.json";
pub const DOCS_PATH: &str = "/api/docs";

#[derive(OpenApi)]
#[openapi(
    info(title = "Todos API", description = "Todo CRUD with filtering and statistics"),
    paths(
        todo_api::list_todos_handler,
        todo_api::create_todo_handler,
        todo_api::get_todo_handler,
        todo_api::update_todo_handler,
        todo_api::replace_todo_handler,
        todo_api::delete_todo_handler,
        todo_api::toggle_todo_handler,
        todo_api::bulk_delete_completed_handler,
        todo_api::statistics_handler,
    ),
    components(schemas(
        todo_api::TodoJson,
        todo_api::TodoPage,
        todo_api::DeletedCountResponse,
        todo_api::ErrorResponse,
        CreateTodo,
        TodoPatch,
        TodoStatistics,
        Priority,
    )),
    tags((name = "Todos", description = "Todo management"))
)]
pub struct ApiDoc;

/// Creates the JSON API routes together with their OpenAPI document and Swagger UI.
pub fn create_api_router(todo_state: TodoState) -> Router {
    Router::new()
        .merge(todo_api::create_api_router(todo_state))
        .merge(SwaggerUi::new(DOCS_PATH).url(OPENAPI_PATH, ApiDoc::openapi()))
}
