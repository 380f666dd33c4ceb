use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::todo::{
    CreateTodo, Priority, Todo, TodoFilter, TodoId, TodoPatch, TodoService, TodoServiceError,
    TodoStatistics, TodoStore, ValidationErrors,
};

/// Path of the todo collection. Every todo route lives below it.
pub const TODOS_PATH: &str = "/api/todos/";

/// Default number of todos per list page.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

#[derive(Clone)]
pub struct TodoState {
    pub store: Arc<dyn TodoStore>,
    pub page_size: u64,
}

impl TodoState {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    fn service(&self) -> TodoService<'_> {
        TodoService::new(self.store.as_ref())
    }
}

/// JSON representation of a todo for API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TodoJson {
    pub id: TodoId,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    /// Japanese label of the priority
    pub priority_display_ja: String,
    pub due_date: Option<NaiveDate>,
    /// Due date has passed and the todo is not completed
    pub is_overdue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TodoJson {
    pub fn new(todo: Todo, today: NaiveDate) -> Self {
        Self {
            is_overdue: todo.is_overdue(today),
            priority_display_ja: todo.priority.display_ja().to_string(),
            id: todo.id,
            title: todo.title,
            description: todo.description,
            completed: todo.completed,
            priority: todo.priority,
            due_date: todo.due_date,
            created_at: todo.created_at,
            updated_at: todo.updated_at,
        }
    }
}

/// One page of the todo list.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodoPage {
    /// Number of todos matching the filters, across all pages
    pub count: u64,
    /// Link to the next page, if any
    pub next: Option<String>,
    /// Link to the previous page, if any
    pub previous: Option<String>,
    pub results: Vec<TodoJson>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedCountResponse {
    pub deleted_count: u64,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
    /// Validation messages keyed by field name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            errors: BTreeMap::new(),
        }
    }
}

/// Query parameters of the todo list. A repeated parameter keeps its last value.
#[derive(Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTodosQuery {
    /// `true` for completed todos only, any other value for pending ones
    completed: Option<String>,
    /// `low`, `medium` or `high`
    priority: Option<String>,
    /// `true` for overdue todos only
    overdue_only: Option<String>,
    /// 1-based page number
    page: Option<String>,
}

impl FromIterator<(String, String)> for ListTodosQuery {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let mut query = ListTodosQuery::default();
        for (key, value) in pairs {
            match key.as_str() {
                "completed" => query.completed = Some(value),
                "priority" => query.priority = Some(value),
                "overdue_only" => query.overdue_only = Some(value),
                "page" => query.page = Some(value),
                _ => {}
            }
        }
        query
    }
}

impl ListTodosQuery {
    fn filter(&self) -> Result<TodoFilter, ValidationErrors> {
        let priority = match self.priority.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<Priority>()?),
        };
        Ok(TodoFilter {
            completed: self
                .completed
                .as_deref()
                .map(|raw| raw.eq_ignore_ascii_case("true")),
            priority,
            overdue_only: self.overdue_only.as_deref() == Some("true"),
        })
    }

    fn page(&self) -> Result<u64, ApiError> {
        match self.page.as_deref() {
            None => Ok(1),
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|page| *page >= 1)
                .ok_or(ApiError::InvalidPage),
        }
    }
}

/// Custom error type for todo API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] TodoServiceError),
    /// The request body or query string could not be parsed.
    #[error("{0}")]
    InvalidBody(String),
    /// The path did not name a todo.
    #[error("Not found.")]
    UnknownPath,
    #[error("Invalid page.")]
    InvalidPage,
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Service(TodoServiceError::Validation(errors))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, body) = match self {
            ApiError::Service(TodoServiceError::Validation(errors)) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    detail: errors.to_string(),
                    errors: errors.by_field(),
                },
            ),
            ApiError::InvalidBody(message) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(message))
            }
            ApiError::Service(TodoServiceError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(format!("Todo with ID {id} not found")),
            ),
            error @ (ApiError::UnknownPath | ApiError::InvalidPage) => {
                (StatusCode::NOT_FOUND, ErrorResponse::new(error.to_string()))
            }
            ApiError::Service(TodoServiceError::Store(error)) => {
                tracing::error!("Todo store failure: {}", error);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::new(
                        "The todo store is unavailable. Please try again later.",
                    ),
                )
            }
        };
        (status_code, Json(body)).into_response()
    }
}

fn todo_id(path: Result<Path<TodoId>, PathRejection>) -> Result<TodoId, ApiError> {
    path.map(|Path(id)| id).map_err(|_| ApiError::UnknownPath)
}

fn list_query(
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<ListTodosQuery, ApiError> {
    query
        .map(|Query(pairs)| pairs.into_iter().collect())
        .map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))
}

/// Link to `page` of the list, keeping the active filters. Page 1 carries no `page` parameter.
fn page_link(filter: &TodoFilter, page: u64) -> String {
    let mut params = Vec::new();
    if page > 1 {
        params.push(format!("page={page}"));
    }
    if let Some(completed) = filter.completed {
        params.push(format!("completed={completed}"));
    }
    if let Some(priority) = filter.priority {
        params.push(format!("priority={priority}"));
    }
    if filter.overdue_only {
        params.push("overdue_only=true".to_string());
    }

    if params.is_empty() {
        TODOS_PATH.to_string()
    } else {
        format!("{TODOS_PATH}?{}", params.join("&"))
    }
}

/// Cuts `todos` into pages of `page_size` and returns the requested one.
/// An empty list still has one (empty) page.
fn paginate(
    todos: Vec<Todo>,
    filter: &TodoFilter,
    page: u64,
    page_size: u64,
    today: NaiveDate,
) -> Result<TodoPage, ApiError> {
    let page_size = page_size.max(1);
    let count = todos.len() as u64;
    let num_pages = count.div_ceil(page_size).max(1);
    if page > num_pages {
        return Err(ApiError::InvalidPage);
    }

    let results = todos
        .into_iter()
        .skip(((page - 1) * page_size) as usize)
        .take(page_size as usize)
        .map(|todo| TodoJson::new(todo, today))
        .collect();

    Ok(TodoPage {
        count,
        next: (page < num_pages).then(|| page_link(filter, page + 1)),
        previous: (page > 1).then(|| page_link(filter, page - 1)),
        results,
    })
}

/// Handler for GET /api/todos/ - Lists todos, newest first.
#[utoipa::path(
    get,
    path = "/api/todos/",
    params(ListTodosQuery),
    responses(
        (status = 200, description = "One page of matching todos", body = TodoPage),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 404, description = "Invalid page", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "Todos"
)]
#[tracing::instrument(skip(state))]
pub async fn list_todos_handler(
    State(state): State<TodoState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<TodoPage>, ApiError> {
    let query = list_query(query)?;
    let filter = query.filter()?;
    let page = query.page()?;
    let service = state.service();
    let todos = service.list(&filter).await?;
    paginate(todos, &filter, page, state.page_size, service.today()).map(Json)
}

/// Handler for POST /api/todos/ - Creates a todo.
#[utoipa::path(
    post,
    path = "/api/todos/",
    request_body = CreateTodo,
    responses(
        (status = 201, description = "Todo created", body = TodoJson),
        (status = 400, description = "Validation failed", body = ErrorResponse)
    ),
    tag = "Todos"
)]
#[tracing::instrument(skip(state, payload))]
pub async fn create_todo_handler(
    State(state): State<TodoState>,
    payload: Result<Json<CreateTodo>, JsonRejection>,
) -> Result<(StatusCode, Json<TodoJson>), ApiError> {
    let input = json_body(payload)?;
    let service = state.service();
    let todo = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(TodoJson::new(todo, service.today()))))
}

/// Handler for GET /api/todos/{id}/ - Fetches one todo.
#[utoipa::path(
    get,
    path = "/api/todos/{id}/",
    params(("id" = i64, Path, description = "Todo ID")),
    responses(
        (status = 200, description = "The todo", body = TodoJson),
        (status = 404, description = "Todo not found", body = ErrorResponse)
    ),
    tag = "Todos"
)]
#[tracing::instrument(skip(state))]
pub async fn get_todo_handler(
    State(state): State<TodoState>,
    path: Result<Path<TodoId>, PathRejection>,
) -> Result<Json<TodoJson>, ApiError> {
    let id = todo_id(path)?;
    let service = state.service();
    let todo = service.get(id).await?;
    Ok(Json(TodoJson::new(todo, service.today())))
}

/// Handler for PATCH /api/todos/{id}/ - Updates the given fields of a todo.
#[utoipa::path(
    patch,
    path = "/api/todos/{id}/",
    params(("id" = i64, Path, description = "Todo ID")),
    request_body = TodoPatch,
    responses(
        (status = 200, description = "Updated todo", body = TodoJson),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 404, description = "Todo not found", body = ErrorResponse)
    ),
    tag = "Todos"
)]
#[tracing::instrument(skip(state, payload))]
pub async fn update_todo_handler(
    State(state): State<TodoState>,
    path: Result<Path<TodoId>, PathRejection>,
    payload: Result<Json<TodoPatch>, JsonRejection>,
) -> Result<Json<TodoJson>, ApiError> {
    let id = todo_id(path)?;
    let patch = json_body(payload)?;
    let service = state.service();
    let todo = service.update(id, patch).await?;
    Ok(Json(TodoJson::new(todo, service.today())))
}

/// Handler for PUT /api/todos/{id}/ - Replaces a todo.
#[utoipa::path(
    put,
    path = "/api/todos/{id}/",
    params(("id" = i64, Path, description = "Todo ID")),
    request_body = CreateTodo,
    responses(
        (status = 200, description = "Replaced todo", body = TodoJson),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 404, description = "Todo not found", body = ErrorResponse)
    ),
    tag = "Todos"
)]
#[tracing::instrument(skip(state, payload))]
pub async fn replace_todo_handler(
    State(state): State<TodoState>,
    path: Result<Path<TodoId>, PathRejection>,
    payload: Result<Json<CreateTodo>, JsonRejection>,
) -> Result<Json<TodoJson>, ApiError> {
    let id = todo_id(path)?;
    let input = json_body(payload)?;
    let service = state.service();
    let todo = service.replace(id, input).await?;
    Ok(Json(TodoJson::new(todo, service.today())))
}

/// Handler for DELETE /api/todos/{id}/ - Deletes one todo.
#[utoipa::path(
    delete,
    path = "/api/todos/{id}/",
    params(("id" = i64, Path, description = "Todo ID")),
    responses(
        (status = 204, description = "Todo deleted"),
        (status = 404, description = "Todo not found", body = ErrorResponse)
    ),
    tag = "Todos"
)]
#[tracing::instrument(skip(state))]
pub async fn delete_todo_handler(
    State(state): State<TodoState>,
    path: Result<Path<TodoId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = todo_id(path)?;
    state.service().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/todos/{id}/toggle/ - Flips the completion state.
#[utoipa::path(
    post,
    path = "/api/todos/{id}/toggle/",
    params(("id" = i64, Path, description = "Todo ID")),
    responses(
        (status = 200, description = "Toggled todo", body = TodoJson),
        (status = 404, description = "Todo not found", body = ErrorResponse)
    ),
    tag = "Todos"
)]
#[tracing::instrument(skip(state))]
pub async fn toggle_todo_handler(
    State(state): State<TodoState>,
    path: Result<Path<TodoId>, PathRejection>,
) -> Result<Json<TodoJson>, ApiError> {
    let id = todo_id(path)?;
    let service = state.service();
    let todo = service.toggle(id).await?;
    Ok(Json(TodoJson::new(todo, service.today())))
}

/// Handler for DELETE /api/todos/bulk_delete_completed/ - Deletes every completed todo.
#[utoipa::path(
    delete,
    path = "/api/todos/bulk_delete_completed/",
    responses(
        (status = 200, description = "Number of deleted todos", body = DeletedCountResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "Todos"
)]
#[tracing::instrument(skip(state))]
pub async fn bulk_delete_completed_handler(
    State(state): State<TodoState>,
) -> Result<Json<DeletedCountResponse>, ApiError> {
    let deleted_count = state.service().bulk_delete_completed().await?;
    Ok(Json(DeletedCountResponse { deleted_count }))
}

/// Handler for GET /api/todos/statistics/ - Returns aggregate counts.
#[utoipa::path(
    get,
    path = "/api/todos/statistics/",
    responses(
        (status = 200, description = "Todo statistics", body = TodoStatistics),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "Todos"
)]
#[tracing::instrument(skip(state))]
pub async fn statistics_handler(
    State(state): State<TodoState>,
) -> Result<Json<TodoStatistics>, ApiError> {
    Ok(Json(state.service().statistics().await?))
}

/// Creates and returns the todo API router.
pub fn create_api_router(state: TodoState) -> Router {
    Router::new()
        .route(
            "/api/todos/",
            get(list_todos_handler).post(create_todo_handler),
        )
        .route("/api/todos/statistics/", get(statistics_handler))
        .route(
            "/api/todos/bulk_delete_completed/",
            delete(bulk_delete_completed_handler),
        )
        .route(
            "/api/todos/{id}/",
            get(get_todo_handler)
                .patch(update_todo_handler)
                .put(replace_todo_handler)
                .delete(delete_todo_handler),
        )
        .route("/api/todos/{id}/toggle/", post(toggle_todo_handler))
        .with_state(state)
}
