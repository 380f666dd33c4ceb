use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection, EntityTrait, QueryOrder};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{NewTodo, Priority, Todo, TodoId};
use crate::entities::{sea_orm_active_enums, todo};

/// Error type for record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not serve the request.
    #[error("Record store unavailable: {0}")]
    Unavailable(#[from] sea_orm::DbErr),
    /// An update targeted a record that does not exist.
    #[error("Todo with ID {0} not found")]
    NotFound(TodoId),
}

/// Persistence seam for todos. Implementations assign IDs and timestamps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Inserts a new todo, assigning its ID, `created_at` and `updated_at`.
    async fn insert(&self, new_todo: NewTodo) -> Result<Todo, StoreError>;

    async fn get(&self, id: TodoId) -> Result<Option<Todo>, StoreError>;

    /// Persists every mutable field of `todo` and refreshes `updated_at`.
    /// `id` and `created_at` are never changed.
    async fn update(&self, todo: Todo) -> Result<Todo, StoreError>;

    /// Returns `false` when no todo had this ID.
    async fn delete(&self, id: TodoId) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<Todo>, StoreError>;
}

#[derive(Debug)]
struct InMemoryState {
    todos: BTreeMap<TodoId, Todo>,
    next_id: TodoId,
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Debug)]
pub struct InMemoryTodoStore {
    state: RwLock<InMemoryState>,
}

impl Default for InMemoryTodoStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTodoStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(InMemoryState {
                todos: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }
}

#[async_trait]
impl TodoStore for InMemoryTodoStore {
    async fn insert(&self, new_todo: NewTodo) -> Result<Todo, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let todo = Todo {
            id: state.next_id,
            title: new_todo.title,
            description: new_todo.description,
            completed: new_todo.completed,
            priority: new_todo.priority,
            due_date: new_todo.due_date,
            created_at: now,
            updated_at: now,
        };
        state.next_id += 1;
        state.todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn get(&self, id: TodoId) -> Result<Option<Todo>, StoreError> {
        Ok(self.state.read().await.todos.get(&id).cloned())
    }

    async fn update(&self, todo: Todo) -> Result<Todo, StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .todos
            .get_mut(&todo.id)
            .ok_or(StoreError::NotFound(todo.id))?;
        *stored = Todo {
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..todo
        };
        Ok(stored.clone())
    }

    async fn delete(&self, id: TodoId) -> Result<bool, StoreError> {
        Ok(self.state.write().await.todos.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        Ok(self.state.read().await.todos.values().cloned().collect())
    }
}

/// Store backed by the `todos` table through SeaORM.
#[derive(Debug, Clone)]
pub struct SeaOrmTodoStore {
    db: DatabaseConnection,
}

impl SeaOrmTodoStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl From<sea_orm_active_enums::Priority> for Priority {
    fn from(priority: sea_orm_active_enums::Priority) -> Self {
        match priority {
            sea_orm_active_enums::Priority::Low => Priority::Low,
            sea_orm_active_enums::Priority::Medium => Priority::Medium,
            sea_orm_active_enums::Priority::High => Priority::High,
        }
    }
}

impl From<Priority> for sea_orm_active_enums::Priority {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Low => sea_orm_active_enums::Priority::Low,
            Priority::Medium => sea_orm_active_enums::Priority::Medium,
            Priority::High => sea_orm_active_enums::Priority::High,
        }
    }
}

impl From<todo::Model> for Todo {
    fn from(model: todo::Model) -> Self {
        Todo {
            id: model.id,
            title: model.title,
            description: model.description,
            completed: model.completed,
            priority: model.priority.into(),
            due_date: model.due_date,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> sea_orm::prelude::DateTimeWithTimeZone {
    at.fixed_offset()
}

#[async_trait]
impl TodoStore for SeaOrmTodoStore {
    #[tracing::instrument(skip(self))]
    async fn insert(&self, new_todo: NewTodo) -> Result<Todo, StoreError> {
        let now = timestamp(Utc::now());
        let active_model = todo::ActiveModel {
            title: ActiveValue::Set(new_todo.title),
            description: ActiveValue::Set(new_todo.description),
            completed: ActiveValue::Set(new_todo.completed),
            priority: ActiveValue::Set(new_todo.priority.into()),
            due_date: ActiveValue::Set(new_todo.due_date),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        let created_model = active_model.insert(&self.db).await?;
        Ok(Todo::from(created_model))
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: TodoId) -> Result<Option<Todo>, StoreError> {
        let model = todo::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Todo::from))
    }

    #[tracing::instrument(skip(self))]
    async fn update(&self, todo: Todo) -> Result<Todo, StoreError> {
        let existing = todo::Entity::find_by_id(todo.id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound(todo.id))?;

        let mut active_model: todo::ActiveModel = existing.into();
        active_model.title = ActiveValue::Set(todo.title);
        active_model.description = ActiveValue::Set(todo.description);
        active_model.completed = ActiveValue::Set(todo.completed);
        active_model.priority = ActiveValue::Set(todo.priority.into());
        active_model.due_date = ActiveValue::Set(todo.due_date);
        active_model.updated_at = ActiveValue::Set(timestamp(Utc::now()));
        let updated_model = active_model.update(&self.db).await?;
        Ok(Todo::from(updated_model))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: TodoId) -> Result<bool, StoreError> {
        let result = todo::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        let todos = todo::Entity::find()
            .order_by_desc(todo::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Todo::from)
            .collect();
        Ok(todos)
    }
}
