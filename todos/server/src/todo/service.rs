use chrono::{Local, NaiveDate};

use super::query::{self, TodoFilter, TodoStatistics};
use super::store::{StoreError, TodoStore};
use super::{CreateTodo, Todo, TodoId, TodoPatch, ValidationErrors};

/// Error type for TodoService operations.
#[derive(Debug, thiserror::Error)]
pub enum TodoServiceError {
    /// The request failed field validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    /// No todo exists with the given ID.
    #[error("Todo with ID {0} not found")]
    NotFound(TodoId),
    /// The record store failed.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TodoServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => TodoServiceError::NotFound(id),
            other => TodoServiceError::Store(other),
        }
    }
}

/// Stateless todo operations over a borrowed store. Build one per request.
pub struct TodoService<'a> {
    store: &'a dyn TodoStore,
    today: NaiveDate,
}

impl<'a> TodoService<'a> {
    pub fn new(store: &'a dyn TodoStore) -> Self {
        Self {
            store,
            today: Local::now().date_naive(),
        }
    }

    /// Overrides the date used to decide whether a todo is overdue.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Lists todos matching `filter`, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: &TodoFilter) -> Result<Vec<Todo>, TodoServiceError> {
        let todos = self.store.list().await?;
        Ok(query::filter_todos(todos, filter, self.today))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: TodoId) -> Result<Todo, TodoServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or(TodoServiceError::NotFound(id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, input: CreateTodo) -> Result<Todo, TodoServiceError> {
        let new_todo = input.validate()?;
        let todo = self.store.insert(new_todo).await?;
        tracing::info!("Created todo {}", todo.id);
        Ok(todo)
    }

    /// Applies a partial update. Fields absent from `patch` keep their values.
    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: TodoId, patch: TodoPatch) -> Result<Todo, TodoServiceError> {
        let mut todo = self.get(id).await?;
        patch.apply(&mut todo)?;
        Ok(self.store.update(todo).await?)
    }

    /// Replaces every mutable field; omitted fields take their defaults.
    #[tracing::instrument(skip(self))]
    pub async fn replace(&self, id: TodoId, input: CreateTodo) -> Result<Todo, TodoServiceError> {
        let mut todo = self.get(id).await?;
        let replacement = input.validate()?;
        todo.title = replacement.title;
        todo.description = replacement.description;
        todo.completed = replacement.completed;
        todo.priority = replacement.priority;
        todo.due_date = replacement.due_date;
        Ok(self.store.update(todo).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: TodoId) -> Result<(), TodoServiceError> {
        if self.store.delete(id).await? {
            tracing::info!("Deleted todo {}", id);
            Ok(())
        } else {
            Err(TodoServiceError::NotFound(id))
        }
    }

    /// Flips the completion state of a todo.
    #[tracing::instrument(skip(self))]
    pub async fn toggle(&self, id: TodoId) -> Result<Todo, TodoServiceError> {
        let mut todo = self.get(id).await?;
        todo.completed = !todo.completed;
        Ok(self.store.update(todo).await?)
    }

    /// Deletes every completed todo, one at a time, and returns how many were removed.
    #[tracing::instrument(skip(self))]
    pub async fn bulk_delete_completed(&self) -> Result<u64, TodoServiceError> {
        let completed = TodoFilter {
            completed: Some(true),
            ..Default::default()
        };
        let mut deleted_count = 0;
        for todo in self.list(&completed).await? {
            if self.store.delete(todo.id).await? {
                deleted_count += 1;
            } else {
                tracing::warn!("Todo {} disappeared before it could be deleted", todo.id);
            }
        }
        tracing::info!("Bulk deleted {} completed todos", deleted_count);
        Ok(deleted_count)
    }

    #[tracing::instrument(skip(self))]
    pub async fn statistics(&self) -> Result<TodoStatistics, TodoServiceError> {
        let todos = self.store.list().await?;
        Ok(query::statistics(&todos, self.today))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todo::store::{InMemoryTodoStore, MockTodoStore};
    use crate::todo::Priority;
    use sea_orm::DbErr;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn today() -> NaiveDate {
        date(2025, 6, 15)
    }

    fn service(store: &dyn TodoStore) -> TodoService<'_> {
        TodoService::new(store).with_today(today())
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable(DbErr::Custom("connection refused".to_string()))
    }

    #[tokio::test]
    async fn can_create_todo_and_count_it() {
        let store = InMemoryTodoStore::new();
        let service = service(&store);

        let created = service
            .create(CreateTodo::new("Buy milk").with_priority(Priority::High))
            .await
            .unwrap();
        assert_eq!(created.title, "Buy milk");
        assert_eq!(created.priority, Priority::High);
        assert!(!created.completed);

        let stats = service.statistics().await.unwrap();
        assert_eq!(
            stats,
            TodoStatistics {
                total: 1,
                completed: 0,
                pending: 1,
                overdue: 0,
            }
        );
    }

    #[tokio::test]
    async fn counts_past_due_todo_as_overdue() {
        let store = InMemoryTodoStore::new();
        let service = service(&store);
        service
            .create(CreateTodo::new("Renew passport").with_due_date(date(2025, 6, 1)))
            .await
            .unwrap();

        assert_eq!(service.statistics().await.unwrap().overdue, 1);

        let overdue = service
            .list(&TodoFilter {
                overdue_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(overdue.len(), 1);
    }

    #[tokio::test]
    async fn cannot_create_todo_with_invalid_title() {
        let store = InMemoryTodoStore::new();
        let result = service(&store).create(CreateTodo::new("   ")).await;
        assert!(matches!(result, Err(TodoServiceError::Validation(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn can_toggle_completion_back_and_forth() {
        let store = InMemoryTodoStore::new();
        let service = service(&store);
        let created = service.create(CreateTodo::new("Walk dog")).await.unwrap();

        let toggled = service.toggle(created.id).await.unwrap();
        assert!(toggled.completed);
        assert!(toggled.updated_at >= created.updated_at);

        let toggled_back = service.toggle(created.id).await.unwrap();
        assert!(!toggled_back.completed);
    }

    #[tokio::test]
    async fn cannot_toggle_unknown_todo() {
        let store = InMemoryTodoStore::new();
        let result = service(&store).toggle(42).await;
        assert!(matches!(result, Err(TodoServiceError::NotFound(42))));
    }

    #[tokio::test]
    async fn bulk_delete_completed_is_idempotent() {
        let store = InMemoryTodoStore::new();
        let service = service(&store);
        service
            .create(CreateTodo::new("Done one").completed(true))
            .await
            .unwrap();
        service
            .create(CreateTodo::new("Done two").completed(true))
            .await
            .unwrap();
        let pending = service.create(CreateTodo::new("Still open")).await.unwrap();

        assert_eq!(service.bulk_delete_completed().await.unwrap(), 2);
        assert_eq!(service.bulk_delete_completed().await.unwrap(), 0);

        let remaining = service.list(&TodoFilter::default()).await.unwrap();
        assert_eq!(remaining, vec![pending]);
    }

    #[tokio::test]
    async fn can_update_only_given_fields() {
        let store = InMemoryTodoStore::new();
        let service = service(&store);
        let created = service
            .create(
                CreateTodo::new("Write report")
                    .with_description("Q4 sales")
                    .with_priority(Priority::Low),
            )
            .await
            .unwrap();

        let patch = TodoPatch {
            title: "Write final report".to_string().into(),
            ..Default::default()
        };
        let updated = service.update(created.id, patch).await.unwrap();
        assert_eq!(updated.title, "Write final report");
        assert_eq!(updated.description, "Q4 sales");
        assert_eq!(updated.priority, Priority::Low);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn replace_resets_omitted_fields_to_defaults() {
        let store = InMemoryTodoStore::new();
        let service = service(&store);
        let created = service
            .create(
                CreateTodo::new("Plan trip")
                    .with_description("Book hotel")
                    .with_priority(Priority::High)
                    .with_due_date(date(2025, 8, 1)),
            )
            .await
            .unwrap();

        let replaced = service
            .replace(created.id, CreateTodo::new("Plan holiday"))
            .await
            .unwrap();
        assert_eq!(replaced.title, "Plan holiday");
        assert_eq!(replaced.description, "");
        assert_eq!(replaced.priority, Priority::Medium);
        assert_eq!(replaced.due_date, None);
    }

    #[tokio::test]
    async fn replace_requires_a_title() {
        let store = InMemoryTodoStore::new();
        let service = service(&store);
        let created = service.create(CreateTodo::new("Plan trip")).await.unwrap();

        let result = service.replace(created.id, CreateTodo::default()).await;
        let Err(TodoServiceError::Validation(errors)) = result else {
            panic!("expected a validation error");
        };
        assert_eq!(
            errors.by_field()["title"],
            vec!["This field is required.".to_string()]
        );
        assert_eq!(service.get(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn cannot_delete_unknown_todo() {
        let store = InMemoryTodoStore::new();
        let result = service(&store).delete(7).await;
        assert!(matches!(result, Err(TodoServiceError::NotFound(7))));
    }

    #[tokio::test]
    async fn propagates_store_failure_when_listing() {
        let mut store = MockTodoStore::new();
        store.expect_list().times(1).returning(|| Err(unavailable()));

        let result = service(&store).list(&TodoFilter::default()).await;
        assert!(matches!(
            result,
            Err(TodoServiceError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn propagates_store_failure_when_computing_statistics() {
        let mut store = MockTodoStore::new();
        store.expect_list().returning(|| Err(unavailable()));

        let result = service(&store).statistics().await;
        assert!(matches!(result, Err(TodoServiceError::Store(_))));
    }

    #[tokio::test]
    async fn does_not_insert_when_validation_fails() {
        let mut store = MockTodoStore::new();
        store.expect_insert().never();

        let result = service(&store)
            .create(CreateTodo {
                priority: "critical".to_string().into(),
                ..CreateTodo::new("Valid")
            })
            .await;
        assert!(matches!(result, Err(TodoServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn maps_store_not_found_on_update_to_not_found() {
        let existing = Todo {
            id: 3,
            title: "Racing delete".to_string(),
            description: String::new(),
            completed: false,
            priority: Priority::Medium,
            due_date: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let mut store = MockTodoStore::new();
        store
            .expect_get()
            .returning(move |_| Ok(Some(existing.clone())));
        store
            .expect_update()
            .returning(|todo| Err(StoreError::NotFound(todo.id)));

        let result = service(&store).toggle(3).await;
        assert!(matches!(result, Err(TodoServiceError::NotFound(3))));
    }
}
