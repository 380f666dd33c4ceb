use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use testcontainers_modules::{postgres, testcontainers};
use todos_server::todo::{
    CreateTodo, Priority, SeaOrmTodoStore, TodoFilter, TodoService, TodoServiceError, TodoStore,
};

mod common;

/// Test context for store tests.
pub struct TestContext {
    #[allow(dead_code)] // container is kept to ensure it's not dropped
    pub container: testcontainers::ContainerAsync<postgres::Postgres>,
    pub db: DatabaseConnection,
}

/// Setup function for store tests using PostgreSQL container.
async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let container = common::setup_container().await?;
    let db = common::setup_db(&container).await?;
    Ok(TestContext { db, container })
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

#[tokio::test]
#[ignore = "requires a Docker daemon for the PostgreSQL container"]
async fn can_insert_and_get_todo() {
    let context = setup().await.expect("Failed to setup test context");
    let store = SeaOrmTodoStore::new(context.db);

    let new_todo = CreateTodo::new("Buy groceries")
        .with_description("Milk, eggs, bread")
        .with_priority(Priority::High)
        .with_due_date(date(2099, 1, 2))
        .validate()
        .unwrap();
    let created = store.insert(new_todo).await.unwrap();

    assert!(created.id > 0);
    assert_eq!(created.title, "Buy groceries");
    assert_eq!(created.priority, Priority::High);
    assert_eq!(created.due_date, Some(date(2099, 1, 2)));
    assert_eq!(store.get(created.id).await.unwrap(), Some(created));
}

#[tokio::test]
#[ignore = "requires a Docker daemon for the PostgreSQL container"]
async fn can_update_and_delete_todo() {
    let context = setup().await.expect("Failed to setup test context");
    let store = SeaOrmTodoStore::new(context.db);
    let created = store
        .insert(CreateTodo::new("Write report").validate().unwrap())
        .await
        .unwrap();

    let mut changed = created.clone();
    changed.completed = true;
    changed.priority = Priority::Low;
    changed.due_date = Some(date(2099, 1, 8));
    let updated = store.update(changed).await.unwrap();
    assert!(updated.completed);
    assert_eq!(updated.priority, Priority::Low);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);

    assert!(store.delete(created.id).await.unwrap());
    assert!(!store.delete(created.id).await.unwrap());
    assert_eq!(store.get(created.id).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires a Docker daemon for the PostgreSQL container"]
async fn service_works_against_postgres() {
    let context = setup().await.expect("Failed to setup test context");
    let store = SeaOrmTodoStore::new(context.db);
    let service = TodoService::new(&store).with_today(date(2025, 6, 15));

    service
        .create(CreateTodo::new("Late").with_due_date(date(2025, 6, 1)))
        .await
        .unwrap();
    let done = service
        .create(CreateTodo::new("Done").completed(true))
        .await
        .unwrap();
    service.create(CreateTodo::new("Open")).await.unwrap();

    let overdue = service
        .list(&TodoFilter {
            overdue_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].title, "Late");

    let stats = service.statistics().await.unwrap();
    assert_eq!((stats.total, stats.completed, stats.pending, stats.overdue), (3, 1, 2, 1));

    assert_eq!(service.bulk_delete_completed().await.unwrap(), 1);
    assert!(matches!(
        service.get(done.id).await,
        Err(TodoServiceError::NotFound(_))
    ));
    assert_eq!(service.bulk_delete_completed().await.unwrap(), 0);
}
