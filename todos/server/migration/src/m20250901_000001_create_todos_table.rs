use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Todos {
    Table,
    Id,
    Title,
    Description,
    Completed,
    Priority,
    DueDate,
    CreatedAt,
    UpdatedAt,
}

const IDX_TODOS_COMPLETED: &str = "idx-todos-completed";
const IDX_TODOS_PRIORITY: &str = "idx-todos-priority";
const IDX_TODOS_DUE_DATE: &str = "idx-todos-due_date";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Todos::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Todos::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_len(Todos::Title, 200))
                    .col(text(Todos::Description).default(""))
                    .col(boolean(Todos::Completed).default(false))
                    .col(string_len(Todos::Priority, 10).default("medium"))
                    .col(date_null(Todos::DueDate))
                    .col(
                        timestamp_with_time_zone(Todos::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Todos::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, column) in [
            (IDX_TODOS_COMPLETED, Todos::Completed),
            (IDX_TODOS_PRIORITY, Todos::Priority),
            (IDX_TODOS_DUE_DATE, Todos::DueDate),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(Todos::Table)
                        .col(column)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [IDX_TODOS_COMPLETED, IDX_TODOS_PRIORITY, IDX_TODOS_DUE_DATE] {
            manager
                .drop_index(Index::drop().name(name).table(Todos::Table).to_owned())
                .await?;
        }
        manager
            .drop_table(Table::drop().table(Todos::Table).to_owned())
            .await
    }
}
