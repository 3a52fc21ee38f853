use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, TodosRepo, TodosWriteRepo, UpdateTodoParams},
    domain::{entities::TodoRecord, todos::NewTodo},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct TodoRow {
    id: Uuid,
    user_id: String,
    description: String,
    completed: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<TodoRow> for TodoRecord {
    fn from(row: TodoRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.user_id,
            description: row.description,
            completed: row.completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl TodosRepo for PostgresRepositories {
    async fn list_todos(&self) -> Result<Vec<TodoRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TodoRow>(
            r#"
            SELECT id, user_id, description, completed, created_at, updated_at
            FROM todos
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TodoRecord::from).collect())
    }
}

#[async_trait]
impl TodosWriteRepo for PostgresRepositories {
    async fn create_todo(&self, todo: NewTodo) -> Result<TodoRecord, RepoError> {
        let NewTodo {
            id,
            owner_id,
            description,
            completed,
        } = todo;
        let now = OffsetDateTime::now_utc();

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, TodoRow>(
            r#"
            INSERT INTO todos (id, user_id, description, completed, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, user_id, description, completed, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(description)
        .bind(completed)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(TodoRecord::from(row))
    }

    async fn update_todo(
        &self,
        params: UpdateTodoParams,
    ) -> Result<Option<TodoRecord>, RepoError> {
        let UpdateTodoParams { id, patch } = params;
        let now = OffsetDateTime::now_utc();

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // `created_at` is never written; `updated_at` cannot fall behind it.
        let row = sqlx::query_as::<_, TodoRow>(
            r#"
            UPDATE todos
            SET user_id = COALESCE($2, user_id),
                description = COALESCE($3, description),
                completed = COALESCE($4, completed),
                updated_at = GREATEST($5, created_at)
            WHERE id = $1
            RETURNING id, user_id, description, completed, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(patch.owner_id)
        .bind(patch.description)
        .bind(patch.completed)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(row.map(TodoRecord::from))
    }

    async fn delete_todo(&self, id: Uuid) -> Result<u64, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            DELETE FROM todos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
