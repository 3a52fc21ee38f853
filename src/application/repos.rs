//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::TodoRecord;
use crate::domain::todos::{NewTodo, TodoPatch};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct UpdateTodoParams {
    pub id: Uuid,
    pub patch: TodoPatch,
}

#[async_trait]
pub trait TodosRepo: Send + Sync {
    /// Every stored todo, newest `created_at` first. Empty when nothing is stored.
    async fn list_todos(&self) -> Result<Vec<TodoRecord>, RepoError>;
}

/// Each method runs in its own transaction: either the statement commits or
/// nothing is visible.
#[async_trait]
pub trait TodosWriteRepo: Send + Sync {
    /// Insert a new todo, stamping `created_at` and `updated_at` with the same
    /// instant. Fails with [`RepoError::Duplicate`] when the id already exists.
    async fn create_todo(&self, todo: NewTodo) -> Result<TodoRecord, RepoError>;

    /// Apply `params.patch` and reset `updated_at`. `Ok(None)` means zero rows
    /// were affected.
    async fn update_todo(&self, params: UpdateTodoParams)
    -> Result<Option<TodoRecord>, RepoError>;

    /// Hard-delete a todo, returning the number of affected rows.
    async fn delete_todo(&self, id: Uuid) -> Result<u64, RepoError>;
}
