//! Conversions between wire types and domain types.

pub use todos_api_types::{TodoCreateRequest, TodoResponse, TodoUpdateRequest};

use crate::domain::entities::TodoRecord;
use crate::domain::todos::{TodoDraft, TodoPatch};

impl From<TodoRecord> for TodoResponse {
    fn from(record: TodoRecord) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id,
            description: record.description,
            completed: record.completed,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl From<TodoCreateRequest> for TodoDraft {
    fn from(request: TodoCreateRequest) -> Self {
        Self {
            id: request.id,
            owner_id: request.owner_id,
            description: request.description,
            completed: request.completed,
        }
    }
}

impl From<TodoUpdateRequest> for TodoPatch {
    fn from(request: TodoUpdateRequest) -> Self {
        Self {
            owner_id: request.owner_id,
            description: request.description,
            completed: request.completed,
        }
    }
}
