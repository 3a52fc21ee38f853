//! Input normalization for todo writes.

use uuid::Uuid;

use super::error::DomainError;

/// Caller-supplied fields for a new todo, before validation.
#[derive(Debug, Clone, Default)]
pub struct TodoDraft {
    pub id: Option<Uuid>,
    pub owner_id: String,
    pub description: String,
    pub completed: bool,
}

/// A validated todo ready to be inserted. The identifier is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub id: Uuid,
    pub owner_id: String,
    pub description: String,
    pub completed: bool,
}

impl TodoDraft {
    /// Validate required fields and assign a random identifier when none was
    /// supplied.
    pub fn into_new_todo(self) -> Result<NewTodo, DomainError> {
        let owner_id = required(self.owner_id, "owner_id")?;
        let description = required(self.description, "description")?;

        Ok(NewTodo {
            id: self.id.unwrap_or_else(generate_todo_id),
            owner_id,
            description,
            completed: self.completed,
        })
    }
}

/// Partial update of an existing todo. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub owner_id: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl TodoPatch {
    /// Supplied strings must still satisfy the create-time requirements.
    pub fn normalized(self) -> Result<Self, DomainError> {
        let owner_id = self
            .owner_id
            .map(|value| required(value, "owner_id"))
            .transpose()?;
        let description = self
            .description
            .map(|value| required(value, "description"))
            .transpose()?;

        Ok(Self {
            owner_id,
            description,
            completed: self.completed,
        })
    }
}

/// Random (v4) identifiers come from the operating system CSPRNG.
pub fn generate_todo_id() -> Uuid {
    Uuid::new_v4()
}

fn required(value: String, field: &'static str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    if trimmed.len() == value.len() {
        Ok(value)
    } else {
        Ok(trimmed.to_string())
    }
}
