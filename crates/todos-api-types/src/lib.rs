//! Wire types shared by the todos HTTP API and its clients.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Body of `POST /api/todos`.
///
/// `owner_id` also accepts the legacy `user_id` field name. Missing strings
/// deserialize as empty so the server can report them as validation failures
/// instead of JSON syntax errors.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TodoCreateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, alias = "user_id")]
    pub owner_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

/// Body of `PUT /api/todos/{id}`. Absent fields keep their stored value; an
/// `id` in the body is ignored in favour of the path.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TodoUpdateRequest {
    #[serde(default, alias = "user_id", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// A stored todo. The owner goes over the wire as `user_id`, the name existing
/// clients read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TodoResponse {
    pub id: Uuid,
    #[serde(rename = "user_id", alias = "owner_id")]
    pub owner_id: String,
    pub description: String,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_accepts_legacy_user_id() {
        let request: TodoCreateRequest =
            serde_json::from_str(r#"{"user_id":"u1","description":"buy milk"}"#)
                .expect("valid payload");

        assert_eq!(request.owner_id, "u1");
        assert_eq!(request.description, "buy milk");
        assert!(!request.completed);
        assert!(request.id.is_none());
    }

    #[test]
    fn create_request_defaults_missing_strings_to_empty() {
        let request: TodoCreateRequest = serde_json::from_str("{}").expect("valid payload");
        assert!(request.owner_id.is_empty());
        assert!(request.description.is_empty());
    }

    #[test]
    fn update_request_ignores_body_id() {
        let request: TodoUpdateRequest = serde_json::from_str(
            r#"{"id":"not-a-uuid","description":"buy oat milk","completed":true}"#,
        )
        .expect("unknown fields are ignored");

        assert_eq!(request.description.as_deref(), Some("buy oat milk"));
        assert_eq!(request.completed, Some(true));
        assert!(request.owner_id.is_none());
    }

    #[test]
    fn response_timestamps_are_rfc3339() {
        let response = TodoResponse {
            id: Uuid::nil(),
            owner_id: "u1".to_string(),
            description: "buy milk".to_string(),
            completed: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_value(&response).expect("serializable");
        assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");
        assert_eq!(json["user_id"], "u1");
        assert!(json.get("owner_id").is_none());
    }

    #[test]
    fn response_reads_either_owner_field_name() {
        let legacy: TodoResponse = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000000","user_id":"u1",
                "description":"buy milk","completed":false,
                "created_at":"1970-01-01T00:00:00Z","updated_at":"1970-01-01T00:00:00Z"}"#,
        )
        .expect("legacy payload");
        let renamed: TodoResponse = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000000","owner_id":"u1",
                "description":"buy milk","completed":false,
                "created_at":"1970-01-01T00:00:00Z","updated_at":"1970-01-01T00:00:00Z"}"#,
        )
        .expect("renamed payload");

        assert_eq!(legacy, renamed);
        assert_eq!(legacy.owner_id, "u1");
    }
}
