use std::sync::Arc;

use crate::application::todos::TodoService;
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct ApiState {
    pub todos: Arc<TodoService>,
    pub db: Arc<PostgresRepositories>,
}
