// crates/server/src/services/tasks.rs
//! Daily-task operations, thin over the stored functions.

use crate::error::ApiResult;
use uuid::Uuid;
use zixue_db::{Database, TaskProgressResult, TaskRow};

#[derive(Clone)]
pub struct TaskService {
    db: Database,
}

impl TaskService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Current tasks, creating today's daily task on first call of the
    /// (UTC+8) calendar day.
    pub async fn current(&self, user_id: Uuid) -> ApiResult<Vec<TaskRow>> {
        Ok(self.db.get_or_create_today_tasks(user_id).await?)
    }

    /// Update progress; completion grants the task's XP exactly once.
    pub async fn set_progress(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        progress: i64,
    ) -> ApiResult<TaskProgressResult> {
        Ok(self.db.set_task_progress(user_id, task_id, progress).await?)
    }
}
