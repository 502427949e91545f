// crates/server/src/services/user.rs
//! User profile, registration, and XP accounting (all mutations through the
//! stored functions).

use crate::error::{ApiError, ApiResult};
use tracing::info;
use uuid::Uuid;
use zixue_db::{Database, ExperienceUpdate, SqlValue, Table, UserRow};

#[derive(Clone)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, user_id: Uuid) -> ApiResult<UserRow> {
        let rows = self
            .db
            .select(Table::Users, &[("user_id", SqlValue::from(user_id))], None)
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("user {user_id}")))?;
        serde_json::from_value(row).map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// Idempotent on email: an existing account is returned untouched.
    pub async fn register(&self, name: &str, email: &str) -> ApiResult<(UserRow, bool)> {
        if name.is_empty() || name.len() > 100 {
            return Err(ApiError::Validation(
                "name must be 1-100 characters".into(),
            ));
        }
        if !email.contains('@') || email.len() > 254 {
            return Err(ApiError::Validation("invalid email address".into()));
        }
        let (user, existed) = self.db.add_new_user(name, email).await?;
        if !existed {
            info!(user_id = %user.user_id, "registered new user");
        }
        Ok((user, existed))
    }

    /// Credit XP through the atomic stored function.
    pub async fn add_experience(&self, user_id: Uuid, delta: i64) -> ApiResult<ExperienceUpdate> {
        if delta < 0 {
            return Err(ApiError::Validation("experience delta must be non-negative".into()));
        }
        Ok(self.db.update_user_experience(user_id, delta).await?)
    }
}
