// crates/server/src/services/settings.rs
//! Per-user settings: read, and partial upsert with defaults on first
//! write.

use crate::error::{ApiError, ApiResult};
use serde::Deserialize;
use serde_json::Value as Json;
use uuid::Uuid;
use zixue_core::now_ts;
use zixue_db::{Database, SqlValue, Table, UserSettingsRow};

const DEFAULT_LANGUAGE: &str = "zh-hk";

/// Fields accepted by the upsert; absent fields stay untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub language: Option<String>,
    pub theme: Option<String>,
    pub settings: Option<Json>,
}

#[derive(Clone)]
pub struct SettingsService {
    db: Database,
}

impl SettingsService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, user_id: Uuid) -> ApiResult<UserSettingsRow> {
        let rows = self
            .db
            .select(
                Table::UserSettings,
                &[("user_id", SqlValue::from(user_id))],
                None,
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("settings for user {user_id}")))?;
        serde_json::from_value(row).map_err(|e| ApiError::Internal(e.to_string()))
    }

    /// Create with defaults when absent, otherwise update only the supplied
    /// fields; `updated_at` is stamped either way.
    pub async fn upsert(&self, user_id: Uuid, patch: SettingsPatch) -> ApiResult<UserSettingsRow> {
        let existing = self
            .db
            .select(
                Table::UserSettings,
                &[("user_id", SqlValue::from(user_id))],
                Some(&["user_id"]),
            )
            .await?;

        let row = if existing.is_empty() {
            self.db
                .insert(
                    Table::UserSettings,
                    &[
                        ("user_id", SqlValue::from(user_id)),
                        (
                            "language",
                            SqlValue::from(
                                patch.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
                            ),
                        ),
                        ("theme", SqlValue::from(patch.theme)),
                        (
                            "settings",
                            SqlValue::from(patch.settings.unwrap_or_else(|| Json::Object(Default::default()))),
                        ),
                        ("updated_at", SqlValue::from(now_ts())),
                    ],
                )
                .await?
        } else {
            let mut set: Vec<(&str, SqlValue)> = vec![("updated_at", SqlValue::from(now_ts()))];
            if let Some(language) = patch.language {
                set.push(("language", SqlValue::from(language)));
            }
            if let Some(theme) = patch.theme {
                set.push(("theme", SqlValue::from(theme)));
            }
            if let Some(settings) = patch.settings {
                set.push(("settings", SqlValue::from(settings)));
            }
            let updated = self
                .db
                .update(
                    Table::UserSettings,
                    &set,
                    &[("user_id", SqlValue::from(user_id))],
                )
                .await?;
            updated
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::Internal("settings row vanished mid-update".into()))?
        };
        serde_json::from_value(row).map_err(|e| ApiError::Internal(e.to_string()))
    }
}
