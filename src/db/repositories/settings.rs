use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use crate::{
    db::{
        helpers::{decode_value, encode_value, parse_datetime},
        models::SettingRecord,
        Database,
    },
    settings::SettingsBackend,
};

fn row_to_record(row: &Row) -> Result<SettingRecord> {
    let key: String = row.get("key")?;
    let value: String = row.get("value")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(SettingRecord {
        value: decode_value(&value, &key)?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
        key,
    })
}

impl Database {
    pub async fn get_setting(&self, key: &str) -> Result<Option<SettingRecord>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value, updated_at FROM settings WHERE key = ?1",
            )?;
            let mut rows = stmt.query(params![key])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_record(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Upserts `key` and returns the value it replaced. The read and the
    /// write share one transaction so the previous value is exact.
    pub async fn put_setting(&self, key: &str, value: &Value) -> Result<Option<Value>> {
        let key = key.to_string();
        let encoded = encode_value(value)?;
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open settings transaction")?;

            let previous: Option<String> = tx
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            tx.execute(
                "INSERT INTO settings (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, encoded, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write setting {key}"))?;

            tx.commit().context("failed to commit setting write")?;

            previous.map(|raw| decode_value(&raw, &key)).transpose()
        })
        .await
    }

    pub async fn list_settings(&self) -> Result<Vec<SettingRecord>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, value, updated_at FROM settings ORDER BY key ASC")?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }
}

#[async_trait]
impl SettingsBackend for Database {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_setting(key).await?.map(|record| record.value))
    }

    async fn write(&self, key: &str, value: Value) -> Result<Option<Value>> {
        self.put_setting(key, &value).await
    }
}
