use sqlx::{Row, SqlitePool};

use beaver_common::{AnyMap, Error, Result};

/// Binary object store over `beaver_blobs`. Despite being named alongside
/// the "external collaborator" managers in the data model, it is plain
/// CRUD: no internal lock is needed because every write replaces a whole
/// row rather than mutating it in place.
pub struct Blob {
    pool: SqlitePool,
    name: String,
}

impl Blob {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self { pool, name: name.into() }
    }

    pub async fn set(&self, key: &str, data: &[u8], metadata: Option<&AnyMap>) -> Result<()> {
        let metadata_json = match metadata {
            Some(m) => Some(serde_json::to_string(m)?),
            None => None,
        };
        sqlx::query(
            "INSERT INTO beaver_blobs (store_name, key, data, metadata_json) VALUES (?, ?, ?, ?)
             ON CONFLICT(store_name, key) DO UPDATE SET data = excluded.data, metadata_json = excluded.metadata_json",
        )
        .bind(&self.name)
        .bind(key)
        .bind(data)
        .bind(metadata_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<(Vec<u8>, Option<AnyMap>)> {
        let row = sqlx::query("SELECT data, metadata_json FROM beaver_blobs WHERE store_name = ? AND key = ?")
            .bind(&self.name)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(Error::NotFound);
        };
        let data: Vec<u8> = row.get("data");
        let metadata_json: Option<String> = row.get("metadata_json");
        let metadata = metadata_json.map(|text| serde_json::from_str(&text)).transpose()?;
        Ok((data, metadata))
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM beaver_blobs WHERE store_name = ? AND key = ?")
            .bind(&self.name)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS present FROM beaver_blobs WHERE store_name = ? AND key = ?")
            .bind(&self.name)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn len(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM beaver_blobs WHERE store_name = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
