use std::path::Path;

use async_trait::async_trait;
use log::{info, warn};
use sqlx::SqlitePool;
use sqlx::sqlite::*;

use super::{Fingerprints, MediaCatalog, MediaRecord};
use crate::descriptor::DescriptorSet;
use crate::error::Result;

type MediaRow = (i64, String, Option<String>, Option<String>);

/// 基于 SQLite 的媒体目录
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// 打开数据库，不存在时创建并执行迁移
    pub async fn open(filename: impl AsRef<Path>) -> Result<Self> {
        let filename = filename.as_ref();
        info!("初始化数据库连接: {}", filename.display());

        let options = SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .filename(filename)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;

        info!("检查数据库迁移");
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<MediaRecord>> {
        let rows: Vec<MediaRow> = sqlx::query_as(sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(to_record).collect())
    }
}

/// 解析失败的描述符按缺失处理，不影响其他记录
fn to_record((id, title, descriptors, perceptual_hash): MediaRow) -> MediaRecord {
    let descriptors = descriptors.and_then(|json| {
        serde_json::from_str::<DescriptorSet>(&json)
            .inspect_err(|e| warn!("媒体 {} 的描述符无法解析: {}", id, e))
            .ok()
    });
    MediaRecord { id, title, descriptors, perceptual_hash }
}

#[async_trait]
impl MediaCatalog for SqliteCatalog {
    async fn find_all_with_descriptors(&self) -> Result<Vec<MediaRecord>> {
        self.fetch(
            "SELECT id, title, descriptors, perceptual_hash FROM media \
             WHERE descriptors IS NOT NULL ORDER BY id",
        )
        .await
    }

    async fn find_all_with_perceptual_hash(&self) -> Result<Vec<MediaRecord>> {
        self.fetch(
            "SELECT id, title, descriptors, perceptual_hash FROM media \
             WHERE perceptual_hash IS NOT NULL ORDER BY id",
        )
        .await
    }

    async fn insert(&self, title: &str, fingerprints: &Fingerprints) -> Result<i64> {
        let descriptors = serde_json::to_string(&fingerprints.descriptors)?;
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO media (title, descriptors, perceptual_hash) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(title)
        .bind(descriptors)
        .bind(&fingerprints.perceptual_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn replace_fingerprints(&self, id: i64, fingerprints: &Fingerprints) -> Result<bool> {
        let descriptors = serde_json::to_string(&fingerprints.descriptors)?;
        let result =
            sqlx::query("UPDATE media SET descriptors = ?, perceptual_hash = ? WHERE id = ?")
                .bind(descriptors)
                .bind(&fingerprints.perceptual_hash)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BackendKind;

    #[tokio::test]
    async fn test_sqlite_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SqliteCatalog::open(dir.path().join("scanmatch.db")).await.unwrap();

        let fingerprints = Fingerprints {
            descriptors: DescriptorSet::new(BackendKind::Native, vec![vec![1; 32], vec![2; 32]]),
            perceptual_hash: Some("00ff00ff00ff00ff".to_string()),
        };
        let id = catalog.insert("海报", &fingerprints).await.unwrap();

        let records = catalog.find_all_with_descriptors().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].title, "海报");
        assert_eq!(records[0].descriptors.as_ref(), Some(&fingerprints.descriptors));
        assert_eq!(catalog.find_all_with_perceptual_hash().await.unwrap().len(), 1);

        let replaced = Fingerprints { perceptual_hash: None, ..fingerprints };
        assert!(catalog.replace_fingerprints(id, &replaced).await.unwrap());
        assert!(catalog.find_all_with_perceptual_hash().await.unwrap().is_empty());

        assert!(catalog.delete(id).await.unwrap());
        assert!(catalog.find_all_with_descriptors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_descriptors_are_readable() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SqliteCatalog::open(dir.path().join("scanmatch.db")).await.unwrap();
        sqlx::query("INSERT INTO media (title, descriptors) VALUES ('old', '[[1,2],[3,4]]'), ('bad', 'oops')")
            .execute(&catalog.pool)
            .await
            .unwrap();

        let records = catalog.find_all_with_descriptors().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].descriptors.as_ref().map(|d| d.backend), Some(None));
        assert!(records[1].descriptors.is_none());
    }
}
