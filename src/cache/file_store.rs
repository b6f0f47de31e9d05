use async_trait::async_trait;
use chrono::{Duration, Utc};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::fs::{File, create_dir_all, remove_file};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::warn;

use super::store::{CacheEntry, CacheStore, StoredEntry};
use crate::error::{Error, Result};

/// キーごとに1ファイルの JSON キャッシュストア（gzip圧縮対応）
///
/// プロセスをまたいでスキーマや候補リストを再利用するためのもの。
pub struct FileCacheStore {
    /// データディレクトリのパス
    data_dir: PathBuf,
    /// gzip圧縮を使用するかどうか
    use_compression: bool,
    stale_retention: Duration,
}

impl FileCacheStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            use_compression: true,
            stale_retention: Duration::hours(1),
        }
    }

    /// デフォルトのキャッシュディレクトリで作成
    pub fn default_cache_dir() -> Result<Self> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| Error::Configuration("cache directory not found".to_string()))?
            .join("jira-fields");
        Ok(Self::new(dir))
    }

    /// 圧縮設定を変更
    pub fn with_compression(mut self, use_compression: bool) -> Self {
        self.use_compression = use_compression;
        self
    }

    pub fn with_stale_retention(mut self, retention: Duration) -> Self {
        self.stale_retention = retention;
        self
    }

    /// データディレクトリを初期化
    pub async fn initialize(&self) -> Result<()> {
        create_dir_all(&self.data_dir).await?;
        Ok(())
    }

    /// キーからファイルパスを得る（キーはURLエンコードしてファイル名にする）
    fn entry_path(&self, key: &str) -> PathBuf {
        let extension = if self.use_compression { "json.gz" } else { "json" };
        self.data_dir
            .join(format!("{}.{}", urlencoding::encode(key), extension))
    }

    fn encode(&self, entry: &StoredEntry) -> Result<Vec<u8>> {
        let json_data = serde_json::to_vec(entry)
            .map_err(|e| Error::Cache(format!("JSON serialization failed: {}", e)))?;

        if !self.use_compression {
            return Ok(json_data);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json_data)?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, raw_data: &[u8]) -> Result<StoredEntry> {
        let json_data = if self.use_compression {
            let mut decoder = GzDecoder::new(raw_data);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            decompressed
        } else {
            raw_data.to_vec()
        };

        serde_json::from_slice(&json_data)
            .map_err(|e| Error::Cache(format!("JSON deserialization failed: {}", e)))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&path).await?;
        let mut raw_data = Vec::new();
        file.read_to_end(&mut raw_data).await?;

        let stored = match self.decode(&raw_data) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(%key, error = %err, "discarding unreadable cache file");
                let _ = remove_file(&path).await;
                return Ok(None);
            }
        };

        let now = Utc::now();
        if stored.is_expired(now) {
            let _ = remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(stored.to_entry(now)))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        create_dir_all(&self.data_dir).await?;
        let stored = StoredEntry::new(value, ttl, self.stale_retention);
        let data = self.encode(&stored)?;

        let mut file = File::create(self.entry_path(key)).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_roundtrip_compressed() {
        // Given: 一時ディレクトリのストア
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path());
        store.initialize().await.unwrap();

        // When: コロンを含むキーで保存して読み出す
        store
            .set("lookup:PROJ:component", "[1,2]".to_string(), Duration::seconds(60))
            .await
            .unwrap();
        let entry = store.get("lookup:PROJ:component").await.unwrap().unwrap();

        // Then: 値が復元され、ファイル名はエンコードされている
        assert_eq!(entry.value, "[1,2]");
        assert!(!entry.is_stale);
        assert!(temp_dir.path().join("lookup%3APROJ%3Acomponent.json.gz").exists());
    }

    #[tokio::test]
    async fn test_file_store_uncompressed_stale() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path()).with_compression(false);

        store.set("k", "v".to_string(), Duration::zero()).await.unwrap();
        let entry = store.get("k").await.unwrap().unwrap();

        assert!(entry.is_stale);
        assert!(temp_dir.path().join("k.json").exists());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_miss() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path()).with_compression(false);
        tokio::fs::write(temp_dir.path().join("k.json"), b"not json")
            .await
            .unwrap();

        assert!(store.get("k").await.unwrap().is_none());
        assert!(!temp_dir.path().join("k.json").exists());
    }

    #[tokio::test]
    async fn test_file_store_missing_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(temp_dir.path());

        assert!(store.get("missing").await.unwrap().is_none());
        store.set("k", "v".to_string(), Duration::seconds(60)).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }
}
