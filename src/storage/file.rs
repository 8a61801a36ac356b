//! 文件键值存储
//! 全部键值以 MessagePack 格式存放在单个文件中，每次写入整体落盘

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rmp_serde::{Serializer, from_slice};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{TabGroupError, TgResult};
use crate::host::KvStore;

#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    // 串行化文件读写
    lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> TgResult<HashMap<String, Value>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        // MessagePack反序列化
        from_slice(&data).map_err(|e| TabGroupError::MsgPackError(format!("deserialize failed: {}", e)))
    }

    async fn save(&self, entries: &HashMap<String, Value>) -> TgResult<()> {
        let mut data = Vec::new();
        entries
            .serialize(&mut Serializer::new(&mut data))
            .map_err(|e| TabGroupError::MsgPackError(format!("serialize failed: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, &data).await?;
        debug!("Store {} written, {} keys, {} bytes", self.path.display(), entries.len(), data.len());
        Ok(())
    }

    /// 删除存储文件
    pub async fn clear(&self) -> TgResult<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> TgResult<Option<Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> TgResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value);
        self.save(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rstabgroup-{}-{}.mp", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let path = temp_path("persist");
        let store = FileKvStore::new(&path);
        store.clear().await.unwrap();

        assert_eq!(store.get("settings").await.unwrap(), None);
        store.set("settings", json!({"focusMode": true})).await.unwrap();
        store.set("groupColorMapping", json!({"GitHub": "purple"})).await.unwrap();

        let reopened = FileKvStore::new(&path);
        assert_eq!(reopened.get("settings").await.unwrap(), Some(json!({"focusMode": true})));
        assert_eq!(reopened.get("groupColorMapping").await.unwrap(), Some(json!({"GitHub": "purple"})));

        reopened.clear().await.unwrap();
        assert_eq!(reopened.get("settings").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let path = temp_path("corrupt");
        tokio::fs::write(&path, b"\xc1\xc1\xc1").await.unwrap();
        let store = FileKvStore::new(&path);
        assert!(matches!(store.get("settings").await, Err(TabGroupError::MsgPackError(_))));
        store.clear().await.unwrap();
    }
}
