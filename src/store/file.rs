use std::{collections::BTreeMap, path::PathBuf};

use async_trait::async_trait;
use log::{debug, trace};
use tokio::{fs, sync::Mutex};

use crate::{error::BotError, store::CredentialStore};

/// Name of the credentials file inside the storage directory.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Credential store backed by a JSON file.
///
/// # File Structure
///
/// The storage directory contains:
/// - `credentials.json`: flat JSON object of the stored keys
/// - `sqlite/`: state and encryption stores of the protocol client
///
/// The file is read once when the store is opened and rewritten on every
/// [`CredentialStore::set`].
///
/// # Examples
///
/// ```no_run
/// use matrix_basic_bot::{CredentialStore, FileCredentialStore};
///
/// # async fn example() -> Result<(), matrix_basic_bot::BotError> {
/// let store = FileCredentialStore::open("./bot-data").await?;
/// store.set("accessToken", "secret").await?;
/// assert_eq!(store.get("accessToken").await?.as_deref(), Some("secret"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    /// Path of the credentials file. Value is `dir_path/credentials.json`
    path: PathBuf,
    /// In-memory copy of the file
    values: Mutex<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Opens the store in `dir_path`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Store`] if the directory cannot be created or the
    /// credentials file exists but is not valid JSON.
    pub async fn open(dir_path: &str) -> Result<Self, BotError> {
        debug!("open credential store at {}", dir_path);

        fs::create_dir_all(dir_path)
            .await
            .map_err(|e| BotError::Store(format!("cannot create {dir_path}: {e}")))?;

        let path: PathBuf = [dir_path, CREDENTIALS_FILE].iter().collect();
        let values = Self::read_values(&path).await?;
        debug!("found {} stored credential(s)", values.len());

        Ok(FileCredentialStore {
            path,
            values: Mutex::new(values),
        })
    }

    async fn read_values(path: &PathBuf) -> Result<BTreeMap<String, String>, BotError> {
        if !fs::try_exists(path).await.unwrap_or_default() {
            return Ok(BTreeMap::new());
        }

        let data = fs::read_to_string(path)
            .await
            .map_err(|e| BotError::Store(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| BotError::Store(format!("corrupt {}: {e}", path.display())))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BotError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BotError> {
        trace!("persist {}", key);

        let mut values = self.values.lock().await;
        let mut updated = values.clone();
        updated.insert(key.to_owned(), value.to_owned());

        let serialized = serde_json::to_string(&updated)
            .map_err(|e| BotError::Store(format!("cannot serialize credentials: {e}")))?;

        // Replace the file in one step so a failed write never leaves a torn file
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .await
            .map_err(|e| BotError::Store(format!("cannot write {}: {e}", tmp_path.display())))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| BotError::Store(format!("cannot replace {}: {e}", self.path.display())))?;

        *values = updated;
        trace!("{} persisted", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ACCESS_TOKEN_KEY, SYNC_TOKEN_KEY};
    use tempfile::TempDir;

    fn dir_path(temp_dir: &TempDir) -> String {
        temp_dir.path().to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_open_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::open(&dir_path(&temp_dir)).await.unwrap();

        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
        assert!(!temp_dir.path().join(CREDENTIALS_FILE).exists());
    }

    #[tokio::test]
    async fn test_open_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");

        FileCredentialStore::open(&nested.to_string_lossy())
            .await
            .unwrap();

        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = dir_path(&temp_dir);

        let store = FileCredentialStore::open(&path).await.unwrap();
        store.set(ACCESS_TOKEN_KEY, "token").await.unwrap();
        store.set(SYNC_TOKEN_KEY, "s1_2_3").await.unwrap();
        drop(store);

        let reopened = FileCredentialStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(),
            Some("token")
        );
        assert_eq!(
            reopened.get(SYNC_TOKEN_KEY).await.unwrap().as_deref(),
            Some("s1_2_3")
        );
    }

    #[tokio::test]
    async fn test_set_overwrites_value() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::open(&dir_path(&temp_dir)).await.unwrap();

        store.set(SYNC_TOKEN_KEY, "first").await.unwrap();
        store.set(SYNC_TOKEN_KEY, "second").await.unwrap();

        assert_eq!(
            store.get(SYNC_TOKEN_KEY).await.unwrap().as_deref(),
            Some("second")
        );
        let content = fs::read_to_string(temp_dir.path().join(CREDENTIALS_FILE))
            .await
            .unwrap();
        assert!(!content.contains("first"));
    }

    #[tokio::test]
    async fn test_set_leaves_no_temporary_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::open(&dir_path(&temp_dir)).await.unwrap();

        store.set(ACCESS_TOKEN_KEY, "token").await.unwrap();

        let mut entries = fs::read_dir(temp_dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec![CREDENTIALS_FILE.to_owned()]);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_value() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store");
        let store = FileCredentialStore::open(&path.to_string_lossy())
            .await
            .unwrap();
        store.set(SYNC_TOKEN_KEY, "first").await.unwrap();

        fs::remove_dir_all(&path).await.unwrap();
        let result = store.set(SYNC_TOKEN_KEY, "second").await;

        assert!(matches!(result, Err(BotError::Store(_))));
        assert_eq!(
            store.get(SYNC_TOKEN_KEY).await.unwrap().as_deref(),
            Some("first")
        );
    }

    #[tokio::test]
    async fn test_open_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CREDENTIALS_FILE), "invalid json")
            .await
            .unwrap();

        let result = FileCredentialStore::open(&dir_path(&temp_dir)).await;
        assert!(matches!(result, Err(BotError::Store(_))));
    }
}
