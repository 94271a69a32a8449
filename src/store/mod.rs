//! Persistence of session credentials across restarts.
//!
//! The bot only needs a tiny key-value surface: [`CredentialStore::get`] and
//! [`CredentialStore::set`]. The keys it uses are listed below. The
//! [`FileCredentialStore`] keeps them in a JSON file inside the bot's storage
//! directory.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;

use crate::{error::BotError, protocol::Session};

mod file;

pub use crate::store::file::FileCredentialStore;

/// Access token of the bot device.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// User id resolved by the homeserver at login.
pub const USER_ID_KEY: &str = "userId";
/// Device id created at login.
pub const DEVICE_ID_KEY: &str = "deviceId";
/// Latest sync batch token.
pub const SYNC_TOKEN_KEY: &str = "syncToken";

/// Key-value store scoped to a single bot.
#[automock]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BotError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), BotError>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, BotError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), BotError> {
        (**self).set(key, value).await
    }
}

/// Writes the three session values.
pub async fn store_session<S: CredentialStore + ?Sized>(
    store: &S,
    session: &Session,
) -> Result<(), BotError> {
    store.set(ACCESS_TOKEN_KEY, &session.access_token).await?;
    store.set(USER_ID_KEY, &session.user_id).await?;
    store.set(DEVICE_ID_KEY, &session.device_id).await?;
    Ok(())
}

/// Reads the session values back.
///
/// Returns `Ok(None)` when no access token is stored.
///
/// # Errors
///
/// Returns [`BotError::Store`] if a token is present but the user or device id
/// is missing.
pub async fn load_session<S: CredentialStore + ?Sized>(
    store: &S,
) -> Result<Option<Session>, BotError> {
    let Some(access_token) = store.get(ACCESS_TOKEN_KEY).await? else {
        return Ok(None);
    };

    let user_id = store
        .get(USER_ID_KEY)
        .await?
        .ok_or_else(|| BotError::Store(format!("\"{USER_ID_KEY}\" missing next to access token")))?;
    let device_id = store.get(DEVICE_ID_KEY).await?.ok_or_else(|| {
        BotError::Store(format!("\"{DEVICE_ID_KEY}\" missing next to access token"))
    })?;

    Ok(Some(Session {
        access_token,
        user_id,
        device_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_load_session_without_token() {
        let mut store = MockCredentialStore::new();
        store
            .expect_get()
            .with(eq(ACCESS_TOKEN_KEY))
            .times(1)
            .returning(|_| Ok(None));

        assert_eq!(load_session(&store).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_session_with_all_values() {
        let mut store = MockCredentialStore::new();
        store.expect_get().returning(|key| {
            Ok(Some(
                match key {
                    ACCESS_TOKEN_KEY => "token",
                    USER_ID_KEY => "@bot:example.com",
                    DEVICE_ID_KEY => "DEVICE",
                    _ => unreachable!(),
                }
                .to_owned(),
            ))
        });

        let session = load_session(&store).await.unwrap().unwrap();
        assert_eq!(session.access_token, "token");
        assert_eq!(session.user_id, "@bot:example.com");
        assert_eq!(session.device_id, "DEVICE");
    }

    #[tokio::test]
    async fn test_load_session_with_missing_device() {
        let mut store = MockCredentialStore::new();
        store.expect_get().returning(|key| {
            Ok(match key {
                ACCESS_TOKEN_KEY => Some("token".to_owned()),
                USER_ID_KEY => Some("@bot:example.com".to_owned()),
                _ => None,
            })
        });

        assert!(matches!(
            load_session(&store).await,
            Err(BotError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_store_session_writes_three_keys() {
        let mut store = MockCredentialStore::new();
        store
            .expect_set()
            .with(eq(ACCESS_TOKEN_KEY), eq("token"))
            .times(1)
            .returning(|_, _| Ok(()));
        store
            .expect_set()
            .with(eq(USER_ID_KEY), eq("@bot:example.com"))
            .times(1)
            .returning(|_, _| Ok(()));
        store
            .expect_set()
            .with(eq(DEVICE_ID_KEY), eq("DEVICE"))
            .times(1)
            .returning(|_, _| Ok(()));

        let session = Session {
            access_token: "token".to_owned(),
            user_id: "@bot:example.com".to_owned(),
            device_id: "DEVICE".to_owned(),
        };
        store_session(&store, &session).await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_store_forwards_calls() {
        let mut store = MockCredentialStore::new();
        store
            .expect_get()
            .with(eq(SYNC_TOKEN_KEY))
            .times(1)
            .returning(|_| Ok(Some("s1_2_3".to_owned())));

        let shared = Arc::new(store);
        assert_eq!(
            shared.get(SYNC_TOKEN_KEY).await.unwrap().as_deref(),
            Some("s1_2_3")
        );
    }
}
