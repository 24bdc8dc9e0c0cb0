//! User account storage.

use crate::db::Database;
use crate::error::StorageResult;
use strato_core::{AuthMethod, UserId, UserRecord};

/// Store for user records and their linked auth methods.
#[derive(Debug, Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    /// Create a store over `db`.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Look a user up by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn get(&self, user_id: &UserId) -> StorageResult<Option<UserRecord>> {
        let mut response = self
            .db
            .client()
            .query("SELECT * FROM user WHERE user_id = $id LIMIT 1")
            .bind(("id", user_id.clone()))
            .await?;
        let mut rows: Vec<UserRecord> = response.take(0)?;
        Ok(rows.pop())
    }

    /// Insert or replace a user record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn save(&self, record: UserRecord) -> StorageResult<()> {
        self.db
            .client()
            .query("DELETE user WHERE user_id = $id; CREATE user CONTENT $data;")
            .bind(("id", record.user_id.clone()))
            .bind(("data", record))
            .await?
            .check()?;
        Ok(())
    }

    /// Link an auth method to a user. `(provider, provider_user_id)` is
    /// unique; relinking replaces the previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn link_auth_method(&self, method: AuthMethod) -> StorageResult<()> {
        self.db
            .client()
            .query(
                "DELETE auth_method WHERE provider = $provider AND provider_user_id = $pid; \
                 CREATE auth_method CONTENT $data;",
            )
            .bind(("provider", method.provider.clone()))
            .bind(("pid", method.provider_user_id.clone()))
            .bind(("data", method))
            .await?
            .check()?;
        Ok(())
    }

    /// Find the user owning `(provider, provider_user_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn find_by_auth(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> StorageResult<Option<UserRecord>> {
        let mut response = self
            .db
            .client()
            .query(
                "SELECT * FROM auth_method WHERE provider = $provider AND provider_user_id = $pid LIMIT 1",
            )
            .bind(("provider", provider.to_string()))
            .bind(("pid", provider_user_id.to_string()))
            .await?;
        let mut methods: Vec<AuthMethod> = response.take(0)?;
        match methods.pop() {
            Some(method) => self.get(&method.user_id).await,
            None => Ok(None),
        }
    }

    /// Auth methods linked to a user.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError`] on query failure.
    pub async fn auth_methods(&self, user_id: &UserId) -> StorageResult<Vec<AuthMethod>> {
        let mut response = self
            .db
            .client()
            .query("SELECT * FROM auth_method WHERE user_id = $id")
            .bind(("id", user_id.clone()))
            .await?;
        let methods: Vec<AuthMethod> = response.take(0)?;
        Ok(methods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> UserStore {
        UserStore::new(Database::connect_memory().await.unwrap())
    }

    fn user(id: &str) -> UserRecord {
        UserRecord::new(UserId::new(id), "Tester", 1000)
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = store().await;
        store.save(user("u1")).await.unwrap();

        let loaded = store.get(&UserId::new("u1")).await.unwrap().unwrap();
        assert_eq!(loaded.display_name, "Tester");
        assert_eq!(loaded.tokens_remaining(), 1000);
        assert!(store.get(&UserId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces() {
        let store = store().await;
        store.save(user("u1")).await.unwrap();

        let mut updated = user("u1");
        updated.record_usage(250);
        store.save(updated).await.unwrap();

        let loaded = store.get(&UserId::new("u1")).await.unwrap().unwrap();
        assert_eq!(loaded.tokens_remaining(), 750);
    }

    #[tokio::test]
    async fn test_auth_method_lookup() {
        let store = store().await;
        store.save(user("u1")).await.unwrap();
        store
            .link_auth_method(AuthMethod {
                provider: "discord".to_string(),
                provider_user_id: "snowflake-1".to_string(),
                user_id: UserId::new("u1"),
                credentials: String::new(),
                is_primary: true,
                is_verified: true,
            })
            .await
            .unwrap();

        let found = store
            .find_by_auth("discord", "snowflake-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, UserId::new("u1"));

        assert!(store.find_by_auth("discord", "other").await.unwrap().is_none());
        assert_eq!(store.auth_methods(&UserId::new("u1")).await.unwrap().len(), 1);
    }
}
