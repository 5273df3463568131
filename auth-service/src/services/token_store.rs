use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{TokenKind, TokenRecord};
use crate::services::jwt::IssuedPair;
use crate::services::ServiceError;

/// Outcome of attempting to consume a refresh credential for rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshConsumption {
    /// This caller won the compare-and-swap; the presented refresh credential
    /// and its co-issued access credential are now revoked.
    Rotated,
    /// The row exists but was already revoked - a replayed or stolen
    /// credential.
    AlreadyRevoked,
    /// No row matches principal + token at all.
    Unknown,
}

/// Durable record of every issued credential and its revocation state.
///
/// "Exists as a live row" is the validator's source of truth, not the
/// signature alone. All mutations are atomic with respect to concurrent
/// requests; `consume_refresh` is the arbiter for rotation races.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert both halves of an issued pair as live rows, atomically. If this
    /// fails, no credential may be handed to the client.
    async fn record_pair(&self, principal_id: i64, pair: &IssuedPair)
        -> Result<(), ServiceError>;

    /// Look up a live row by principal + exact token string. Revoked and
    /// expired rows are excluded.
    async fn find_live(
        &self,
        principal_id: i64,
        token: &str,
    ) -> Result<Option<TokenRecord>, ServiceError>;

    /// Mark the matching row revoked. Revoking an already-revoked row is a
    /// no-op; a token with no row at all is `NotFound`.
    async fn revoke(&self, principal_id: i64, token: &str) -> Result<(), ServiceError>;

    /// Revoke every live row for the principal. Returns the number of rows
    /// revoked.
    async fn revoke_all(&self, principal_id: i64) -> Result<u64, ServiceError>;

    /// Compare-and-swap the refresh row's revoked flag and, on success,
    /// revoke its whole pair. At most one concurrent caller observes
    /// `Rotated` for a given credential.
    async fn consume_refresh(
        &self,
        principal_id: i64,
        token: &str,
    ) -> Result<RefreshConsumption, ServiceError>;

    /// Delete rows past their expiry. Revoked-but-unexpired rows are kept so
    /// replay attempts keep failing loudly. Returns the number of rows
    /// removed.
    async fn purge_expired(&self) -> Result<u64, ServiceError>;
}

/// In-memory token store.
///
/// Backs the test suite and small deployments; the mutex gives the same
/// atomicity the Postgres implementation gets from transactions.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<TokenRecord>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn insert(&mut self, principal_id: i64, kind: TokenKind, token: &str, pair_id: Uuid, expires_at: chrono::DateTime<Utc>) {
        self.next_id += 1;
        self.rows.push(TokenRecord {
            id: self.next_id,
            principal_id,
            kind,
            token: token.to_string(),
            pair_id,
            revoked: false,
            expires_at,
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn record_pair(
        &self,
        principal_id: i64,
        pair: &IssuedPair,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().await;
        inner.insert(
            principal_id,
            TokenKind::Access,
            &pair.access.token,
            pair.pair_id,
            pair.access.expires_at,
        );
        inner.insert(
            principal_id,
            TokenKind::Refresh,
            &pair.refresh.token,
            pair.pair_id,
            pair.refresh.expires_at,
        );
        Ok(())
    }

    async fn find_live(
        &self,
        principal_id: i64,
        token: &str,
    ) -> Result<Option<TokenRecord>, ServiceError> {
        let now = Utc::now();
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .iter()
            .find(|r| r.principal_id == principal_id && r.token == token && r.is_live(now))
            .cloned())
    }

    async fn revoke(&self, principal_id: i64, token: &str) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().await;
        let mut matched = false;
        for row in inner
            .rows
            .iter_mut()
            .filter(|r| r.principal_id == principal_id && r.token == token)
        {
            matched = true;
            row.revoked = true;
        }
        if matched {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Token"))
        }
    }

    async fn revoke_all(&self, principal_id: i64) -> Result<u64, ServiceError> {
        let mut inner = self.inner.lock().await;
        let mut revoked = 0;
        for row in inner
            .rows
            .iter_mut()
            .filter(|r| r.principal_id == principal_id && !r.revoked)
        {
            row.revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn consume_refresh(
        &self,
        principal_id: i64,
        token: &str,
    ) -> Result<RefreshConsumption, ServiceError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        let pair_id = match inner.rows.iter_mut().find(|r| {
            r.principal_id == principal_id && r.token == token && r.kind == TokenKind::Refresh
        }) {
            None => return Ok(RefreshConsumption::Unknown),
            Some(row) if !row.is_live(now) => return Ok(RefreshConsumption::AlreadyRevoked),
            Some(row) => {
                row.revoked = true;
                row.pair_id
            }
        };

        for row in inner.rows.iter_mut().filter(|r| r.pair_id == pair_id) {
            row.revoked = true;
        }

        Ok(RefreshConsumption::Rotated)
    }

    async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let before = inner.rows.len();
        inner.rows.retain(|r| !r.is_expired(now));
        Ok((before - inner.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::jwt::SignedCredential;
    use chrono::Duration;

    fn pair(access: &str, refresh: &str, ttl_secs: i64) -> IssuedPair {
        let expires_at = Utc::now() + Duration::seconds(ttl_secs);
        IssuedPair {
            pair_id: Uuid::new_v4(),
            access: SignedCredential {
                token: access.to_string(),
                expires_at,
            },
            refresh: SignedCredential {
                token: refresh.to_string(),
                expires_at,
            },
        }
    }

    #[tokio::test]
    async fn recorded_rows_are_live() {
        let store = MemoryTokenStore::new();
        store.record_pair(1, &pair("at", "rt", 60)).await.unwrap();

        assert!(store.find_live(1, "at").await.unwrap().is_some());
        assert!(store.find_live(1, "rt").await.unwrap().is_some());
        // Wrong principal sees nothing.
        assert!(store.find_live(2, "at").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_rows_are_not_live() {
        let store = MemoryTokenStore::new();
        store.record_pair(1, &pair("at", "rt", -1)).await.unwrap();

        assert!(store.find_live(1, "at").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoke_is_idempotent_but_unknown_is_not_found() {
        let store = MemoryTokenStore::new();
        store.record_pair(1, &pair("at", "rt", 60)).await.unwrap();

        store.revoke(1, "at").await.unwrap();
        // Second revoke of the same row is a no-op, not an error.
        store.revoke(1, "at").await.unwrap();
        assert!(store.find_live(1, "at").await.unwrap().is_none());

        let err = store.revoke(1, "nope").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn revoke_all_kills_every_live_row() {
        let store = MemoryTokenStore::new();
        store.record_pair(1, &pair("at1", "rt1", 60)).await.unwrap();
        store.record_pair(1, &pair("at2", "rt2", 60)).await.unwrap();

        assert_eq!(store.revoke_all(1).await.unwrap(), 4);
        assert!(store.find_live(1, "at2").await.unwrap().is_none());
        // Nothing left to revoke.
        assert_eq!(store.revoke_all(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn consume_refresh_revokes_the_whole_pair_once() {
        let store = MemoryTokenStore::new();
        store.record_pair(1, &pair("at", "rt", 60)).await.unwrap();

        assert_eq!(
            store.consume_refresh(1, "rt").await.unwrap(),
            RefreshConsumption::Rotated
        );
        // The co-issued access credential died with it.
        assert!(store.find_live(1, "at").await.unwrap().is_none());

        assert_eq!(
            store.consume_refresh(1, "rt").await.unwrap(),
            RefreshConsumption::AlreadyRevoked
        );
        assert_eq!(
            store.consume_refresh(1, "never-issued").await.unwrap(),
            RefreshConsumption::Unknown
        );
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let store = MemoryTokenStore::new();
        store.record_pair(1, &pair("old-at", "old-rt", -5)).await.unwrap();
        store.record_pair(1, &pair("at", "rt", 60)).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 2);
        assert!(store.find_live(1, "at").await.unwrap().is_some());
    }
}
