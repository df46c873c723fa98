//! Store contracts consumed by the verifier.
//!
//! Both contracts are implemented for every [`Storage`] backend, so a
//! `RocksDbStorage` can serve as challenge store and credential store at
//! once. Other backends (a TTL cache for challenges, a relational user
//! store) implement the traits directly.

use crate::{errors::Result, types::*, verifier::check_sign_count};
use async_trait::async_trait;
use dualkey_crypto::current_timestamp;
use dualkey_storage::{
    BatchExt, Storage, CF_AUTHENTICATORS, CF_AUTHENTICATORS_BY_USER, CF_CHALLENGES,
};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Single-use challenge persistence
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Persist a challenge for at most `ttl`
    async fn put_challenge(&self, challenge: &Challenge, ttl: Duration) -> Result<()>;

    /// Atomically fetch and delete a challenge
    ///
    /// Returns `None` if it was never stored, already taken or has outlived
    /// its TTL. Of two concurrent calls for one id, at most one gets `Some`.
    async fn get_and_delete(&self, challenge_id: &Uuid) -> Result<Option<Challenge>>;
}

/// Authenticator persistence
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_authenticator(&self, credential_id: &[u8]) -> Result<Option<Authenticator>>;

    /// Insert or replace an authenticator record
    async fn save_authenticator(&self, authenticator: &Authenticator) -> Result<()>;

    /// Record `presented` as the new signature counter if it passes
    /// [`check_sign_count`] against the counter stored right now
    ///
    /// Check and write are one atomic step: of two concurrent calls
    /// presenting the same counter, at most one advances.
    async fn advance_authenticator_counter(
        &self,
        credential_id: &[u8],
        presented: u32,
        used_at: u64,
    ) -> Result<CounterAdvance>;

    async fn list_authenticators(&self, user_id: &Uuid) -> Result<Vec<Authenticator>>;
}

/// Stored challenge with its eviction time
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredChallenge {
    challenge: Challenge,
    evict_at: u64,
}

#[async_trait]
impl<S: Storage> ChallengeStore for S {
    async fn put_challenge(&self, challenge: &Challenge, ttl: Duration) -> Result<()> {
        let stored = StoredChallenge {
            challenge: challenge.clone(),
            evict_at: current_timestamp() + ttl.as_secs(),
        };
        Storage::put(self, CF_CHALLENGES, &challenge.challenge_id, &stored).await?;
        Ok(())
    }

    async fn get_and_delete(&self, challenge_id: &Uuid) -> Result<Option<Challenge>> {
        let stored: Option<StoredChallenge> =
            Storage::take(self, CF_CHALLENGES, challenge_id).await?;

        Ok(stored.and_then(|s| {
            if current_timestamp() >= s.evict_at {
                debug!(challenge_id = %challenge_id, "Dropping evicted challenge");
                None
            } else {
                Some(s.challenge)
            }
        }))
    }
}

#[async_trait]
impl<S: Storage> CredentialStore for S {
    async fn find_authenticator(&self, credential_id: &[u8]) -> Result<Option<Authenticator>> {
        Ok(Storage::get(self, CF_AUTHENTICATORS, &credential_id.to_vec()).await?)
    }

    async fn save_authenticator(&self, authenticator: &Authenticator) -> Result<()> {
        let mut batch = self.batch();
        batch.put(CF_AUTHENTICATORS, &authenticator.credential_id, authenticator)?;
        batch.put(
            CF_AUTHENTICATORS_BY_USER,
            &(authenticator.user_id, authenticator.credential_id.clone()),
            &authenticator.credential_id,
        )?;
        batch.commit().await?;
        Ok(())
    }

    async fn advance_authenticator_counter(
        &self,
        credential_id: &[u8],
        presented: u32,
        used_at: u64,
    ) -> Result<CounterAdvance> {
        let mut stored = 0;
        let written = Storage::update(
            self,
            CF_AUTHENTICATORS,
            &credential_id.to_vec(),
            |authenticator: &mut Authenticator| {
                stored = authenticator.sign_count;
                if check_sign_count(authenticator, presented).is_err() {
                    return false;
                }
                authenticator.sign_count = presented;
                authenticator.last_used_at = Some(used_at);
                true
            },
        )
        .await?;

        Ok(match written {
            None => CounterAdvance::Missing,
            Some(true) => CounterAdvance::Advanced,
            Some(false) => CounterAdvance::Stale { stored },
        })
    }

    async fn list_authenticators(&self, user_id: &Uuid) -> Result<Vec<Authenticator>> {
        let index: Vec<(Vec<u8>, Vec<u8>)> =
            Storage::get_by_prefix(self, CF_AUTHENTICATORS_BY_USER, user_id).await?;

        let mut authenticators = Vec::with_capacity(index.len());
        for (_, credential_id) in index {
            let found: Option<Authenticator> =
                Storage::get(self, CF_AUTHENTICATORS, &credential_id).await?;
            if let Some(authenticator) = found {
                authenticators.push(authenticator);
            }
        }
        Ok(authenticators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::generate_challenge;
    use dualkey_storage::RocksDbStorage;

    fn authenticator(user_id: Uuid, credential_id: Vec<u8>) -> Authenticator {
        Authenticator {
            credential_id,
            user_id,
            public_key: CredentialPublicKey::EdDsa {
                public_key: [5u8; 32],
            },
            sign_count: 0,
            active: true,
            created_at: 1_700_000_000,
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn test_challenge_single_use() {
        let storage = RocksDbStorage::open_test().unwrap();
        let challenge =
            generate_challenge(ChallengePurpose::Authentication, None, None, 300).unwrap();

        storage
            .put_challenge(&challenge, Duration::from_secs(300))
            .await
            .unwrap();

        let first = storage.get_and_delete(&challenge.challenge_id).await.unwrap();
        let second = storage.get_and_delete(&challenge.challenge_id).await.unwrap();

        assert_eq!(first, Some(challenge));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_challenge_zero_ttl_is_evicted() {
        let storage = RocksDbStorage::open_test().unwrap();
        let challenge =
            generate_challenge(ChallengePurpose::Authentication, None, None, 300).unwrap();

        storage
            .put_challenge(&challenge, Duration::from_secs(0))
            .await
            .unwrap();

        assert_eq!(
            storage.get_and_delete(&challenge.challenge_id).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_authenticator_index_and_counter() {
        let storage = RocksDbStorage::open_test().unwrap();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        storage
            .save_authenticator(&authenticator(user_a, vec![1, 1]))
            .await
            .unwrap();
        storage
            .save_authenticator(&authenticator(user_a, vec![2, 2]))
            .await
            .unwrap();
        storage
            .save_authenticator(&authenticator(user_b, vec![3, 3]))
            .await
            .unwrap();

        assert_eq!(storage.list_authenticators(&user_a).await.unwrap().len(), 2);
        assert_eq!(storage.list_authenticators(&user_b).await.unwrap().len(), 1);

        let advanced = storage
            .advance_authenticator_counter(&[1, 1], 42, 1_700_000_100)
            .await
            .unwrap();
        assert_eq!(advanced, CounterAdvance::Advanced);
        let updated = storage.find_authenticator(&[1, 1]).await.unwrap().unwrap();
        assert_eq!(updated.sign_count, 42);
        assert_eq!(updated.last_used_at, Some(1_700_000_100));

        assert!(storage.find_authenticator(&[9, 9]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_counter_advance_rechecks_stored_value() {
        let storage = RocksDbStorage::open_test().unwrap();
        storage
            .save_authenticator(&authenticator(Uuid::new_v4(), vec![4, 4]))
            .await
            .unwrap();

        // First use may repeat the registration counter, later uses may not
        assert_eq!(
            storage
                .advance_authenticator_counter(&[4, 4], 0, 1_700_000_100)
                .await
                .unwrap(),
            CounterAdvance::Advanced
        );
        assert_eq!(
            storage
                .advance_authenticator_counter(&[4, 4], 0, 1_700_000_200)
                .await
                .unwrap(),
            CounterAdvance::Stale { stored: 0 }
        );
        assert_eq!(
            storage
                .advance_authenticator_counter(&[4, 4], 6, 1_700_000_300)
                .await
                .unwrap(),
            CounterAdvance::Advanced
        );
        assert_eq!(
            storage
                .advance_authenticator_counter(&[4, 4], 6, 1_700_000_400)
                .await
                .unwrap(),
            CounterAdvance::Stale { stored: 6 }
        );

        let kept = storage.find_authenticator(&[4, 4]).await.unwrap().unwrap();
        assert_eq!(kept.sign_count, 6);
        assert_eq!(kept.last_used_at, Some(1_700_000_300));

        assert_eq!(
            storage
                .advance_authenticator_counter(&[9, 9], 1, 1_700_000_500)
                .await
                .unwrap(),
            CounterAdvance::Missing
        );
    }
}
