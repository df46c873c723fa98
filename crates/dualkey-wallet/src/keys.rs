//! Key record persistence.

use crate::{errors::*, types::KeyRecord};
use dualkey_storage::{Batch, BatchExt, Storage, StorageError, CF_KEY_RECORDS};
use uuid::Uuid;

/// Load a user's key record
pub async fn load_key_record<S: Storage>(storage: &S, user_id: &Uuid) -> Result<KeyRecord> {
    storage
        .get(CF_KEY_RECORDS, user_id)
        .await?
        .ok_or(WalletError::KeyRecordNotFound(*user_id))
}

pub async fn find_key_record<S: Storage>(storage: &S, user_id: &Uuid) -> Result<Option<KeyRecord>> {
    Ok(storage.get(CF_KEY_RECORDS, user_id).await?)
}

/// Stage a user's first key record
///
/// The commit fails with a storage conflict, writing nothing, if a record
/// exists by then; see [`registration_conflict`].
pub fn stage_new_key_record(batch: &mut dyn Batch, record: &KeyRecord) -> Result<()> {
    batch.require_absent(CF_KEY_RECORDS, &record.user_id)?;
    batch.put(CF_KEY_RECORDS, &record.user_id, record)?;
    Ok(())
}

/// Map a conflicting commit of [`stage_new_key_record`] to `AlreadyRegistered`
pub fn registration_conflict(user_id: Uuid) -> impl FnOnce(WalletError) -> WalletError {
    move |e| match e {
        WalletError::Storage(StorageError::Conflict { cf }) if cf == CF_KEY_RECORDS => {
            WalletError::AlreadyRegistered(user_id)
        }
        other => other,
    }
}

/// Replace a user's key record
pub async fn save_key_record<S: Storage>(storage: &S, record: &KeyRecord) -> Result<()> {
    storage
        .put(CF_KEY_RECORDS, &record.user_id, record)
        .await?;
    Ok(())
}
