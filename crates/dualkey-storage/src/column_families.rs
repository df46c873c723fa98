//! RocksDB column family definitions.

/// Pending challenges: challenge_id → Challenge (TTL enforced on read)
pub const CF_CHALLENGES: &str = "challenges";

/// Authenticators: credential_id (base64url) → Authenticator
pub const CF_AUTHENTICATORS: &str = "authenticators";

/// Authenticators by user index: (user_id, credential_id) → ()
pub const CF_AUTHENTICATORS_BY_USER: &str = "authenticators_by_user";

/// Key records: user_id → KeyRecord (encrypted server share, device public key, recovery hash)
pub const CF_KEY_RECORDS: &str = "key_records";

/// Transaction intents bound to a challenge: challenge_id → TransactionIntent
pub const CF_TRANSACTION_INTENTS: &str = "transaction_intents";

/// Wallet directory entries: (user_id, slot) → Wallet
pub const CF_WALLETS: &str = "wallets";

/// Wallet lookup by address: address → (user_id, slot)
pub const CF_WALLETS_BY_ADDRESS: &str = "wallets_by_address";

/// Next free wallet slot per user: user_id → u64
pub const CF_WALLET_SLOTS: &str = "wallet_slots";

/// Get all column family names
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        CF_CHALLENGES,
        CF_AUTHENTICATORS,
        CF_AUTHENTICATORS_BY_USER,
        CF_KEY_RECORDS,
        CF_TRANSACTION_INTENTS,
        CF_WALLETS,
        CF_WALLETS_BY_ADDRESS,
        CF_WALLET_SLOTS,
    ]
}
