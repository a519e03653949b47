// src/storage/mod.rs

pub mod key_record;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod traits;

pub use key_record::{mask_secret, CallRecord, KeyRecord, MIN_SECRET_LEN};
pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;
pub use traits::{CallStore, KeyStore};

/// Anything that can back both the key table and the call ledger.
pub trait Store: KeyStore + CallStore {}

impl<T: KeyStore + CallStore> Store for T {}
