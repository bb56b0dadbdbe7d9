//! Accounts used as transfer senders and receivers.

use crate::address::Address;
use crate::crypto::{KeyProvider, SigningKey};

/// An account the process can sign for.
///
/// Immutable once created. Sequence numbers are not stored here; they live
/// in the spammer's nonce allocator so that every worker sees one source of
/// truth per sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Public identity.
    pub address: Address,
    /// Signing key.
    pub key: SigningKey,
}

impl Account {
    /// Build an account from a key, deriving its address.
    pub fn from_key(key: SigningKey) -> Self {
        Self {
            address: key.address(),
            key,
        }
    }

    /// Generate a fresh account from a key provider.
    pub fn generate(keys: &dyn KeyProvider) -> Self {
        let (address, key) = keys.generate_keypair();
        Self { address, key }
    }
}
