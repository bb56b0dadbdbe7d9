//! secp256k1 key material and key generation.

use crate::address::Address;
use crate::hash::{strip_0x, HexError};
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use std::fmt;
use std::str::FromStr;

/// A secp256k1 signing key.
///
/// `Debug` never prints key material.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(SecretKey);

impl SigningKey {
    /// Generate a fresh random key from the OS-seeded thread RNG.
    pub fn random() -> Self {
        Self(SecretKey::new(&mut secp256k1::rand::thread_rng()))
    }

    /// Construct from 32 raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| KeyError::OutOfRange)
    }

    /// `0x`-prefixed hex of the secret.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0.secret_bytes()))
    }

    /// Derive the account address for this key.
    pub fn address(&self) -> Address {
        let public = PublicKey::from_secret_key(SECP256K1, &self.0);
        Address::from_uncompressed_public_key(&public.serialize_uncompressed())
    }

    pub(crate) fn inner(&self) -> &SecretKey {
        &self.0
    }
}

impl FromStr for SigningKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = strip_0x(s.trim());
        if hex.len() != 64 {
            return Err(KeyError::Hex(HexError::InvalidLength {
                expected: 64,
                actual: hex.len(),
            }));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex, &mut bytes).map_err(|_| KeyError::Hex(HexError::InvalidHex))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// Errors from parsing or constructing keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid key hex: {0}")]
    Hex(#[from] HexError),

    #[error("Secret key is zero or not below the curve order")]
    OutOfRange,
}

/// Source of fresh key pairs.
pub trait KeyProvider: Send + Sync {
    /// Generate an independent key pair, returning the derived identity and secret.
    fn generate_keypair(&self) -> (Address, SigningKey);
}

/// Random secp256k1 keys with Keccak-derived addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1KeyProvider;

impl KeyProvider for Secp256k1KeyProvider {
    fn generate_keypair(&self) -> (Address, SigningKey) {
        let key = SigningKey::random();
        (key.address(), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_key_address() {
        // Private key 1 maps to this well-known address.
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let key = SigningKey::from_bytes(&bytes).unwrap();
        assert_eq!(
            key.address().to_checksum(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_parse_hex_roundtrip() {
        let key = SigningKey::random();
        let parsed: SigningKey = key.to_hex().parse().unwrap();
        assert_eq!(parsed, key);
        let unprefixed: SigningKey = key.to_hex()[2..].parse().unwrap();
        assert_eq!(unprefixed.address(), key.address());
    }

    #[test]
    fn test_zero_key_rejected() {
        assert_eq!(SigningKey::from_bytes(&[0u8; 32]), Err(KeyError::OutOfRange));
    }

    #[test]
    fn test_provider_generates_distinct_keys() {
        let provider = Secp256k1KeyProvider;
        let (a, ka) = provider.generate_keypair();
        let (b, _) = provider.generate_keypair();
        assert_ne!(a, b);
        assert_eq!(ka.address(), a);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = SigningKey::random();
        assert_eq!(format!("{:?}", key), "SigningKey(..)");
    }
}
