//! Core types for ethbench.
//!
//! This crate provides the foundational types used by the load generator:
//!
//! - **Primitives**: Hash (Keccak-256), Address, Wei
//! - **Keys**: secp256k1 signing keys and the [`KeyProvider`] trait
//! - **Transfers**: legacy EIP-155 transfer signing via [`TransferSigner`]
//! - **Ledger trait**: [`LedgerClient`], the endpoint contract every backend implements
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend on
//! any other workspace crates, making it the foundation layer.

mod account;
mod address;
mod crypto;
mod hash;
mod ledger;
mod rlp;
mod transaction;
mod wei;

pub use account::Account;
pub use address::Address;
pub use crypto::{KeyError, KeyProvider, Secp256k1KeyProvider, SigningKey};
pub use hash::{Hash, HexError};
pub use ledger::{LedgerClient, LedgerError};
pub use rlp::RlpStream;
pub use transaction::{
    Fee, LegacyTransferSigner, SignError, SignedTransfer, TransferSigner,
    DEFAULT_TRANSFER_GAS_LIMIT, TRANSFER_GAS,
};
pub use wei::Wei;
