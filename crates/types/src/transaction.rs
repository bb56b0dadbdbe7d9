//! Legacy (EIP-155) value transfers: building, signing and hashing.

use crate::address::Address;
use crate::crypto::SigningKey;
use crate::hash::Hash;
use crate::rlp::{trim_leading_zeros, RlpStream};
use crate::wei::Wei;
use secp256k1::{Message, SECP256K1};

/// Minimum gas for a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;

/// Gas limit used by default for transfers.
///
/// Above the 21000 minimum so endpoints with slightly different intrinsic
/// gas accounting still accept the transfer.
pub const DEFAULT_TRANSFER_GAS_LIMIT: u64 = 55_723;

/// Fee parameters attached to every transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fee {
    /// Gas price in wei.
    pub gas_price: Wei,
    /// Gas limit in units.
    pub gas_limit: u64,
}

impl Fee {
    pub fn new(gas_price: Wei, gas_limit: u64) -> Self {
        Self {
            gas_price,
            gas_limit,
        }
    }
}

impl Default for Fee {
    fn default() -> Self {
        Self::new(Wei::ZERO, DEFAULT_TRANSFER_GAS_LIMIT)
    }
}

/// A signed transfer, ready for submission.
///
/// Carries the decoded fields alongside the raw encoding so that
/// non-RPC ledgers (and logs) do not have to parse RLP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransfer {
    /// Keccak-256 of the signed encoding.
    pub hash: Hash,
    /// Sender derived from the signing key.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Sender sequence number.
    pub nonce: u64,
    /// Amount transferred.
    pub value: Wei,
    /// Fee parameters.
    pub fee: Fee,
    /// Signed RLP encoding.
    pub raw: Vec<u8>,
}

impl SignedTransfer {
    /// `0x`-prefixed hex of the raw encoding, as `eth_sendRawTransaction` expects.
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

/// Errors from building or signing a transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    #[error("Gas limit {gas_limit} is below the transfer minimum of 21000")]
    GasLimitTooLow { gas_limit: u64 },

    #[error("Chain id {0} is too large for EIP-155 replay protection")]
    ChainIdOverflow(u64),
}

/// Builds and signs transfers.
pub trait TransferSigner: Send + Sync {
    /// Build a transfer of `amount` to `to` at sequence `nonce` and sign it with `key`.
    fn build_and_sign(
        &self,
        nonce: u64,
        to: Address,
        amount: Wei,
        fee: Fee,
        key: &SigningKey,
    ) -> Result<SignedTransfer, SignError>;
}

/// Legacy transaction signer with EIP-155 replay protection.
#[derive(Debug, Clone, Copy)]
pub struct LegacyTransferSigner {
    chain_id: u64,
}

impl LegacyTransferSigner {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    fn append_body(stream: &mut RlpStream, nonce: u64, to: Address, amount: Wei, fee: Fee) {
        stream
            .append_u64(nonce)
            .append_u128(fee.gas_price.0)
            .append_u64(fee.gas_limit)
            .append_bytes(to.as_bytes())
            .append_u128(amount.0)
            .append_bytes(&[]);
    }

    /// The EIP-155 signing payload: body followed by `[chainId, 0, 0]`.
    pub fn signing_payload(&self, nonce: u64, to: Address, amount: Wei, fee: Fee) -> Vec<u8> {
        let mut stream = RlpStream::new();
        Self::append_body(&mut stream, nonce, to, amount, fee);
        stream.append_u64(self.chain_id).append_u64(0).append_u64(0);
        stream.finish()
    }
}

impl TransferSigner for LegacyTransferSigner {
    fn build_and_sign(
        &self,
        nonce: u64,
        to: Address,
        amount: Wei,
        fee: Fee,
        key: &SigningKey,
    ) -> Result<SignedTransfer, SignError> {
        if fee.gas_limit < TRANSFER_GAS {
            return Err(SignError::GasLimitTooLow {
                gas_limit: fee.gas_limit,
            });
        }
        let v_base = self
            .chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35))
            .ok_or(SignError::ChainIdOverflow(self.chain_id))?;

        let digest = Hash::from_bytes(&self.signing_payload(nonce, to, amount, fee));
        let message = Message::from_digest(*digest.as_bytes());
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, key.inner());
        let (recovery_id, compact) = signature.serialize_compact();

        let mut stream = RlpStream::new();
        Self::append_body(&mut stream, nonce, to, amount, fee);
        stream
            .append_u64(v_base + recovery_id.to_i32() as u64)
            .append_bytes(trim_leading_zeros(&compact[..32]))
            .append_bytes(trim_leading_zeros(&compact[32..]));
        let raw = stream.finish();

        Ok(SignedTransfer {
            hash: Hash::from_bytes(&raw),
            from: key.address(),
            to,
            nonce,
            value: amount,
            fee,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eip155_example() -> (LegacyTransferSigner, SigningKey, Address, Fee) {
        let key = SigningKey::from_bytes(&[0x46; 32]).unwrap();
        let to = Address::from_bytes([0x35; 20]);
        let fee = Fee::new(Wei(20_000_000_000), TRANSFER_GAS);
        (LegacyTransferSigner::new(1), key, to, fee)
    }

    #[test]
    fn test_eip155_signing_payload() {
        let (signer, _, to, fee) = eip155_example();
        let payload = signer.signing_payload(9, to, Wei::from_ether(1), fee);
        assert_eq!(
            hex::encode(&payload),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            Hash::from_bytes(&payload).to_hex(),
            "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_eip155_signed_transaction() {
        let (signer, key, to, fee) = eip155_example();
        let signed = signer
            .build_and_sign(9, to, Wei::from_ether(1), fee, &key)
            .unwrap();
        assert_eq!(
            hex::encode(&signed.raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
        assert_eq!(signed.from, key.address());
        assert_eq!(signed.nonce, 9);
        assert_eq!(signed.hash, Hash::from_bytes(&signed.raw));
    }

    #[test]
    fn test_gas_limit_too_low() {
        let (signer, key, to, _) = eip155_example();
        let err = signer
            .build_and_sign(0, to, Wei(1), Fee::new(Wei(1), 20_999), &key)
            .unwrap_err();
        assert_eq!(err, SignError::GasLimitTooLow { gas_limit: 20_999 });
    }

    #[test]
    fn test_chain_id_overflow() {
        let (_, key, to, fee) = eip155_example();
        let signer = LegacyTransferSigner::new(u64::MAX);
        assert_eq!(
            signer.build_and_sign(0, to, Wei(1), fee, &key),
            Err(SignError::ChainIdOverflow(u64::MAX))
        );
    }
}
