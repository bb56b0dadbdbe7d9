//! Minimal RLP encoding for legacy transactions.
//!
//! Only the encoder side is needed: transfers are built and signed locally,
//! never decoded.

/// Strip leading zero bytes (RLP integers are minimal big-endian).
pub fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Incremental RLP list builder.
#[derive(Debug, Default)]
pub struct RlpStream {
    payload: Vec<u8>,
}

impl RlpStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte string item.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        if bytes.len() == 1 && bytes[0] < 0x80 {
            self.payload.push(bytes[0]);
        } else {
            encode_header(&mut self.payload, 0x80, bytes.len());
            self.payload.extend_from_slice(bytes);
        }
        self
    }

    /// Append an unsigned integer item.
    pub fn append_u64(&mut self, value: u64) -> &mut Self {
        let be = value.to_be_bytes();
        self.append_bytes(trim_leading_zeros(&be))
    }

    /// Append an unsigned 128-bit integer item.
    pub fn append_u128(&mut self, value: u128) -> &mut Self {
        let be = value.to_be_bytes();
        self.append_bytes(trim_leading_zeros(&be))
    }

    /// Finish the list, returning the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 9);
        encode_header(&mut out, 0xc0, self.payload.len());
        out.extend_from_slice(&self.payload);
        out
    }
}

fn encode_header(out: &mut Vec<u8>, offset: u8, len: usize) {
    if len <= 55 {
        out.push(offset + len as u8);
    } else {
        let len_bytes = (len as u64).to_be_bytes();
        let len_bytes = trim_leading_zeros(&len_bytes);
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
}
