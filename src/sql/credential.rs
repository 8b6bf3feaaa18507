//! The access token struct consumed by SQL Server drivers under
//! `SQL_COPT_SS_ACCESS_TOKEN`: a little-endian `u32` byte count followed by
//! the token as UTF-16LE.

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const LENGTH_PREFIX: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("access token is empty")]
    Empty,

    #[error("access token of {0} bytes does not fit a u32 length prefix")]
    TooLong(usize),

    #[error("credential blob is {0} bytes, shorter than its length prefix")]
    Truncated(usize),

    #[error("length prefix says {declared} bytes, payload has {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("payload is not valid UTF-16LE")]
    InvalidUtf16,
}

pub struct EncodedCredential {
    payload: Vec<u8>,
}

impl EncodedCredential {
    pub fn encode(token: &str) -> Result<Self, EncodingError> {
        if token.is_empty() {
            return Err(EncodingError::Empty);
        }

        let payload: Vec<u8> = token.encode_utf16().flat_map(u16::to_le_bytes).collect();
        if u32::try_from(payload.len()).is_err() {
            return Err(EncodingError::TooLong(payload.len()));
        }
        Ok(Self { payload })
    }

    /// Parse a serialized blob, as found in a connection's attributes.
    pub fn from_bytes(blob: &[u8]) -> Result<Self, EncodingError> {
        if blob.len() < LENGTH_PREFIX {
            return Err(EncodingError::Truncated(blob.len()));
        }
        let (prefix, payload) = blob.split_at(LENGTH_PREFIX);
        let declared = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);

        if declared as usize != payload.len() {
            return Err(EncodingError::LengthMismatch {
                declared,
                actual: payload.len(),
            });
        }
        if payload.is_empty() {
            return Err(EncodingError::Empty);
        }
        Ok(Self {
            payload: payload.to_vec(),
        })
    }

    pub fn length(&self) -> u32 {
        // Bounded in both constructors.
        self.payload.len() as u32
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Length prefix followed by payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(LENGTH_PREFIX + self.payload.len());
        blob.extend_from_slice(&self.length().to_le_bytes());
        blob.extend_from_slice(&self.payload);
        blob
    }

    /// Recover the token string.
    pub fn decode(&self) -> Result<String, EncodingError> {
        if self.payload.len() % 2 != 0 {
            return Err(EncodingError::InvalidUtf16);
        }
        let units: Vec<u16> = self
            .payload
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|_| EncodingError::InvalidUtf16)
    }
}

impl Drop for EncodedCredential {
    fn drop(&mut self) {
        self.payload.zeroize();
    }
}

impl ZeroizeOnDrop for EncodedCredential {}

impl std::fmt::Debug for EncodedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedCredential")
            .field("length", &self.length())
            .finish_non_exhaustive()
    }
}
