//! P10 numnick encoding: the compact alphanumeric identifiers used as
//! on-wire prefixes (§6 "Numeric prefixes").

use thiserror::Error;

/// The P10 alphabet: `[A-Z][a-z][0-9][\[\]]`, 64 symbols, each worth 6 bits.
const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789[]";

fn digit_value(c: u8) -> Option<u32> {
    ALPHABET.iter().position(|&a| a == c).map(|p| p as u32)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NumnickError {
    #[error("numnick segment must be non-empty and at most 5 chars, got {0:?}")]
    BadLength(String),
    #[error("invalid P10 alphabet character {0:?} in numnick")]
    BadChar(char),
    #[error("value {0} does not fit in {1} base-64 digits")]
    Overflow(u64, usize),
}

/// Encode `value` as a fixed-width base-64 string using the P10 alphabet.
pub fn encode(value: u64, width: usize) -> Result<String, NumnickError> {
    let max = 64u64.pow(width as u32);
    if value >= max {
        return Err(NumnickError::Overflow(value, width));
    }
    let mut out = vec![0u8; width];
    let mut v = value;
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(v % 64) as usize];
        v /= 64;
    }
    Ok(String::from_utf8(out).expect("alphabet is ASCII"))
}

/// Decode a fixed-width base-64 string using the P10 alphabet.
pub fn decode(s: &str) -> Result<u64, NumnickError> {
    if s.is_empty() || s.len() > 5 {
        return Err(NumnickError::BadLength(s.to_string()));
    }
    let mut value = 0u64;
    for c in s.bytes() {
        let digit = digit_value(c).ok_or(NumnickError::BadChar(c as char))?;
        value = value * 64 + digit as u64;
    }
    Ok(value)
}

/// A full user numnick: 2-char server id ++ 3-char per-server user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserNumnick {
    pub server: [u8; 2],
    pub user: [u8; 3],
}

impl UserNumnick {
    pub fn new(server_id: &str, user_seq: u32) -> Result<Self, NumnickError> {
        if server_id.len() != 2 {
            return Err(NumnickError::BadLength(server_id.to_string()));
        }
        let encoded = encode(user_seq as u64, 3)?;
        let mut server = [0u8; 2];
        server.copy_from_slice(server_id.as_bytes());
        let mut user = [0u8; 3];
        user.copy_from_slice(encoded.as_bytes());
        Ok(Self { server, user })
    }

    pub fn server_id(&self) -> &str {
        std::str::from_utf8(&self.server).expect("ascii")
    }

    pub fn as_str(&self) -> String {
        format!(
            "{}{}",
            std::str::from_utf8(&self.server).expect("ascii"),
            std::str::from_utf8(&self.user).expect("ascii")
        )
    }

    pub fn parse(s: &str) -> Result<Self, NumnickError> {
        if s.len() != 5 {
            return Err(NumnickError::BadLength(s.to_string()));
        }
        let (server, user) = s.split_at(2);
        let mut server_arr = [0u8; 2];
        server_arr.copy_from_slice(server.as_bytes());
        let mut user_arr = [0u8; 3];
        user_arr.copy_from_slice(user.as_bytes());
        for &c in server_arr.iter().chain(user_arr.iter()) {
            digit_value(c).ok_or(NumnickError::BadChar(c as char))?;
        }
        Ok(Self {
            server: server_arr,
            user: user_arr,
        })
    }
}

impl std::fmt::Display for UserNumnick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
