//! Credential hashing and verification.

mod password;

pub use password::*;
