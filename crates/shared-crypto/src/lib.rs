//! # Shared Crypto
//!
//! Cryptographic primitives shared by every subsystem of the R5N node.
//!
//! Two things live here:
//! - **SHA-512 hash codes**: the fixed routing hash. Peer addresses,
//!   query keys and bloom-filter mixing all run over 64-byte
//!   [`HashCode`] values.
//! - **Purpose-tagged Ed25519 signatures**: every signature in the
//!   protocol binds a u32 purpose tag and the payload length, so a
//!   signature produced for one context can never be replayed in
//!   another.

pub mod errors;
pub mod hashing;
pub mod signatures;

pub use errors::CryptoError;
pub use hashing::{hash, hash_many, HashCode, HASH_SIZE};
pub use signatures::{
    purpose, signed_payload, EddsaKeyPair, EddsaPublicKey, EddsaSignature, SIGNATURE_SIZE,
};
