//! Signed HELLO address advertisements.
//!
//! A HELLO block carries a peer identity, an expiration and a list
//! of transport address URIs (`scheme://host:port`). The signature
//! covers the expiration and a digest of the address list, under the
//! HELLO purpose tag, so only the identity's owner can advertise for
//! it.

use shared_crypto::{hash, purpose, EddsaKeyPair, EddsaPublicKey, EddsaSignature, HashCode};
use shared_types::{BlockType, PeerId, Timestamp};

use crate::block::Block;
use crate::errors::BlockError;

/// Fixed part of the payload: peer_id + expire + signature.
const HELLO_HEADER_SIZE: usize = 32 + 8 + 64 + 2;

/// A signed address advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloBlock {
    pub peer_id: PeerId,
    pub expire: Timestamp,
    pub signature: EddsaSignature,
    pub addresses: Vec<String>,
}

impl HelloBlock {
    /// Create and sign a HELLO for the keypair's identity.
    pub fn sign(keypair: &EddsaKeyPair, expire: Timestamp, addresses: Vec<String>) -> Self {
        let peer_id = PeerId::new(*keypair.public_key().as_bytes());
        let address_section = encode_addresses(&addresses);
        let signature = keypair.sign(purpose::HELLO, &signed_part(expire, &address_section));
        Self {
            peer_id,
            expire,
            signature,
            addresses,
        }
    }

    /// Verify the signature and address list; `now` gates expiry.
    pub fn verify(&self, now: Timestamp) -> Result<(), BlockError> {
        if self.expire.is_expired(now) {
            return Err(BlockError::Expired);
        }
        self.verify_signature()
    }

    /// Signature and address-list checks without the expiry gate.
    ///
    /// Store validation runs this form; expiry is enforced separately
    /// by the message engine before any handler sees the block.
    pub fn verify_signature(&self) -> Result<(), BlockError> {
        if self.addresses.is_empty() {
            return Err(BlockError::Malformed("empty address list"));
        }
        for address in &self.addresses {
            if address.is_empty() || !address.contains("://") {
                return Err(BlockError::Malformed("address is not a URI"));
            }
        }

        let key = EddsaPublicKey::from_bytes(*self.peer_id.as_bytes())
            .map_err(|_| BlockError::BadSignature)?;
        let address_section = encode_addresses(&self.addresses);
        key.verify(
            purpose::HELLO,
            &signed_part(self.expire, &address_section),
            &self.signature,
        )
        .map_err(|_| BlockError::BadSignature)
    }

    /// The query key this block is stored and found under: the
    /// peer's routing address.
    pub fn derive_key(&self) -> HashCode {
        hash(self.peer_id.as_bytes())
    }

    /// Encode as a block payload.
    pub fn encode(&self) -> Vec<u8> {
        let address_section = encode_addresses(&self.addresses);
        let mut out = Vec::with_capacity(HELLO_HEADER_SIZE + address_section.len());
        out.extend_from_slice(self.peer_id.as_bytes());
        out.extend_from_slice(&self.expire.as_secs().to_be_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&address_section);
        out
    }

    /// Decode a block payload.
    pub fn decode(data: &[u8]) -> Result<Self, BlockError> {
        if data.len() < HELLO_HEADER_SIZE {
            return Err(BlockError::Truncated {
                need: HELLO_HEADER_SIZE,
                have: data.len(),
            });
        }

        let mut peer_id = [0u8; 32];
        peer_id.copy_from_slice(&data[0..32]);
        let expire = u64::from_be_bytes(data[32..40].try_into().expect("sized slice"));
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&data[40..104]);

        let addresses = decode_addresses(&data[104..])?;

        Ok(Self {
            peer_id: PeerId::new(peer_id),
            expire: Timestamp::new(expire),
            signature: EddsaSignature::from_bytes(signature),
            addresses,
        })
    }

    /// Wrap as a typed block.
    pub fn to_block(&self) -> Block {
        Block::new(BlockType::DHT_URL_HELLO, self.expire, self.encode())
    }
}

fn signed_part(expire: Timestamp, address_section: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + 64);
    payload.extend_from_slice(&expire.as_secs().to_be_bytes());
    payload.extend_from_slice(hash(address_section).as_bytes());
    payload
}

/// Encode an address list in the HELLO wire format
/// (count-prefixed, each entry length-prefixed UTF-8).
///
/// The standalone P2P HELLO message shares this layout with the
/// HELLO block payload.
pub fn encode_addresses(addresses: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(addresses.len() as u16).to_be_bytes());
    for address in addresses {
        let bytes = address.as_bytes();
        out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(bytes);
    }
    out
}

/// Decode an address list in the HELLO wire format.
pub fn decode_addresses(data: &[u8]) -> Result<Vec<String>, BlockError> {
    if data.len() < 2 {
        return Err(BlockError::Truncated {
            need: 2,
            have: data.len(),
        });
    }
    let count = u16::from_be_bytes(data[0..2].try_into().expect("sized slice")) as usize;
    let mut offset = 2;
    let mut addresses = Vec::with_capacity(count);

    for _ in 0..count {
        if data.len() < offset + 2 {
            return Err(BlockError::Malformed("address length truncated"));
        }
        let len =
            u16::from_be_bytes(data[offset..offset + 2].try_into().expect("sized slice")) as usize;
        offset += 2;
        if data.len() < offset + len {
            return Err(BlockError::Malformed("address body truncated"));
        }
        let address = std::str::from_utf8(&data[offset..offset + len])
            .map_err(|_| BlockError::BadAddress)?;
        addresses.push(address.to_string());
        offset += len;
    }

    if offset != data.len() {
        return Err(BlockError::Malformed("trailing bytes after address list"));
    }
    Ok(addresses)
}
