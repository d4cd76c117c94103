//! Signed route recording.
//!
//! When an originator sets RECORD_ROUTE, every forwarding hop
//! appends a signed element covering the triple
//! `(predecessor || self || successor)`. The element itself carries
//! only predecessor and successor; the signer of element `i` is
//! recovered from the chain: it is the predecessor named by element
//! `i + 1`, and for the final element the transport-level sender of
//! the message.
//!
//! Verification never aborts a message: a bad signature truncates
//! the path to the verified prefix, zeroes the signature of the
//! first failing hop, and discards everything after it.

use shared_crypto::{purpose, EddsaKeyPair, EddsaPublicKey, EddsaSignature};
use shared_types::PeerId;
use tracing::debug;

use crate::errors::EngineError;

/// One signed hop of a recorded route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathElement {
    pub predecessor: PeerId,
    pub successor: PeerId,
    pub signature: EddsaSignature,
}

impl PathElement {
    /// Encoded size: two identities plus a signature.
    pub const WIRE_SIZE: usize = 32 + 32 + 64;

    /// Sign an element as `signer`, covering predecessor and
    /// successor.
    pub fn sign(keypair: &EddsaKeyPair, predecessor: PeerId, successor: PeerId) -> Self {
        let signer = PeerId::new(*keypair.public_key().as_bytes());
        let signature = keypair.sign(purpose::DHT_HOP, &hop_payload(&predecessor, &signer, &successor));
        Self {
            predecessor,
            successor,
            signature,
        }
    }

    /// Verify the element against the signer recovered from the
    /// chain.
    pub fn verify(&self, signer: &PeerId) -> bool {
        if self.signature.is_zero() {
            return false;
        }
        let Ok(key) = EddsaPublicKey::from_bytes(*signer.as_bytes()) else {
            return false;
        };
        key.verify(
            purpose::DHT_HOP,
            &hop_payload(&self.predecessor, signer, &self.successor),
            &self.signature,
        )
        .is_ok()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.predecessor.as_bytes());
        out.extend_from_slice(self.successor.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
    }

    pub fn decode(data: &[u8]) -> Result<Self, EngineError> {
        if data.len() < Self::WIRE_SIZE {
            return Err(EngineError::ProtocolViolation("path element truncated"));
        }
        let mut predecessor = [0u8; 32];
        predecessor.copy_from_slice(&data[0..32]);
        let mut successor = [0u8; 32];
        successor.copy_from_slice(&data[32..64]);
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&data[64..128]);
        Ok(Self {
            predecessor: PeerId::new(predecessor),
            successor: PeerId::new(successor),
            signature: EddsaSignature::from_bytes(signature),
        })
    }
}

fn hop_payload(predecessor: &PeerId, signer: &PeerId, successor: &PeerId) -> Vec<u8> {
    let mut payload = Vec::with_capacity(96);
    payload.extend_from_slice(predecessor.as_bytes());
    payload.extend_from_slice(signer.as_bytes());
    payload.extend_from_slice(successor.as_bytes());
    payload
}

/// A recorded route: the signed elements, the boundary between
/// put-path and get-path, and the transport-level sender the chain
/// ends at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub elements: Vec<PathElement>,
    /// Elements before this index belong to the put-path.
    pub split_pos: usize,
    /// The peer the message carrying this path arrived from; signer
    /// of the final element.
    pub last_hop: PeerId,
    /// Origin marker carried when the path lost its head upstream.
    pub truncated_origin: Option<PeerId>,
}

impl Path {
    pub fn new(
        elements: Vec<PathElement>,
        split_pos: usize,
        last_hop: PeerId,
        truncated_origin: Option<PeerId>,
    ) -> Self {
        let split_pos = split_pos.min(elements.len());
        Self {
            elements,
            split_pos,
            last_hop,
            truncated_origin,
        }
    }

    /// An empty path arriving from `last_hop`.
    pub fn empty(last_hop: PeerId) -> Self {
        Self::new(Vec::new(), 0, last_hop, None)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The put-path portion.
    pub fn put_path(&self) -> &[PathElement] {
        &self.elements[..self.split_pos]
    }

    /// The get-path portion.
    pub fn get_path(&self) -> &[PathElement] {
        &self.elements[self.split_pos..]
    }

    /// The signer of element `index`, recovered from the chain.
    pub fn signer_of(&self, index: usize) -> PeerId {
        if index + 1 < self.elements.len() {
            self.elements[index + 1].predecessor
        } else {
            self.last_hop
        }
    }

    /// Append the local hop's element before forwarding to
    /// `successor`, and advance `last_hop` to the local identity.
    pub fn extend(&mut self, keypair: &EddsaKeyPair, successor: PeerId, to_get_path: bool) {
        let element = PathElement::sign(keypair, self.last_hop, successor);
        self.elements.push(element);
        if !to_get_path {
            self.split_pos = self.elements.len();
        }
        self.last_hop = PeerId::new(*keypair.public_key().as_bytes());
    }

    /// Verify the chain at the receiving node `local`.
    ///
    /// Returns `(verified_prefix_len, truncated)`. On the first
    /// failing element the path is cut down to the verified prefix:
    /// the failing element stays with a zeroed signature as the
    /// truncation marker, and later elements are discarded.
    pub fn verify(&mut self, local: &PeerId) -> (usize, bool) {
        for index in 0..self.elements.len() {
            let signer = self.signer_of(index);
            let element = &self.elements[index];

            let last = index + 1 == self.elements.len();
            let chain_ok = if last {
                // The final hop must have addressed us.
                &element.successor == local
            } else {
                element.successor == self.signer_of(index + 1)
            };

            if !chain_ok || !element.verify(&signer) {
                debug!(index, "path verification failed, truncating");
                self.elements.truncate(index + 1);
                self.elements[index].signature = EddsaSignature::zero();
                self.split_pos = self.split_pos.min(self.elements.len());
                return (index, true);
            }
        }
        (self.elements.len(), false)
    }
}
