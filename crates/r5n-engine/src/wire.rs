//! Byte-exact wire codec for the four P2P message variants.
//!
//! All multi-byte integers are big-endian. Every message starts with
//! a four-byte header (`msg_size:u16 || msg_type:u16`); decode
//! rejects any buffer whose length disagrees with the header, and
//! encode refuses messages that would not fit the u16 size field.

use shared_crypto::{hash, purpose, EddsaKeyPair, EddsaPublicKey, EddsaSignature, HashCode};
use shared_types::{routeflags, BlockType, PeerId, Timestamp};

use r5n_blocks::{decode_addresses, encode_addresses, PeerFilter};

use crate::errors::EngineError;
use crate::path::PathElement;

/// Largest encodable message (the size header is 16 bits).
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Message type tags.
pub const MSG_DHT_P2P_PUT: u16 = 146;
pub const MSG_DHT_P2P_GET: u16 = 147;
pub const MSG_DHT_P2P_RESULT: u16 = 148;
pub const MSG_DHT_P2P_HELLO: u16 = 157;

const HEADER_SIZE: usize = 4;

/// A typed P2P message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Get(GetMsg),
    Put(PutMsg),
    Result(ResultMsg),
    Hello(HelloMsg),
}

impl Message {
    pub fn msg_type(&self) -> u16 {
        match self {
            Message::Get(_) => MSG_DHT_P2P_GET,
            Message::Put(_) => MSG_DHT_P2P_PUT,
            Message::Result(_) => MSG_DHT_P2P_RESULT,
            Message::Hello(_) => MSG_DHT_P2P_HELLO,
        }
    }

    /// Encode with header. Fails with `Invalid` when the message
    /// exceeds the u16 size field.
    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        let body = match self {
            Message::Get(m) => m.encode_body(),
            Message::Put(m) => m.encode_body(),
            Message::Result(m) => m.encode_body(),
            Message::Hello(m) => m.encode_body(),
        };
        let total = HEADER_SIZE + body.len();
        if total > MAX_MESSAGE_SIZE {
            return Err(EngineError::Invalid("message exceeds 64 KiB size field"));
        }
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&(total as u16).to_be_bytes());
        out.extend_from_slice(&self.msg_type().to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode from a full frame, validating the size header.
    pub fn decode(data: &[u8]) -> Result<Message, EngineError> {
        if data.len() < HEADER_SIZE {
            return Err(EngineError::ProtocolViolation("frame shorter than header"));
        }
        let size = u16::from_be_bytes([data[0], data[1]]) as usize;
        let msg_type = u16::from_be_bytes([data[2], data[3]]);
        if size != data.len() {
            return Err(EngineError::ProtocolViolation("size header mismatch"));
        }
        let body = &data[HEADER_SIZE..];
        match msg_type {
            MSG_DHT_P2P_GET => Ok(Message::Get(GetMsg::decode_body(body)?)),
            MSG_DHT_P2P_PUT => Ok(Message::Put(PutMsg::decode_body(body)?)),
            MSG_DHT_P2P_RESULT => Ok(Message::Result(ResultMsg::decode_body(body)?)),
            MSG_DHT_P2P_HELLO => Ok(Message::Hello(HelloMsg::decode_body(body)?)),
            _ => Err(EngineError::ProtocolViolation("unknown message type")),
        }
    }
}

/// A GET request traveling the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMsg {
    pub block_type: BlockType,
    pub flags: u32,
    pub hop_count: u32,
    pub repl_level: u32,
    pub peer_filter: PeerFilter,
    pub query_key: HashCode,
    pub xquery: Vec<u8>,
    /// Raw result filter; interpretation belongs to the block
    /// handler.
    pub result_filter: Vec<u8>,
}

impl GetMsg {
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.block_type.as_u32().to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.hop_count.to_be_bytes());
        out.extend_from_slice(&self.repl_level.to_be_bytes());
        out.extend_from_slice(&(self.result_filter.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.peer_filter.to_wire());
        out.extend_from_slice(self.query_key.as_bytes());
        out.extend_from_slice(&self.xquery);
        out.extend_from_slice(&self.result_filter);
        out
    }

    fn decode_body(data: &[u8]) -> Result<Self, EngineError> {
        let mut r = Reader::new(data);
        let block_type = BlockType(r.u32()?);
        let flags = r.u32()?;
        let hop_count = r.u32()?;
        let repl_level = r.u32()?;
        let result_filter_len = r.u32()? as usize;
        let peer_filter = PeerFilter::from_wire(&r.array::<128>()?);
        let query_key = HashCode::new(r.array::<64>()?);

        let rest = r.rest();
        if rest.len() < result_filter_len {
            return Err(EngineError::ProtocolViolation("result filter overruns frame"));
        }
        let xquery = rest[..rest.len() - result_filter_len].to_vec();
        let result_filter = rest[rest.len() - result_filter_len..].to_vec();

        Ok(Self {
            block_type,
            flags,
            hop_count,
            repl_level,
            peer_filter,
            query_key,
            xquery,
            result_filter,
        })
    }
}

/// A PUT carrying a block toward its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutMsg {
    pub block_type: BlockType,
    pub flags: u32,
    pub hop_count: u32,
    pub repl_level: u32,
    pub peer_filter: PeerFilter,
    pub expire: Timestamp,
    pub key: HashCode,
    pub truncated_origin: Option<PeerId>,
    pub put_path: Vec<PathElement>,
    pub block_data: Vec<u8>,
}

impl PutMsg {
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.block_type.as_u32().to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.hop_count.to_be_bytes());
        out.extend_from_slice(&self.repl_level.to_be_bytes());
        out.extend_from_slice(&(self.put_path.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.peer_filter.to_wire());
        out.extend_from_slice(&self.expire.as_secs().to_be_bytes());
        out.extend_from_slice(self.key.as_bytes());
        if let Some(origin) = &self.truncated_origin {
            out.extend_from_slice(origin.as_bytes());
        }
        for element in &self.put_path {
            element.encode_into(&mut out);
        }
        out.extend_from_slice(&self.block_data);
        out
    }

    fn decode_body(data: &[u8]) -> Result<Self, EngineError> {
        let mut r = Reader::new(data);
        let block_type = BlockType(r.u32()?);
        let flags = r.u32()?;
        let hop_count = r.u32()?;
        let repl_level = r.u32()?;
        let put_path_len = r.u16()? as usize;
        let peer_filter = PeerFilter::from_wire(&r.array::<128>()?);
        let expire = Timestamp::new(r.u64()?);
        let key = HashCode::new(r.array::<64>()?);

        let truncated_origin = if flags & routeflags::TRUNCATED != 0 {
            Some(PeerId::new(r.array::<32>()?))
        } else {
            None
        };

        let put_path = decode_path(&mut r, put_path_len)?;
        let block_data = r.rest().to_vec();

        Ok(Self {
            block_type,
            flags,
            hop_count,
            repl_level,
            peer_filter,
            expire,
            key,
            truncated_origin,
            put_path,
            block_data,
        })
    }
}

/// A RESULT traveling back toward the querier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMsg {
    pub block_type: BlockType,
    pub flags: u32,
    pub expire: Timestamp,
    pub query_key: HashCode,
    pub truncated_origin: Option<PeerId>,
    pub put_path: Vec<PathElement>,
    pub get_path: Vec<PathElement>,
    pub block_data: Vec<u8>,
}

impl ResultMsg {
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.block_type.as_u32().to_be_bytes());
        out.extend_from_slice(&(self.put_path.len() as u16).to_be_bytes());
        out.extend_from_slice(&(self.get_path.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.expire.as_secs().to_be_bytes());
        out.extend_from_slice(self.query_key.as_bytes());
        if let Some(origin) = &self.truncated_origin {
            out.extend_from_slice(origin.as_bytes());
        }
        for element in self.put_path.iter().chain(&self.get_path) {
            element.encode_into(&mut out);
        }
        out.extend_from_slice(&self.block_data);
        out
    }

    fn decode_body(data: &[u8]) -> Result<Self, EngineError> {
        let mut r = Reader::new(data);
        let block_type = BlockType(r.u32()?);
        let put_path_len = r.u16()? as usize;
        let get_path_len = r.u16()? as usize;
        let flags = r.u32()?;
        let expire = Timestamp::new(r.u64()?);
        let query_key = HashCode::new(r.array::<64>()?);

        let truncated_origin = if flags & routeflags::TRUNCATED != 0 {
            Some(PeerId::new(r.array::<32>()?))
        } else {
            None
        };

        let put_path = decode_path(&mut r, put_path_len)?;
        let get_path = decode_path(&mut r, get_path_len)?;
        let block_data = r.rest().to_vec();

        Ok(Self {
            block_type,
            flags,
            expire,
            query_key,
            truncated_origin,
            put_path,
            get_path,
            block_data,
        })
    }
}

/// A standalone HELLO: the sender advertises its own addresses.
///
/// The sender's identity comes from the transport layer; the
/// signature binds the expiration and the address list to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMsg {
    pub signature: EddsaSignature,
    pub expire: Timestamp,
    pub addresses: Vec<String>,
}

impl HelloMsg {
    /// Create and sign a HELLO for the keypair's identity.
    pub fn sign(keypair: &EddsaKeyPair, expire: Timestamp, addresses: Vec<String>) -> Self {
        let section = encode_addresses(&addresses);
        let signature = keypair.sign(purpose::HELLO, &hello_payload(expire, &section));
        Self {
            signature,
            expire,
            addresses,
        }
    }

    /// Verify the signature against the transport-level sender.
    pub fn verify(&self, sender: &PeerId) -> Result<(), EngineError> {
        let key = EddsaPublicKey::from_bytes(*sender.as_bytes())
            .map_err(|_| EngineError::ProtocolViolation("sender key invalid"))?;
        let section = encode_addresses(&self.addresses);
        key.verify(
            purpose::HELLO,
            &hello_payload(self.expire, &section),
            &self.signature,
        )
        .map_err(|_| EngineError::ProtocolViolation("HELLO signature invalid"))
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_be_bytes()); // reserved
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.expire.as_secs().to_be_bytes());
        out.extend_from_slice(&encode_addresses(&self.addresses));
        out
    }

    fn decode_body(data: &[u8]) -> Result<Self, EngineError> {
        let mut r = Reader::new(data);
        let _reserved = r.u32()?;
        let signature = EddsaSignature::from_bytes(r.array::<64>()?);
        let expire = Timestamp::new(r.u64()?);
        let addresses = decode_addresses(r.rest())
            .map_err(|_| EngineError::ProtocolViolation("HELLO address list malformed"))?;
        Ok(Self {
            signature,
            expire,
            addresses,
        })
    }
}

fn hello_payload(expire: Timestamp, address_section: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + 64);
    payload.extend_from_slice(&expire.as_secs().to_be_bytes());
    payload.extend_from_slice(hash(address_section).as_bytes());
    payload
}

fn decode_path(r: &mut Reader<'_>, count: usize) -> Result<Vec<PathElement>, EngineError> {
    let mut elements = Vec::with_capacity(count.min(256));
    for _ in 0..count {
        let bytes = r.take(PathElement::WIRE_SIZE)?;
        elements.push(PathElement::decode(bytes)?);
    }
    Ok(elements)
}

/// Cursor over a big-endian frame body.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], EngineError> {
        if self.data.len() - self.pos < n {
            return Err(EngineError::ProtocolViolation("message truncated"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], EngineError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, EngineError> {
        Ok(u16::from_be_bytes(self.array::<2>()?))
    }

    fn u32(&mut self) -> Result<u32, EngineError> {
        Ok(u32::from_be_bytes(self.array::<4>()?))
    }

    fn u64(&mut self) -> Result<u64, EngineError> {
        Ok(u64::from_be_bytes(self.array::<8>()?))
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair(seed: u8) -> EddsaKeyPair {
        EddsaKeyPair::from_seed([seed; 32])
    }

    fn sample_get() -> GetMsg {
        let mut peer_filter = PeerFilter::new();
        peer_filter.insert(&PeerId::new([5; 32]));
        GetMsg {
            block_type: BlockType::TEST,
            flags: routeflags::DEMULTIPLEX,
            hop_count: 3,
            repl_level: 4,
            peer_filter,
            query_key: hash(b"somewhere"),
            xquery: b"xq".to_vec(),
            result_filter: vec![0xAA; 16],
        }
    }

    fn sample_path() -> Vec<PathElement> {
        vec![
            PathElement::sign(&keypair(1), PeerId::new([2; 32]), PeerId::new([3; 32])),
            PathElement::sign(&keypair(4), PeerId::new([5; 32]), PeerId::new([6; 32])),
        ]
    }

    fn sample_put() -> PutMsg {
        PutMsg {
            block_type: BlockType::TEST,
            flags: routeflags::RECORD_ROUTE | routeflags::TRUNCATED,
            hop_count: 1,
            repl_level: 2,
            peer_filter: PeerFilter::new(),
            expire: Timestamp::new(99_999),
            key: hash(b"key"),
            truncated_origin: Some(PeerId::new([0xBB; 32])),
            put_path: sample_path(),
            block_data: b"the block".to_vec(),
        }
    }

    fn sample_result() -> ResultMsg {
        ResultMsg {
            block_type: BlockType::TEST,
            flags: 0,
            expire: Timestamp::new(12_345),
            query_key: hash(b"query"),
            truncated_origin: None,
            put_path: sample_path(),
            get_path: vec![PathElement::sign(
                &keypair(7),
                PeerId::new([8; 32]),
                PeerId::new([9; 32]),
            )],
            block_data: b"reply".to_vec(),
        }
    }

    #[test]
    fn test_get_roundtrip() {
        let msg = Message::Get(sample_get());
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_put_roundtrip() {
        let msg = Message::Put(sample_put());
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_result_roundtrip() {
        let msg = Message::Result(sample_result());
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_hello_roundtrip_and_signature() {
        let keypair = keypair(11);
        let sender = PeerId::new(*keypair.public_key().as_bytes());
        let hello = HelloMsg::sign(
            &keypair,
            Timestamp::new(5_000),
            vec!["udp://192.0.2.1:2086".to_string()],
        );

        let msg = Message::Hello(hello.clone());
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);

        let Message::Hello(decoded_hello) = decoded else {
            panic!("wrong variant");
        };
        assert!(decoded_hello.verify(&sender).is_ok());
        assert!(decoded_hello.verify(&PeerId::new([1; 32])).is_err());
    }

    #[test]
    fn test_size_header_mismatch_rejected() {
        let mut bytes = Message::Get(sample_get()).encode().unwrap();
        bytes.push(0);
        assert_eq!(
            Message::decode(&bytes),
            Err(EngineError::ProtocolViolation("size header mismatch"))
        );
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let bytes = Message::Put(sample_put()).encode().unwrap();
        // Cuts landing inside the header, the fixed fields and the
        // path section. (Cutting the trailing block data alone is
        // legal: the block is the open-ended rest of the frame.)
        for cut in [3, 50, 200, 300] {
            let mut short = bytes[..cut].to_vec();
            // Fix up the size header so only the body truncation trips.
            if short.len() >= 2 {
                let len = short.len() as u16;
                short[0..2].copy_from_slice(&len.to_be_bytes());
            }
            assert!(Message::decode(&short).is_err(), "cut at {cut} must fail");
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut bytes = Message::Get(sample_get()).encode().unwrap();
        bytes[2..4].copy_from_slice(&9999u16.to_be_bytes());
        assert_eq!(
            Message::decode(&bytes),
            Err(EngineError::ProtocolViolation("unknown message type"))
        );
    }

    #[test]
    fn test_oversized_message_refused_at_encode() {
        let mut put = sample_put();
        put.block_data = vec![0u8; MAX_MESSAGE_SIZE];
        assert_eq!(
            Message::Put(put).encode(),
            Err(EngineError::Invalid("message exceeds 64 KiB size field"))
        );
    }

    #[test]
    fn test_get_without_filters_roundtrips() {
        let mut get = sample_get();
        get.xquery.clear();
        get.result_filter.clear();

        let msg = Message::Get(get);
        assert_eq!(Message::decode(&msg.encode().unwrap()).unwrap(), msg);
    }
}
