use bytes::{Buf, BufMut, Bytes, BytesMut};
use fabric_core::{
    data::{Data, Value},
    logger::Logger,
    member::{Member, MemberSet},
    message::{Message, MessageError, LOGGER_DATA_KEY},
    node::Node,
    token::Token,
};

/// Leading byte every frame starts with; lets a peer reject garbage before
/// trusting the rest of the header.
const MAGIC: u8 = 0x4e;
const VERSION: u8 = 1;

const TAG_STRING: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_MAP: u8 = 3;
const TAG_LIST: u8 = 4;
const TAG_BOXED: u8 = 5;

#[derive(Debug)]
pub enum Error {
    TooShort,
    BadMagic,
    UnsupportedVersion(u8),
    UnknownValueTag(u8),
    Utf8(std::str::Utf8Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::TooShort => write!(f, "frame is shorter than its declared length"),
            Error::BadMagic => write!(f, "frame does not start with the fabric magic byte"),
            Error::UnsupportedVersion(v) => write!(f, "frame version {v} is not supported"),
            Error::UnknownValueTag(t) => write!(f, "unknown value tag {t}"),
            Error::Utf8(e) => write!(f, "invalid utf-8 in frame: {e}"),
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(value: std::str::Utf8Error) -> Self {
        Self::Utf8(value)
    }
}

/// Encode `message` as a length-prefixed frame: `u32` big-endian length,
/// then `MAGIC`, `VERSION`, and the fields in declaration order. The length
/// prefix lets both the stream and datagram transports frame the same
/// encoding (the stream reader consumes exactly `length` bytes; the
/// datagram transport already receives one frame per packet and can ignore
/// it, but keeps it for symmetry and for payloads split across multiple
/// packets by a future transport).
pub fn encode(message: &Message) -> Bytes {
    let mut body = BytesMut::new();
    body.put_u8(MAGIC);
    body.put_u8(VERSION);
    put_string(&mut body, &message.service);
    put_string(&mut body, &message.path);
    put_member_set(&mut body, &message.destination);
    body.put_u32(message.destination_rdv);
    put_member_set(&mut body, &message.source);
    body.put_u32(message.source_rdv);

    // The logger (§4.9) isn't a field of its own on the wire: it rides
    // along flattened into `data` under a reserved key.
    match &message.logger {
        Some(logger) => {
            let mut data = message.data.clone();
            data.insert(LOGGER_DATA_KEY.to_string(), logger.to_value());
            put_data(&mut body, &data);
        }
        None => put_data(&mut body, &message.data),
    }

    put_string(&mut body, &message.error.message);
    body.put_u16(message.error.code);

    let mut framed = BytesMut::with_capacity(body.len() + 4);
    framed.put_u32(body.len() as u32);
    framed.extend_from_slice(&body);
    framed.freeze()
}

/// Decode a frame produced by [`encode`]. `bytes` must contain exactly one
/// frame, length prefix included.
pub fn decode(bytes: &[u8]) -> Result<Message, Error> {
    let mut buf = bytes;
    let declared_len = read_u32(&mut buf)? as usize;
    if buf.len() < declared_len {
        return Err(Error::TooShort);
    }

    let magic = read_u8(&mut buf)?;
    if magic != MAGIC {
        return Err(Error::BadMagic);
    }

    let version = read_u8(&mut buf)?;
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    let service = read_string(&mut buf)?;
    let path = read_string(&mut buf)?;
    let destination = read_member_set(&mut buf)?;
    let destination_rdv = read_u32(&mut buf)?;
    let source = read_member_set(&mut buf)?;
    let source_rdv = read_u32(&mut buf)?;
    let mut data = read_data(&mut buf)?;
    let logger = data.remove(LOGGER_DATA_KEY).map(Logger::from_value);
    let error_message = read_string(&mut buf)?;
    let error_code = read_u16(&mut buf)?;

    let mut message = Message::new(service, path);
    message.destination = destination;
    message.destination_rdv = destination_rdv;
    message.source = source;
    message.source_rdv = source_rdv;
    message.data = data;
    message.error = MessageError::new(error_message, error_code);
    message.logger = logger;
    Ok(message)
}

/// Peek the declared frame length from a buffer that may not yet hold the
/// whole frame, so a stream reader knows how many more bytes to await.
pub fn peek_frame_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize + 4)
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.extend_from_slice(value.as_bytes());
}

fn read_string(buf: &mut &[u8]) -> Result<String, Error> {
    let len = read_u32(buf)? as usize;
    if buf.len() < len {
        return Err(Error::TooShort);
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(std::str::from_utf8(head)?.to_string())
}

fn put_member_set(buf: &mut BytesMut, members: &MemberSet) {
    let entries = members.to_vec();
    buf.put_u32(entries.len() as u32);
    for member in entries {
        buf.put_u32(member.token.0);
        put_string(buf, &member.node.address);
        buf.put_u16(member.node.stream_port);
        buf.put_u16(member.node.datagram_port);
    }
}

fn read_member_set(buf: &mut &[u8]) -> Result<MemberSet, Error> {
    let count = read_u32(buf)? as usize;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let token = Token(read_u32(buf)?);
        let address = read_string(buf)?;
        let stream_port = read_u16(buf)?;
        let datagram_port = read_u16(buf)?;
        members.push(Member::new(token, Node::new(address, stream_port, datagram_port)));
    }
    Ok(MemberSet::from_members(members))
}

fn put_data(buf: &mut BytesMut, data: &Data) {
    buf.put_u32(data.len() as u32);
    for (key, value) in data {
        put_string(buf, key);
        put_value(buf, value);
    }
}

fn read_data(buf: &mut &[u8]) -> Result<Data, Error> {
    let count = read_u32(buf)? as usize;
    let mut data = Data::default();
    for _ in 0..count {
        let key = read_string(buf)?;
        let value = read_value(buf)?;
        data.insert(key, value);
    }
    Ok(data)
}

fn put_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::String(s) => {
            buf.put_u8(TAG_STRING);
            put_string(buf, s);
        }
        Value::Int(i) => {
            buf.put_u8(TAG_INT);
            buf.put_i64(*i);
        }
        Value::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(*b as u8);
        }
        Value::Map(map) => {
            buf.put_u8(TAG_MAP);
            put_data(buf, map);
        }
        Value::List(list) => {
            buf.put_u8(TAG_LIST);
            buf.put_u32(list.len() as u32);
            for item in list {
                put_value(buf, item);
            }
        }
        Value::Boxed { name, bytes } => {
            buf.put_u8(TAG_BOXED);
            put_string(buf, name);
            buf.put_u32(bytes.len() as u32);
            buf.extend_from_slice(bytes);
        }
    }
}

fn read_value(buf: &mut &[u8]) -> Result<Value, Error> {
    let tag = read_u8(buf)?;
    Ok(match tag {
        TAG_STRING => Value::String(read_string(buf)?),
        TAG_INT => Value::Int(read_i64(buf)?),
        TAG_BOOL => Value::Bool(read_u8(buf)? != 0),
        TAG_MAP => Value::Map(read_data(buf)?),
        TAG_LIST => {
            let count = read_u32(buf)? as usize;
            let mut list = Vec::with_capacity(count);
            for _ in 0..count {
                list.push(read_value(buf)?);
            }
            Value::List(list)
        }
        TAG_BOXED => {
            let name = read_string(buf)?;
            let len = read_u32(buf)? as usize;
            if buf.len() < len {
                return Err(Error::TooShort);
            }
            let (head, rest) = buf.split_at(len);
            *buf = rest;
            Value::Boxed { name, bytes: head.to_vec() }
        }
        other => return Err(Error::UnknownValueTag(other)),
    })
}

fn read_u8(buf: &mut &[u8]) -> Result<u8, Error> {
    if buf.is_empty() {
        return Err(Error::TooShort);
    }
    Ok(buf.get_u8())
}

fn read_u16(buf: &mut &[u8]) -> Result<u16, Error> {
    if buf.len() < 2 {
        return Err(Error::TooShort);
    }
    Ok(buf.get_u16())
}

fn read_u32(buf: &mut &[u8]) -> Result<u32, Error> {
    if buf.len() < 4 {
        return Err(Error::TooShort);
    }
    Ok(buf.get_u32())
}

fn read_i64(buf: &mut &[u8]) -> Result<i64, Error> {
    if buf.len() < 8 {
        return Err(Error::TooShort);
    }
    Ok(buf.get_i64())
}
