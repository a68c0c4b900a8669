//! Length-prefixed framing for keyed records.
//!
//! Frame layout (big endian):
//!
//! ```text
//! | wire id (u8) | key size (u16) | key | payload size (u32) | payload |
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::Error;

/// The ID of the keyed record codec on the wire.
const WIRE_ID: u8 = 0x05;

/// Wire ID + key size.
const PREFIX_LEN: usize = 3;

/// A payload tagged with its partitioning key (the entity ID).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: Bytes,
    payload: Bytes,
}

impl Record {
    #[inline]
    pub fn new(key: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self { key: key.into(), payload: payload.into() }
    }

    #[inline]
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    /// The key as a string, replacing invalid UTF-8.
    #[inline]
    pub fn key_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn into_parts(self) -> (Bytes, Bytes) {
        (self.key, self.payload)
    }

    /// Total size of the encoded frame.
    #[inline]
    pub fn size(&self) -> usize {
        PREFIX_LEN + self.key.len() + 4 + self.payload.len()
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Header,
    Payload(Bytes, u32),
}

#[derive(Debug, Default)]
pub struct Codec {
    /// The current state of the decoder.
    state: State,
}

impl Codec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for Codec {
    type Item = Record;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match std::mem::take(&mut self.state) {
                State::Header => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let wire_id = src[0];
                    if wire_id != WIRE_ID {
                        return Err(Error::WireId(wire_id));
                    }

                    if src.len() < PREFIX_LEN {
                        return Ok(None);
                    }

                    let key_size = u16::from_be_bytes([src[1], src[2]]) as usize;

                    // Wait for the key and the payload size
                    if src.len() < PREFIX_LEN + key_size + 4 {
                        return Ok(None);
                    }

                    src.advance(PREFIX_LEN);
                    let key = src.split_to(key_size).freeze();
                    let size = src.get_u32();

                    self.state = State::Payload(key, size);
                }
                State::Payload(key, size) => {
                    if src.len() < size as usize {
                        src.reserve(size as usize - src.len());
                        self.state = State::Payload(key, size);
                        return Ok(None);
                    }

                    let payload = src.split_to(size as usize).freeze();
                    return Ok(Some(Record { key, payload }));
                }
            }
        }
    }
}

impl Encoder<Record> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Record, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let key_size =
            u16::try_from(item.key.len()).map_err(|_| Error::KeyTooLarge(item.key.len()))?;
        let size = u32::try_from(item.payload.len())
            .map_err(|_| Error::Io(std::io::ErrorKind::InvalidInput.into()))?;

        dst.reserve(item.size());

        dst.put_u8(WIRE_ID);
        dst.put_u16(key_size);
        dst.put(item.key);
        dst.put_u32(size);
        dst.put(item.payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[test]
    fn decodes_across_partial_reads() {
        let mut codec = Codec::new();
        let mut encoded = BytesMut::new();
        codec.encode(Record::new("veh-1", "payload"), &mut encoded).unwrap();

        let mut src = BytesMut::new();
        let (first, rest) = encoded.split_at(5);

        src.extend_from_slice(first);
        assert!(codec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(rest);
        let record = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(record.key_lossy(), "veh-1");
        assert_eq!(record.payload(), &Bytes::from("payload"));
        assert!(src.is_empty());
    }

    #[test]
    fn rejects_unknown_wire_id() {
        let mut src = BytesMut::from(&[0xFFu8, 0, 0][..]);
        assert!(matches!(Codec::new().decode(&mut src), Err(Error::WireId(0xFF))));
    }

    #[test]
    fn rejects_oversized_keys() {
        let key = vec![b'k'; u16::MAX as usize + 1];
        let mut dst = BytesMut::new();
        let res = Codec::new().encode(Record::new(key, Bytes::new()), &mut dst);
        assert!(matches!(res, Err(Error::KeyTooLarge(65536))));
        assert!(dst.is_empty());
    }

    #[tokio::test]
    async fn framed_stream_preserves_order_and_keys() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FramedWrite::new(client, Codec::new());
        let mut reader = FramedRead::new(server, Codec::new());

        tokio::spawn(async move {
            for i in 0..10 {
                writer.send(Record::new(format!("veh-{i}"), format!("{i}"))).await.unwrap();
            }
        });

        for i in 0..10 {
            let record = reader.next().await.unwrap().unwrap();
            assert_eq!(record.key_lossy(), format!("veh-{i}"));
            assert_eq!(record.payload(), &Bytes::from(format!("{i}")));
        }
    }
}
