use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind};

use super::{FixedHeader, PacketType};

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct PubRelPacket {
    pub packet_id: u16,
}

impl PubRelPacket {
    pub fn new(packet_id: u16) -> Self {
        return Self { packet_id };
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        // reserved flag bits must be 0b0010, enforced by HeaderFlags on decode.
        out.put_u8(PacketType::PUBREL as u8 | 0b0010);
        out.put_u8(2);
        out.put_u16(self.packet_id);
        return out.freeze();
    }

    pub fn decode(_f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::Eof,
                String::from("PUBREL missing packet id."),
            ));
        }
        return Ok(Self {
            packet_id: bytes.get_u16(),
        });
    }
}
