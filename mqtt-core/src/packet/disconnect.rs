use bytes::{BufMut, Bytes, BytesMut};

use crate::err::DecodeError;

use super::{FixedHeader, PacketType};

#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct DisconnectPacket;

impl DisconnectPacket {
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(PacketType::DISCONNECT as u8);
        out.put_u8(0);
        return out.freeze();
    }

    pub fn decode(_f_header: FixedHeader) -> Result<Self, DecodeError> {
        return Ok(Self);
    }
}
