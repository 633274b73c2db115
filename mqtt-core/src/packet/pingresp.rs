use bytes::{BufMut, Bytes, BytesMut};

use crate::err::DecodeError;

use super::{FixedHeader, PacketType};

#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct PingRespPacket;

impl PingRespPacket {
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(PacketType::PINGRESP as u8);
        out.put_u8(0);
        return out.freeze();
    }

    pub fn decode(_f_header: FixedHeader) -> Result<Self, DecodeError> {
        return Ok(Self);
    }
}

#[cfg(test)]
mod packet {
    use super::PingRespPacket;
    use crate::packet::FixedHeader;
    use bytes::Bytes;

    #[test]
    fn roundtrip() {
        let bytes = PingRespPacket.encode();
        let mut bytes = Bytes::from(bytes);
        let header = FixedHeader::decode(&mut bytes).unwrap();
        assert_eq!(PingRespPacket::decode(header).unwrap(), PingRespPacket);
    }
}
