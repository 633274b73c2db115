use bytes::{BufMut, Bytes, BytesMut};

use crate::err::DecodeError;

use super::{FixedHeader, PacketType};

#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct PingReqPacket;

impl PingReqPacket {
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(PacketType::PINGREQ as u8);
        out.put_u8(0);
        return out.freeze();
    }

    pub fn decode(_f_header: FixedHeader) -> Result<Self, DecodeError> {
        return Ok(Self);
    }
}

#[cfg(test)]
mod packet {
    use super::PingReqPacket;
    use crate::packet::FixedHeader;
    use bytes::Bytes;

    #[test]
    fn roundtrip() {
        let bytes = PingReqPacket.encode();
        let mut bytes = Bytes::from(bytes);
        let header = FixedHeader::decode(&mut bytes).unwrap();
        assert_eq!(PingReqPacket::decode(header).unwrap(), PingReqPacket);
    }
}
