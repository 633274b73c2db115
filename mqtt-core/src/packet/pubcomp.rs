use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind};

use super::{FixedHeader, PacketType};

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct PubCompPacket {
    pub packet_id: u16,
}

impl PubCompPacket {
    pub fn new(packet_id: u16) -> Self {
        return Self { packet_id };
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(PacketType::PUBCOMP as u8);
        out.put_u8(2);
        out.put_u16(self.packet_id);
        return out.freeze();
    }

    pub fn decode(_f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::Eof,
                String::from("PUBCOMP missing packet id."),
            ));
        }
        return Ok(Self {
            packet_id: bytes.get_u16(),
        });
    }
}

#[cfg(test)]
mod packet {
    use super::PubCompPacket;
    use crate::packet::FixedHeader;
    use bytes::Bytes;

    #[test]
    fn roundtrip() {
        let packet = PubCompPacket::new(321);
        let bytes = packet.encode();
        let mut bytes = Bytes::from(bytes);
        let header = FixedHeader::decode(&mut bytes).unwrap();
        assert_eq!(PubCompPacket::decode(header, &mut bytes).unwrap(), packet);
    }
}
