use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind},
    ConnectReturnCode,
};

use super::PacketType;

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    pub fn new(session_present: bool, return_code: ConnectReturnCode) -> Self {
        return Self {
            session_present,
            return_code,
        };
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(PacketType::CONNACK as u8);
        out.put_u8(2);
        out.put_u8(self.session_present as u8);
        out.put_u8(self.return_code as u8);
        return out.freeze();
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::Eof,
                String::from("CONNACK variable header is short."),
            ));
        }

        let flags = bytes.get_u8();
        if flags & 0b1111_1110 != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("Reserved bits set in CONNACK flags."),
            ));
        }

        let return_code = ConnectReturnCode::try_from(bytes.get_u8())?;

        return Ok(Self {
            session_present: flags & 1 != 0,
            return_code,
        });
    }
}

#[cfg(test)]
mod packet {
    use super::ConnAckPacket;
    use crate::ConnectReturnCode;

    #[test]
    fn roundtrip() {
        let packet = ConnAckPacket::new(true, ConnectReturnCode::Accept);
        let mut bytes = packet.encode();
        bytes.split_to(2);

        assert_eq!(ConnAckPacket::decode(&mut bytes).unwrap(), packet);
    }

    #[test]
    fn rejects_reserved_bits() {
        let mut bytes = bytes::Bytes::from_static(&[0b0000_0010, 0]);
        assert!(ConnAckPacket::decode(&mut bytes).is_err());
    }
}
