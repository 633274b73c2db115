use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind, EncodeError},
    io::encode_packet_length,
    qos::SubAckQoS,
};

use super::PacketType;

#[derive(PartialEq, Debug, Clone)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<SubAckQoS>,
}

impl SubAckPacket {
    pub fn new(packet_id: u16, return_codes: Vec<SubAckQoS>) -> Self {
        return Self { packet_id, return_codes };
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut variable_header = BytesMut::new();
        variable_header.put_u16(self.packet_id);

        let mut payload = BytesMut::new();
        for code in &self.return_codes {
            payload.put_u8((*code).into());
        }

        let mut out = BytesMut::new();
        out.put_u8(PacketType::SUBACK as u8);
        encode_packet_length(&mut out, variable_header.len() + payload.len())?;
        out.extend_from_slice(&variable_header);
        out.extend_from_slice(&payload);

        return Ok(out.freeze());
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::Eof,
                String::from("SUBACK missing packet id."),
            ));
        }
        let packet_id = bytes.get_u16();

        if bytes.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("SUBACK must contain at least one return code."),
            ));
        }

        let mut return_codes = Vec::new();
        while !bytes.is_empty() {
            return_codes.push(SubAckQoS::try_from(bytes.get_u8())?);
        }

        return Ok(Self { packet_id, return_codes });
    }
}

#[cfg(test)]
mod packet {
    use super::SubAckPacket;
    use crate::qos::{QosLevel, SubAckQoS};

    #[test]
    fn roundtrip() {
        let packet = SubAckPacket::new(9, vec![SubAckQoS::QOS(QosLevel::AtLeastOnce), SubAckQoS::Err]);
        let mut bytes = packet.encode().unwrap();
        bytes.split_to(2);

        assert_eq!(SubAckPacket::decode(&mut bytes).unwrap(), packet);
    }
}
