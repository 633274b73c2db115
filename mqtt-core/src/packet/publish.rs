use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind, EncodeError},
    io::{decode_utf8, encode_packet_length, encode_utf8},
    qos::QosLevel,
    topic::TopicName,
};

use super::{FixedHeader, PacketType};

const RETAIN: u8 = 0b0000_0001;
const QOS_MASK: u8 = 0b0000_0110;
const DUP: u8 = 0b0000_1000;

#[derive(PartialEq, Debug, Clone)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QosLevel,
    pub retain: bool,
    pub topic: String,
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl PublishPacket {
    pub fn new(topic: String, payload: Bytes, qos: QosLevel, retain: bool, packet_id: Option<u16>) -> Self {
        return Self {
            dup: false,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        };
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut flags: u8 = 0;
        if self.dup {
            flags |= DUP;
        }
        flags |= (self.qos as u8) << 1;
        if self.retain {
            flags |= RETAIN;
        }

        let mut variable_header = BytesMut::new();
        encode_utf8(&mut variable_header, &self.topic)?;
        if self.qos != QosLevel::AtMostOnce {
            let id = self.packet_id.expect("QoS 1/2 PUBLISH must carry a packet id");
            variable_header.put_u16(id);
        }

        let mut out = BytesMut::new();
        out.put_u8(PacketType::PUBLISH as u8 | flags);
        encode_packet_length(&mut out, variable_header.len() + self.payload.len())?;
        out.extend_from_slice(&variable_header);
        out.extend_from_slice(&self.payload);

        return Ok(out.freeze());
    }

    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let flag_byte = f_header.flags.as_byte();
        let qos = QosLevel::try_from((flag_byte & QOS_MASK) >> 1)?;
        let retain = flag_byte & RETAIN != 0;
        let dup = flag_byte & DUP != 0;

        let start_len = bytes.len();
        let topic = decode_utf8(bytes)?;

        let packet_id = if qos != QosLevel::AtMostOnce {
            if bytes.len() < 2 {
                return Err(DecodeError::new(
                    DecodeErrorKind::Eof,
                    String::from("PUBLISH missing packet id."),
                ));
            }
            Some(bytes.get_u16())
        } else {
            None
        };

        // validate the topic name has no wildcards; PUBLISH topics must be concrete.
        TopicName::from_str(&topic)?;

        let payload_len = f_header.rest_len().saturating_sub(start_len - bytes.len());
        if payload_len > bytes.len() {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PUBLISH payload length exceeds buffer."),
            ));
        }
        let payload = bytes.slice(0..payload_len);
        bytes.advance(payload_len);

        return Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        });
    }
}

#[cfg(test)]
mod packet {
    use bytes::Bytes;

    use super::PublishPacket;
    use crate::{packet::FixedHeader, qos::QosLevel};

    fn redecode(packet: &PublishPacket) -> PublishPacket {
        let bytes = packet.encode().unwrap();
        let mut bytes = Bytes::from(bytes);
        let header = FixedHeader::decode(&mut bytes).unwrap();
        return PublishPacket::decode(header, &mut bytes).unwrap();
    }

    #[test]
    fn roundtrip_qos0() {
        let packet = PublishPacket::new(
            String::from("a/b"),
            Bytes::from_static(b"hello"),
            QosLevel::AtMostOnce,
            false,
            None,
        );
        assert_eq!(redecode(&packet), packet);
    }

    #[test]
    fn roundtrip_qos1_with_id() {
        let mut packet = PublishPacket::new(
            String::from("a/b/c"),
            Bytes::from_static(b"payload"),
            QosLevel::AtLeastOnce,
            true,
            Some(42),
        );
        packet.dup = true;
        assert_eq!(redecode(&packet), packet);
    }

    #[test]
    fn empty_payload_roundtrips() {
        let packet = PublishPacket::new(String::from("x"), Bytes::new(), QosLevel::ExactlyOnce, false, Some(7));
        assert_eq!(redecode(&packet), packet);
    }
}
