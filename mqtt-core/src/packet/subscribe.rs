use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind, EncodeError},
    io::encode_packet_length,
    topic::{TopicFilter, TopicFilterResult, TopicSubscription},
};

use super::PacketType;

#[derive(PartialEq, Debug, Clone)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub subscriptions: Vec<TopicSubscription>,
}

impl SubscribePacket {
    pub fn new(packet_id: u16, subscriptions: Vec<TopicSubscription>) -> Self {
        return Self { packet_id, subscriptions };
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut variable_header = BytesMut::new();
        variable_header.put_u16(self.packet_id);

        let mut payload = BytesMut::new();
        for sub in &self.subscriptions {
            crate::io::encode_utf8(&mut payload, &sub.filter().clone().to_string())?;
            payload.put_u8(sub.qos() as u8);
        }

        let mut out = BytesMut::new();
        // flag bits must be 0b0010, per the fixed header's reserved-bits rule for SUBSCRIBE.
        out.put_u8(PacketType::SUBSCRIBE as u8 | 0b0010);
        encode_packet_length(&mut out, variable_header.len() + payload.len())?;
        out.extend_from_slice(&variable_header);
        out.extend_from_slice(&payload);

        return Ok(out.freeze());
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::Eof,
                String::from("SUBSCRIBE missing packet id."),
            ));
        }
        let packet_id = bytes.get_u16();

        if bytes.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("SUBSCRIBE must contain at least one topic filter."),
            ));
        }

        let mut subscriptions = Vec::new();
        while !bytes.is_empty() {
            let filter = TopicFilter::decode(bytes);
            let qos_byte = if bytes.is_empty() {
                return Err(DecodeError::new(
                    DecodeErrorKind::Eof,
                    String::from("SUBSCRIBE topic filter missing requested QoS."),
                ));
            } else {
                bytes.get_u8()
            };

            let entry = match filter {
                Ok(filter) => {
                    let qos = crate::qos::QosLevel::try_from(qos_byte)?;
                    TopicFilterResult::Ok(TopicSubscription::new(filter, qos))
                }
                Err(_) => TopicFilterResult::Err,
            };

            match entry {
                TopicFilterResult::Ok(sub) => subscriptions.push(sub),
                TopicFilterResult::Err => {
                    return Err(DecodeError::new(
                        DecodeErrorKind::MalformedTopicFilter,
                        String::from("SUBSCRIBE contained a malformed topic filter."),
                    ))
                }
            }
        }

        return Ok(Self { packet_id, subscriptions });
    }
}

#[cfg(test)]
mod packet {
    use super::SubscribePacket;
    use crate::{qos::QosLevel, topic::{TopicFilter, TopicSubscription}};

    #[test]
    fn roundtrip_multiple_filters() {
        let packet = SubscribePacket::new(
            5,
            vec![
                TopicSubscription::new(TopicFilter::from_str("a/b").unwrap(), QosLevel::AtLeastOnce),
                TopicSubscription::new(TopicFilter::from_str("a/+/c").unwrap(), QosLevel::ExactlyOnce),
            ],
        );

        let mut bytes = packet.encode().unwrap();
        bytes.split_to(2);
        let decoded = SubscribePacket::decode(&mut bytes).unwrap();

        assert_eq!(decoded, packet);
    }
}
