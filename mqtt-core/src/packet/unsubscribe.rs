use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind, EncodeError},
    io::encode_packet_length,
    topic::TopicFilter,
};

use super::PacketType;

#[derive(PartialEq, Debug, Clone)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<TopicFilter>,
}

impl UnsubscribePacket {
    pub fn new(packet_id: u16, filters: Vec<TopicFilter>) -> Self {
        return Self { packet_id, filters };
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut variable_header = BytesMut::new();
        variable_header.put_u16(self.packet_id);

        let mut payload = BytesMut::new();
        for filter in &self.filters {
            crate::io::encode_utf8(&mut payload, &filter.clone().to_string())?;
        }

        let mut out = BytesMut::new();
        // flag bits must be 0b0010, per the fixed header's reserved-bits rule for UNSUBSCRIBE.
        out.put_u8(PacketType::UNSUBSCRIBE as u8 | 0b0010);
        encode_packet_length(&mut out, variable_header.len() + payload.len())?;
        out.extend_from_slice(&variable_header);
        out.extend_from_slice(&payload);

        return Ok(out.freeze());
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::Eof,
                String::from("UNSUBSCRIBE missing packet id."),
            ));
        }
        let packet_id = bytes.get_u16();

        if bytes.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("UNSUBSCRIBE must contain at least one topic filter."),
            ));
        }

        let mut filters = Vec::new();
        while !bytes.is_empty() {
            filters.push(TopicFilter::decode(bytes)?);
        }

        return Ok(Self { packet_id, filters });
    }
}
