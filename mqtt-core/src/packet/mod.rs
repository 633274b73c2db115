use bytes::{Buf, Bytes};
use std::fmt::Display;

mod connack;
mod connect;
mod disconnect;
mod pingreq;
mod pingresp;
mod puback;
mod pubcomp;
mod publish;
mod pubrec;
mod pubrel;
mod suback;
mod subscribe;
mod unsuback;
mod unsubscribe;

pub use connack::ConnAckPacket;
pub use connect::{ConnectPacket, Will};
pub use disconnect::DisconnectPacket;
pub use pingreq::PingReqPacket;
pub use pingresp::PingRespPacket;
pub use puback::PubAckPacket;
pub use pubcomp::PubCompPacket;
pub use publish::PublishPacket;
pub use pubrec::PubRecPacket;
pub use pubrel::PubRelPacket;
pub use suback::SubAckPacket;
pub use subscribe::SubscribePacket;
pub use unsuback::UnsubAckPacket;
pub use unsubscribe::UnsubscribePacket;

use crate::{
    err::{DecodeError, DecodeErrorKind, EncodeError},
    io::{decode_packet_length, MAX_ENCODED_PACKET_LEN},
};

const PACKET_TYPE_BITS: u8 = 0b1111_0000;
const PACKET_FLAG_BITS: u8 = 0b0000_1111;

#[derive(PartialEq, Debug, Clone)]
pub enum MqttPacket {
    ConnAck(ConnAckPacket),
    Connect(ConnectPacket),
    Disconnect(DisconnectPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    PubAck(PubAckPacket),
    PubComp(PubCompPacket),
    Publish(PublishPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    SubAck(SubAckPacket),
    Subscribe(SubscribePacket),
    UnsubAck(UnsubAckPacket),
    Unsubscribe(UnsubscribePacket),
}

impl MqttPacket {
    pub fn msg_type(&self) -> PacketType {
        match self {
            Self::ConnAck(_) => PacketType::CONNACK,
            Self::Connect(_) => PacketType::CONNECT,
            Self::Disconnect(_) => PacketType::DISCONNECT,
            Self::PingReq(_) => PacketType::PINGREQ,
            Self::PingResp(_) => PacketType::PINGRESP,
            Self::PubAck(_) => PacketType::PUBACK,
            Self::PubComp(_) => PacketType::PUBCOMP,
            Self::Publish(_) => PacketType::PUBLISH,
            Self::PubRec(_) => PacketType::PUBREC,
            Self::PubRel(_) => PacketType::PUBREL,
            Self::SubAck(_) => PacketType::SUBACK,
            Self::Subscribe(_) => PacketType::SUBSCRIBE,
            Self::UnsubAck(_) => PacketType::UNSUBACK,
            Self::Unsubscribe(_) => PacketType::UNSUBSCRIBE,
        }
    }

    pub fn decode(f_header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        return match f_header.type_ {
            PacketType::CONNACK => Ok(Self::ConnAck(ConnAckPacket::decode(bytes)?)),
            PacketType::CONNECT => Ok(Self::Connect(ConnectPacket::decode(bytes)?)),
            PacketType::DISCONNECT => Ok(Self::Disconnect(DisconnectPacket::decode(f_header)?)),
            PacketType::PINGREQ => Ok(Self::PingReq(PingReqPacket::decode(f_header)?)),
            PacketType::PINGRESP => Ok(Self::PingResp(PingRespPacket::decode(f_header)?)),
            PacketType::PUBACK => Ok(Self::PubAck(PubAckPacket::decode(f_header, bytes)?)),
            PacketType::PUBCOMP => Ok(Self::PubComp(PubCompPacket::decode(f_header, bytes)?)),
            PacketType::PUBLISH => Ok(Self::Publish(PublishPacket::decode(f_header, bytes)?)),
            PacketType::PUBREL => Ok(Self::PubRel(PubRelPacket::decode(f_header, bytes)?)),
            PacketType::PUBREC => Ok(Self::PubRec(PubRecPacket::decode(f_header, bytes)?)),
            PacketType::SUBACK => Ok(Self::SubAck(SubAckPacket::decode(bytes)?)),
            PacketType::SUBSCRIBE => Ok(Self::Subscribe(SubscribePacket::decode(bytes)?)),
            PacketType::UNSUBACK => Ok(Self::UnsubAck(UnsubAckPacket::decode(f_header, bytes)?)),
            PacketType::UNSUBSCRIBE => Ok(Self::Unsubscribe(UnsubscribePacket::decode(bytes)?)),
        };
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        return match self {
            Self::ConnAck(packet) => Ok(packet.encode()),
            Self::Connect(packet) => packet.encode(),
            Self::Disconnect(packet) => Ok(packet.encode()),
            Self::PingReq(packet) => Ok(packet.encode()),
            Self::PingResp(packet) => Ok(packet.encode()),
            Self::PubAck(packet) => Ok(packet.encode()),
            Self::PubComp(packet) => Ok(packet.encode()),
            Self::Publish(packet) => packet.encode(),
            Self::PubRel(packet) => Ok(packet.encode()),
            Self::PubRec(packet) => Ok(packet.encode()),
            Self::SubAck(packet) => packet.encode(),
            Self::Subscribe(packet) => packet.encode(),
            Self::UnsubAck(packet) => Ok(packet.encode()),
            Self::Unsubscribe(packet) => packet.encode(),
        };
    }
}

#[derive(Copy, Clone, Debug)]
pub struct FixedHeader {
    pub type_: PacketType,
    pub flags: HeaderFlags,
    rest_len: usize,
    header_len: usize,
}

impl FixedHeader {
    /// Decodes a fixed header from a buffer that already holds the whole frame
    /// (type byte + remaining-length varint + body).
    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::Eof,
                String::from("Received packet of length zero."),
            ));
        }

        let type_byte = bytes.get_u8();
        let type_ = PacketType::try_from(type_byte)?;
        let flags = HeaderFlags::try_from((type_, type_byte))?;

        let (len_len, rest_len) = decode_packet_length(bytes)?;

        return Ok(Self {
            type_,
            flags,
            header_len: len_len + 1,
            rest_len,
        });
    }

    pub fn header_len(&self) -> usize {
        return self.header_len;
    }

    pub fn rest_len(&self) -> usize {
        return self.rest_len;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct HeaderFlags {
    byte: u8,
}

impl HeaderFlags {
    pub fn as_byte(&self) -> u8 {
        return self.byte;
    }
}

// https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718022
impl TryFrom<(PacketType, u8)> for HeaderFlags {
    type Error = DecodeError;
    fn try_from((type_, byte): (PacketType, u8)) -> Result<Self, DecodeError> {
        match type_ {
            PacketType::PUBLISH => {}
            PacketType::PUBREL | PacketType::SUBSCRIBE | PacketType::UNSUBSCRIBE => {
                if byte & PACKET_FLAG_BITS != 2 {
                    return Err(DecodeError::new(
                        DecodeErrorKind::FlagBits,
                        format!(
                            "Invalid flag bits: {} for packet type: {}, byte must be == 2 for packet type {type_}.",
                            byte, type_
                        ),
                    ));
                }
            }
            _ => {
                if byte & PACKET_FLAG_BITS != 0 {
                    return Err(DecodeError::new(
                        DecodeErrorKind::FlagBits,
                        format!(
                            "Invalid flag bits: {} for packet type: {}, bits must be == 0 for packet type {type_}.",
                            byte, type_
                        ),
                    ));
                }
            }
        }
        return Ok(Self { byte });
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum PacketType {
    CONNECT = 0b0001_0000,
    CONNACK = 0b0010_0000,
    PUBLISH = 0b0011_0000,
    PUBACK = 0b0100_0000,
    PUBREC = 0b0101_0000,
    PUBREL = 0b0110_0000,
    PUBCOMP = 0b0111_0000,
    SUBSCRIBE = 0b1000_0000,
    SUBACK = 0b1001_0000,
    UNSUBSCRIBE = 0b1010_0000,
    UNSUBACK = 0b1011_0000,
    PINGREQ = 0b1100_0000,
    PINGRESP = 0b1101_0000,
    DISCONNECT = 0b1110_0000,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;
    fn try_from(value: u8) -> Result<Self, DecodeError> {
        let out = match value & PACKET_TYPE_BITS {
            0x10 => Self::CONNECT,
            0x20 => Self::CONNACK,
            0x30 => Self::PUBLISH,
            0x40 => Self::PUBACK,
            0x50 => Self::PUBREC,
            0x60 => Self::PUBREL,
            0x70 => Self::PUBCOMP,
            0x80 => Self::SUBSCRIBE,
            0x90 => Self::SUBACK,
            0xA0 => Self::UNSUBSCRIBE,
            0xB0 => Self::UNSUBACK,
            0xC0 => Self::PINGREQ,
            0xD0 => Self::PINGRESP,
            0xE0 => Self::DISCONNECT,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::PacketType,
                    format!("Packet type {} is not a valid packet.", value >> 4),
                ))
            }
        };
        return Ok(out);
    }
}

impl Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CONNECT => write!(f, "CONNECT"),
            Self::CONNACK => write!(f, "CONNACK"),
            Self::PUBLISH => write!(f, "PUBLISH"),
            Self::PUBACK => write!(f, "PUBACK"),
            Self::PUBREC => write!(f, "PUBREC"),
            Self::PUBREL => write!(f, "PUBREL"),
            Self::PUBCOMP => write!(f, "PUBCOMP"),
            Self::SUBSCRIBE => write!(f, "SUBSCRIBE"),
            Self::SUBACK => write!(f, "SUBACK"),
            Self::UNSUBSCRIBE => write!(f, "UNSUBSCRIBE"),
            Self::UNSUBACK => write!(f, "UNSUBACK"),
            Self::PINGREQ => write!(f, "PINGREQ"),
            Self::PINGRESP => write!(f, "PINGRESP"),
            Self::DISCONNECT => write!(f, "DISCONNECT"),
        }
    }
}

/// Reads one frame's worth of remaining-length + body from `bytes`, which must
/// already contain at least the fixed header. Used by the transport layer once
/// it has read `header_len() + rest_len()` bytes off the wire.
pub fn decode_packet(f_header: FixedHeader, bytes: &mut Bytes) -> Result<MqttPacket, DecodeError> {
    if bytes.len() < f_header.rest_len() {
        return Err(DecodeError::new(
            DecodeErrorKind::Eof,
            String::from("Buffer shorter than the declared remaining length."),
        ));
    }
    if f_header.rest_len() > MAX_ENCODED_PACKET_LEN {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedLength,
            String::from("Remaining length exceeds the protocol maximum."),
        ));
    }

    // Decoders for variable-arity payloads (SUBSCRIBE, UNSUBSCRIBE) consume
    // until their buffer runs dry, so hand them exactly the declared frame
    // rather than whatever else happens to follow it.
    let mut frame = bytes.split_to(f_header.rest_len());
    MqttPacket::decode(f_header, &mut frame)
}

#[cfg(test)]
mod packet {
    use bytes::Bytes;

    use super::FixedHeader;

    #[test]
    fn deserialize() {
        let mut bytes = Bytes::from_iter([0b1001_0000, 100]);
        let header = FixedHeader::decode(&mut bytes).expect("Could not decode header.");

        assert_eq!(header.header_len, 2);
        assert_eq!(header.rest_len, 100);
    }
}
