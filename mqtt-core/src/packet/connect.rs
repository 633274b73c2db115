use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    err::{DecodeError, DecodeErrorKind, EncodeError},
    io::{decode_bytes, decode_utf8, encode_bytes, encode_packet_length, encode_utf8},
    qos::QosLevel,
};

use super::PacketType;

/// MQTT 3.1 uses the protocol name "MQIsdp" and protocol level 3, unlike the
/// later 3.1.1 revision which renamed the name to "MQTT" and bumped the level to 4.
const PROTOCOL_NAME: &str = "MQIsdp";
const PROTOCOL_LEVEL: u8 = 3;

const FLAG_USERNAME: u8 = 0b1000_0000;
const FLAG_PASSWORD: u8 = 0b0100_0000;
const FLAG_WILL_RETAIN: u8 = 0b0010_0000;
const FLAG_WILL_QOS: u8 = 0b0001_1000;
const FLAG_WILL: u8 = 0b0000_0100;
const FLAG_CLEAN_SESSION: u8 = 0b0000_0010;

#[derive(PartialEq, Debug, Clone)]
pub struct Will {
    pub topic: String,
    pub message: Bytes,
    pub qos: QosLevel,
    pub retain: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ConnectPacket {
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

impl ConnectPacket {
    pub fn new(client_id: String, clean_session: bool, keep_alive: u16) -> Self {
        return Self {
            client_id,
            clean_session,
            keep_alive,
            will: None,
            username: None,
            password: None,
        };
    }

    pub fn with_will(mut self, will: Will) -> Self {
        self.will = Some(will);
        return self;
    }

    pub fn with_credentials(mut self, username: String, password: Option<Bytes>) -> Self {
        self.username = Some(username);
        self.password = password;
        return self;
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut variable_header = BytesMut::new();
        encode_utf8(&mut variable_header, PROTOCOL_NAME)?;
        variable_header.put_u8(PROTOCOL_LEVEL);

        let mut flags: u8 = 0;
        if self.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }

        let mut payload = BytesMut::new();

        if let Some(will) = &self.will {
            flags |= FLAG_WILL;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }

        variable_header.put_u8(flags);
        variable_header.put_u16(self.keep_alive);

        encode_utf8(&mut payload, &self.client_id)?;

        if let Some(will) = &self.will {
            encode_utf8(&mut payload, &will.topic)?;
            encode_bytes(&mut payload, &will.message)?;
        }
        if let Some(username) = &self.username {
            encode_utf8(&mut payload, username)?;
        }
        if let Some(password) = &self.password {
            encode_bytes(&mut payload, password)?;
        }

        let mut out = BytesMut::new();
        out.put_u8(PacketType::CONNECT as u8);
        encode_packet_length(&mut out, variable_header.len() + payload.len())?;
        out.extend_from_slice(&variable_header);
        out.extend_from_slice(&payload);

        return Ok(out.freeze());
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let protocol_name = decode_utf8(bytes)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidProtocol,
                format!("Expected protocol name \"{PROTOCOL_NAME}\", found \"{protocol_name}\""),
            ));
        }

        if bytes.is_empty() {
            return Err(DecodeError::new(DecodeErrorKind::Eof, String::from("Missing protocol level.")));
        }
        let level = bytes.get_u8();
        if level != PROTOCOL_LEVEL {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidProtocol,
                format!("Expected protocol level {PROTOCOL_LEVEL}, found {level}"),
            ));
        }

        if bytes.is_empty() {
            return Err(DecodeError::new(DecodeErrorKind::Eof, String::from("Missing connect flags.")));
        }
        let flags = bytes.get_u8();

        if bytes.len() < 2 {
            return Err(DecodeError::new(DecodeErrorKind::Eof, String::from("Missing keep-alive.")));
        }
        let keep_alive = bytes.get_u16();

        let client_id = decode_utf8(bytes)?;

        let will = if flags & FLAG_WILL != 0 {
            let qos = QosLevel::try_from((flags & FLAG_WILL_QOS) >> 3)
                .map_err(|_| DecodeError::new(DecodeErrorKind::WillQoS, String::from("Invalid will QoS.")))?;
            let topic = decode_utf8(bytes)?;
            let message = decode_bytes(bytes)?;
            Some(Will {
                topic,
                message,
                qos,
                retain: flags & FLAG_WILL_RETAIN != 0,
            })
        } else if flags & FLAG_WILL_QOS != 0 || flags & FLAG_WILL_RETAIN != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::Will,
                String::from("Will QoS/retain set without the will flag."),
            ));
        } else {
            None
        };

        let username = if flags & FLAG_USERNAME != 0 {
            Some(decode_utf8(bytes)?)
        } else {
            None
        };

        let password = if flags & FLAG_PASSWORD != 0 {
            if username.is_none() {
                return Err(DecodeError::new(
                    DecodeErrorKind::UsernamePassword,
                    String::from("Password flag set without username flag."),
                ));
            }
            Some(decode_bytes(bytes)?)
        } else {
            None
        };

        return Ok(Self {
            client_id,
            clean_session: flags & FLAG_CLEAN_SESSION != 0,
            keep_alive,
            will,
            username,
            password,
        });
    }
}

#[cfg(test)]
mod packet {
    use bytes::Bytes;

    use super::{ConnectPacket, Will};
    use crate::qos::QosLevel;

    #[test]
    fn roundtrip_minimal() {
        let packet = ConnectPacket::new(String::from("client-1"), true, 60);
        let mut bytes = packet.encode().unwrap();

        // strip fixed header before decode, matching what the transport layer does
        bytes.split_to(2);
        let decoded = ConnectPacket::decode(&mut bytes).unwrap();

        assert_eq!(decoded, packet);
    }

    #[test]
    fn roundtrip_with_will_and_credentials() {
        let packet = ConnectPacket::new(String::from("client-2"), false, 30)
            .with_will(Will {
                topic: String::from("a/b"),
                message: Bytes::from_static(b"bye"),
                qos: QosLevel::ExactlyOnce,
                retain: true,
            })
            .with_credentials(String::from("user"), Some(Bytes::from_static(b"pass")));

        let mut bytes = packet.encode().unwrap();
        bytes.split_to(2);
        let decoded = ConnectPacket::decode(&mut bytes).unwrap();

        assert_eq!(decoded, packet);
    }

    #[test]
    fn rejects_wrong_protocol_level() {
        let mut bytes = bytes::BytesMut::new();
        crate::io::encode_utf8(&mut bytes, "MQIsdp").unwrap();
        bytes.extend_from_slice(&[4, 0, 0, 60]);
        crate::io::encode_utf8(&mut bytes, "c").unwrap();
        let mut bytes = bytes.freeze();

        assert!(ConnectPacket::decode(&mut bytes).is_err());
    }
}
