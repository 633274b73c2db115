use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};

/*
 * MQTT v3.1 standard, Remaining length field on the fixed header can be at
 * most 4 bytes.
 */

pub const MAX_ENCODED_PACKET_LEN: usize = (128u64).pow(4) as usize - 1;

pub fn encode_packet_length(bytes: &mut BytesMut, mut len: usize) -> Result<usize, EncodeError> {
    if len > MAX_ENCODED_PACKET_LEN {
        return Err(EncodeError::new(
            EncodeErrorKind::OversizedPayload,
            format!(
                "Packet payload exceeded max length of 127^4, found length {}",
                len
            ),
        ));
    }

    let mut num_bytes = 0;

    loop {
        let mut d: u8 = (len % 128) as u8;
        len /= 128;

        if len > 0 {
            d |= 128;
        }

        bytes.put_u8(d);
        num_bytes += 1;

        if len == 0 {
            break;
        }
    }

    return Ok(num_bytes);
}

/// Decodes the remaining-length varint from the front of `bytes`, advancing past it.
/// Returns `(encoded_len, remaining_len)`.
pub fn decode_packet_length(bytes: &mut Bytes) -> Result<(usize, usize), DecodeError> {
    let mut mult = 1;
    let mut len: usize = 0;

    for i in 0..4 {
        if bytes.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::Eof,
                String::from("Stream ended while reading remaining-length field."),
            ));
        }

        let c = bytes.get_u8();
        len += (c as usize & 127) * mult;
        mult *= 128;

        if (c & 128) == 0 {
            return Ok((i + 1, len));
        }
    }

    return Err(DecodeError::new(
        DecodeErrorKind::MalformedLength,
        String::from("Remaining-length field exceeded 4 bytes."),
    ));
}

pub fn encode_utf8(bytes: &mut BytesMut, val: &str) -> Result<(), EncodeError> {
    encode_bytes(bytes, val.as_bytes())
}

pub fn encode_bytes(bytes: &mut BytesMut, val: &[u8]) -> Result<(), EncodeError> {
    if val.len() > u16::MAX as usize {
        return Err(EncodeError::new(
            EncodeErrorKind::OversizedPayload,
            format!("Length-prefixed field exceeded {} bytes", u16::MAX),
        ));
    }

    bytes.put_u16(val.len() as u16);
    bytes.put_slice(val);

    return Ok(());
}

pub fn decode_utf8(bytes: &mut Bytes) -> Result<String, DecodeError> {
    let slice = decode_bytes(bytes)?;

    return String::from_utf8(slice.to_vec())
        .map_err(|e| DecodeError::new(DecodeErrorKind::Utf8ParseError, e.to_string()));
}

pub fn decode_bytes(bytes: &mut Bytes) -> Result<Bytes, DecodeError> {
    let len = decode_u16_len(bytes)?;
    let slice = bytes.slice(0..len as usize);
    bytes.advance(len as usize);
    return Ok(slice);
}

pub fn decode_u16_len(bytes: &mut Bytes) -> Result<u16, DecodeError> {
    if bytes.len() < 2 {
        return Err(DecodeError::new(
            DecodeErrorKind::Eof,
            String::from("Stream ended while reading a length prefix."),
        ));
    }

    let len = bytes.get_u16();

    if len as usize > bytes.len() {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedLength,
            format!(
                "Attempted invalid memory access, packet remaining length: {}, encoded length: {len}",
                bytes.len()
            ),
        ));
    }

    return Ok(len);
}

#[cfg(test)]
mod header_length {
    use bytes::{Bytes, BytesMut};

    use super::{decode_packet_length, encode_packet_length, MAX_ENCODED_PACKET_LEN};

    #[test]
    fn encode_length() {
        let mut bytes = BytesMut::new();
        let len = MAX_ENCODED_PACKET_LEN;
        let size = encode_packet_length(&mut bytes, len);

        assert!(size.is_ok());
        assert_eq!(size.unwrap(), 4);

        let mut bytes = BytesMut::new();
        let size = encode_packet_length(&mut bytes, MAX_ENCODED_PACKET_LEN + 1);
        assert!(size.is_err())
    }

    #[test]
    fn decode_length() {
        let buf: &[u8] = &[255, 255, 255, 127];
        let mut bytes = Bytes::from(BytesMut::from(buf));

        let (encode_len, rest_len) =
            decode_packet_length(&mut bytes).expect("Error decoding valid length");

        assert_eq!(encode_len, 4);
        assert_eq!(rest_len, MAX_ENCODED_PACKET_LEN);
    }

    #[test]
    fn check_does_not_over_read() {
        let buf: &[u8] = &[127, 128, 128];
        let mut bytes = Bytes::from(buf);

        let (encode_len, rest_len) =
            decode_packet_length(&mut bytes).expect("Error decoding valid length");

        assert_eq!(encode_len, 1);
        assert_eq!(rest_len, 127);
        assert_eq!(bytes.len(), 2);
    }
}
