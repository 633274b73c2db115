use crate::err::{DecodeError, DecodeErrorKind};

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub enum QosLevel {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl PartialEq<SubAckQoS> for QosLevel {
    fn eq(&self, other: &SubAckQoS) -> bool {
        return other == self;
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = DecodeError;
    /// Takes a byte with non-QoS bits masked, and QoS bits right-shifted to bit 0.
    fn try_from(value: u8) -> Result<Self, DecodeError> {
        let out = match value {
            0 => Self::AtMostOnce,
            1 => Self::AtLeastOnce,
            2 => Self::ExactlyOnce,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::QoS,
                    format!("Invalid QoS: {value}, only values 0-2 are valid"),
                ));
            }
        };

        return Ok(out);
    }
}

/// The granted-QoS entry carried in a SUBACK payload: either a QoS level or
/// the 0x80 failure code for a rejected subscription.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub enum SubAckQoS {
    QOS(QosLevel),
    Err,
}

impl PartialEq<QosLevel> for SubAckQoS {
    fn eq(&self, other: &QosLevel) -> bool {
        match self {
            Self::Err => return false,
            Self::QOS(qos) => return qos == other,
        }
    }
}

impl From<QosLevel> for SubAckQoS {
    fn from(value: QosLevel) -> Self {
        return Self::QOS(value);
    }
}

impl Into<u8> for SubAckQoS {
    fn into(self) -> u8 {
        match self {
            Self::Err => return 0b1000_0000,
            Self::QOS(qos) => return qos as u8,
        }
    }
}

impl TryFrom<u8> for SubAckQoS {
    type Error = DecodeError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value == 0b1000_0000 {
            return Ok(Self::Err);
        } else {
            return Ok(Self::QOS(QosLevel::try_from(value)?));
        }
    }
}
