use std::{error::Error, fmt::Display};

#[derive(Debug, Clone)]
pub struct EncodeError {
    kind: EncodeErrorKind,
    message: String,
}

impl EncodeError {
    pub fn new(kind: EncodeErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> EncodeErrorKind {
        return self.kind;
    }
}

impl Error for EncodeError {}

impl Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Clone, Debug, Copy, PartialEq)]
pub enum EncodeErrorKind {
    OversizedPayload,
}

#[derive(Debug, Clone)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    message: String,
}

impl Error for DecodeError {}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> DecodeErrorKind {
        return self.kind;
    }
}

/// EOF is distinguished from the other parse failures: it means the transport
/// closed (or timed out) mid-frame rather than the bytes being malformed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecodeErrorKind {
    Eof,
    FlagBits,
    PacketType,
    WillQoS,
    Will,
    QoS,
    Utf8ParseError,
    MalformedLength,
    MalformedTopicFilter,
    MalformedTopicName,
    UsernamePassword,
    InvalidProtocol,
    InvalidReturnCode,
    ImproperDisconnect,
    ProtocolError,
}

/// Error surface for the session engine. Wraps the lower codec errors plus
/// the IO and protocol failures that only make sense once a transport is involved.
pub mod client {
    use std::fmt::{self, Display};

    use super::{DecodeError, EncodeError};

    #[derive(Debug)]
    pub enum ErrorKind {
        Io(std::io::Error),
        Eof,
        ProtocolViolation,
        ConnectRejected(crate::ConnectReturnCode),
        ConnectTimeout,
        Decode,
        Encode,
    }

    impl Display for ErrorKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    #[derive(Debug)]
    pub struct ClientError {
        kind: ErrorKind,
        message: String,
    }

    impl ClientError {
        pub fn new(kind: ErrorKind, message: String) -> Self {
            return Self { kind, message };
        }

        pub fn kind(&self) -> &ErrorKind {
            return &self.kind;
        }
    }

    impl std::error::Error for ClientError {}

    impl Display for ClientError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}. {}", self.kind, self.message)
        }
    }

    impl From<DecodeError> for ClientError {
        fn from(value: DecodeError) -> Self {
            if value.kind() == super::DecodeErrorKind::Eof {
                return Self {
                    kind: ErrorKind::Eof,
                    message: String::new(),
                };
            }
            return Self {
                kind: ErrorKind::Decode,
                message: value.to_string(),
            };
        }
    }

    impl From<EncodeError> for ClientError {
        fn from(value: EncodeError) -> Self {
            return Self {
                kind: ErrorKind::Encode,
                message: value.to_string(),
            };
        }
    }

    impl From<std::io::Error> for ClientError {
        fn from(value: std::io::Error) -> Self {
            return Self {
                kind: ErrorKind::Io(value),
                message: String::new(),
            };
        }
    }
}
