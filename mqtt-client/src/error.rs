pub use mqtt_core::err::client::{ClientError, ErrorKind};
