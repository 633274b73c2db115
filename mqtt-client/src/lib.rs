pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logger;
pub mod session;

pub use config::{ClientConfig, WillConfig};
pub use dispatcher::{Callback, HandlerId};
pub use error::{ClientError, ErrorKind};
pub use logger::{CollectingLogger, LogCrateLogger, Logger, NullLogger};
pub use session::{Connector, ReconnectCallback, Session};

pub use mqtt_core::{packet, qos::QosLevel, topic::TopicFilter};
