use std::sync::Mutex;

/// Injected diagnostic sink. The engine never panics or prints directly;
/// every send/receive, parse failure, IO exception, and reconnect transition
/// is reported through these three severities.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards to the `log` facade, so an application that already wires up a
/// backend (env_logger, etc.) gets engine diagnostics without extra setup.
pub struct LogCrateLogger;

impl Logger for LogCrateLogger {
    fn info(&self, message: &str) {
        log::info!("{message}");
    }

    fn warning(&self, message: &str) {
        log::warn!("{message}");
    }

    fn error(&self, message: &str) {
        log::error!("{message}");
    }
}

/// Discards everything. Useful when a caller has no interest in diagnostics.
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Records every message for assertions in tests.
#[derive(Default)]
pub struct CollectingLogger {
    messages: Mutex<Vec<String>>,
}

impl CollectingLogger {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn messages(&self) -> Vec<String> {
        return self.messages.lock().unwrap().clone();
    }
}

impl Logger for CollectingLogger {
    fn info(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("INFO: {message}"));
    }

    fn warning(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("WARN: {message}"));
    }

    fn error(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("ERROR: {message}"));
    }
}

#[cfg(test)]
mod collecting_logger {
    use super::{CollectingLogger, Logger};

    #[test]
    fn records_every_severity() {
        let logger = CollectingLogger::new();
        logger.info("connecting");
        logger.warning("retrying");
        logger.error("giving up");

        assert_eq!(
            logger.messages(),
            vec![
                "INFO: connecting".to_string(),
                "WARN: retrying".to_string(),
                "ERROR: giving up".to_string(),
            ]
        );
    }
}
