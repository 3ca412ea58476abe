use std::sync::Arc;

/// Verbosity of a logger, in ascending order.
///
/// A logger at a given level emits messages at that level and below, so
/// `Trace` emits everything and `Error` only errors.
#[derive(Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Debug)]
pub enum LogLevel {
    Error,
    Info,
    Debug,
    Trace,
}

pub trait Logger {
    fn level(&self) -> LogLevel;
    fn error(&self, msg: &str);
    fn info(&self, msg: &str);
    fn debug(&self, msg: &str);
    fn trace(&self, msg: &str);
}

impl<T: Logger + ?Sized> Logger for Arc<T> {
    fn level(&self) -> LogLevel {
        self.as_ref().level()
    }

    fn error(&self, msg: &str) {
        self.as_ref().error(msg);
    }

    fn info(&self, msg: &str) {
        self.as_ref().info(msg);
    }

    fn debug(&self, msg: &str) {
        self.as_ref().debug(msg);
    }

    fn trace(&self, msg: &str) {
        self.as_ref().trace(msg);
    }
}

/// A logger that discards everything.  Useful as a default and in tests.
pub struct NullLogger;

impl Logger for NullLogger {
    fn level(&self) -> LogLevel {
        LogLevel::Error
    }
    fn error(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn debug(&self, _msg: &str) {}
    fn trace(&self, _msg: &str) {}
}

#[macro_export]
macro_rules! trace {
    ($logger:expr, $($args : tt) *) => {
        {
            use $crate::logger::{Logger, LogLevel};
            if $logger.level() >= LogLevel::Trace {
                $logger.trace(&format!($($args)*));
            }
        }
    }
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($args : tt) *) => {
        {
            use $crate::logger::{Logger, LogLevel};
            if $logger.level() >= LogLevel::Debug {
                $logger.debug(&format!($($args)*));
            }
        }
    }
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($args : tt) *) => {
        {
            use $crate::logger::{Logger, LogLevel};
            if $logger.level() >= LogLevel::Info {
                $logger.info(&format!($($args)*));
            }
        }
    }
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($args : tt) *) => {
        {
            use $crate::logger::{Logger, LogLevel};
            if $logger.level() >= LogLevel::Error {
                $logger.error(&format!($($args)*));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LogLevel, Logger};
    use std::sync::{Arc, Mutex};

    struct Recorder {
        level: LogLevel,
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl Logger for Recorder {
        fn level(&self) -> LogLevel {
            self.level
        }
        fn error(&self, msg: &str) {
            self.lines.lock().unwrap().push((LogLevel::Error, msg.into()));
        }
        fn info(&self, msg: &str) {
            self.lines.lock().unwrap().push((LogLevel::Info, msg.into()));
        }
        fn debug(&self, msg: &str) {
            self.lines.lock().unwrap().push((LogLevel::Debug, msg.into()));
        }
        fn trace(&self, msg: &str) {
            self.lines.lock().unwrap().push((LogLevel::Trace, msg.into()));
        }
    }

    #[test]
    fn level_gating() {
        let logger = Arc::new(Recorder {
            level: LogLevel::Info,
            lines: Mutex::new(Vec::new()),
        });
        error!(logger, "e {}", 1);
        info!(logger, "i");
        debug!(logger, "d");
        trace!(logger, "t");
        let lines = logger.lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (LogLevel::Error, "e 1".to_string()));
        assert_eq!(lines[1], (LogLevel::Info, "i".to_string()));
    }
}
