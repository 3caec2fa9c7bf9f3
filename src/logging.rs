use std::{
    fmt,
    io::Write,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use env_logger::Env;
use log::{Level, SetLoggerError};

/// Logger bound to a node; the node name is used as the `log` target.
#[derive(Debug, Clone)]
pub struct NodeLogger {
    name: Arc<str>,
}

impl NodeLogger {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self, level: Level, message: impl fmt::Display) {
        log::log!(target: self.name(), level, "{message}");
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, message);
    }
}

/// Installs `env_logger` with ROS console style lines:
/// `[INFO] [1700000000.123456789] [minimal_timer]: message`.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() -> Result<(), SetLoggerError> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            writeln!(
                buf,
                "[{}] [{}.{:09}] [{}]: {}",
                record.level(),
                stamp.as_secs(),
                stamp.subsec_nanos(),
                record.target(),
                record.args()
            )
        })
        .try_init()
}
