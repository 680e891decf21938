//! Process wide logger that can be replaced at runtime, and the logger mirroring records
//! to the debugger client console.

use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::{Once, RwLock};

pub static LOGGER_SWITCHER: Lazy<LoggerSwitcher> = Lazy::new(|| LoggerSwitcher {
    logger: RwLock::new(None),
    installed: Once::new(),
});

/// Delegates every record to the logger installed last.
pub struct LoggerSwitcher {
    logger: RwLock<Option<Box<dyn Log>>>,
    installed: Once,
}

impl LoggerSwitcher {
    /// Make `logger` the active logger and set the global max level to `filter`.
    pub fn switch(&'static self, logger: impl Log + 'static, filter: LevelFilter) {
        self.installed.call_once(|| {
            if let Err(e) = log::set_logger(self) {
                eprintln!("logger already installed: {e}");
            }
        });

        *self
            .logger
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Box::new(logger));
        log::set_max_level(filter);
    }
}

impl Log for LoggerSwitcher {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.logger.read() {
            Ok(logger) => logger.as_ref().map(|l| l.enabled(metadata)).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn log(&self, record: &Record) {
        if let Ok(logger) = self.logger.read() {
            if let Some(logger) = logger.as_ref() {
                logger.log(record);
            }
        }
    }

    fn flush(&self) {
        if let Ok(logger) = self.logger.read() {
            if let Some(logger) = logger.as_ref() {
                logger.flush();
            }
        }
    }
}

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

/// `env_logger` logger that also hands every formatted record to a sink.
///
/// Records of the `transport` target are never forwarded, neither are records logged
/// by the sink itself.
pub struct DapLogger {
    inner: env_logger::Logger,
    sink: Box<dyn Fn(String) + Send + Sync>,
}

impl DapLogger {
    pub fn new(sink: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            inner: env_logger::Logger::from_default_env(),
            sink: Box::new(sink),
        }
    }

    pub fn filter(&self) -> LevelFilter {
        self.inner.filter()
    }
}

impl Log for DapLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.inner.log(record);
        if !self.inner.matches(record) || record.target() == "transport" {
            return;
        }
        if FORWARDING.with(|f| f.replace(true)) {
            return;
        }

        let mut output = String::new();
        _ = write!(output, "[{}] ", record.level());
        if let Some(module) = record.module_path() {
            _ = write!(output, "{module} ");
        }
        _ = writeln!(output, "{}", record.args());
        (self.sink)(output);

        FORWARDING.with(|f| f.set(false));
    }

    fn flush(&self) {
        self.inner.flush()
    }
}
