#![allow(unused_macros)]
use self::simple_logger::SimpleLogger;
use std::fmt;

mod simple_logger;

macro_rules! logger_macro {
    ($name:ident is $rule_level:ident to $target:expr, $d:tt) => {
        macro_rules! $name {
            ($d($d arg:tt)+) => (::log::log!(target: $target, ::log::Level::$rule_level, $d($d arg)+));
        }

        pub(crate) use $name;
    };
    ($name:ident is $rule_level:ident to $target:expr) => {
        logger_macro!($name is $rule_level to $target, $);
    };
}

logger_macro!(user_error is Error to "jobsh::user");
logger_macro!(user_warn is Warn to "jobsh::user");
logger_macro!(user_info is Info to "jobsh::user");

macro_rules! dev_logger_macro {
    ($name:ident is $rule_level:ident to $target:expr, $d:tt) => {
        macro_rules! $name {
            ($d($d arg:tt)+) => {
                if std::cfg!(feature = "dev") {
                    (::log::log!(
                        target: $target,
                        ::log::Level::$rule_level,
                        "{}: {}",
                        std::panic::Location::caller(),
                        format_args!($d($d arg)+)
                    ));
                }
            };
        }

        pub(crate) use $name;
    };
    ($name:ident is $rule_level:ident to $target:expr) => {
        dev_logger_macro!($name is $rule_level to $target, $);
    };
}

dev_logger_macro!(dev_error is Error to "jobsh::dev");
dev_logger_macro!(dev_warn is Warn to "jobsh::dev");
dev_logger_macro!(dev_info is Info to "jobsh::dev");
dev_logger_macro!(dev_debug is Debug to "jobsh::dev");

/// One destination and the log targets it accepts.
struct Route {
    /// Target namespace with a trailing `::`.
    namespace: String,
    sink: Box<dyn Log>,
}

impl Route {
    fn new(target: &str, sink: impl Log + 'static) -> Self {
        Self {
            namespace: format!("{}::", target.trim_end_matches(':')),
            sink: Box::new(sink),
        }
    }

    /// `jobsh::user` accepts `jobsh::user` and `jobsh::user::anything`, not `jobsh::username`.
    fn accepts(&self, target: &str) -> bool {
        target.starts_with(&self.namespace)
            || target == &self.namespace[..self.namespace.len() - 2]
    }
}

/// Sends every log record to the routes whose namespace covers the record's target.
#[derive(Default)]
pub struct ShellLogger {
    routes: Vec<Route>,
}

impl ShellLogger {
    pub fn new(prefix: &'static str) -> Self {
        let mut logger = Self::default();
        logger.routes.push(Route::new(
            "jobsh::user",
            SimpleLogger::to_stderr(prefix),
        ));

        #[cfg(feature = "dev")]
        {
            let path = std::env::var_os("JOBSH_DEV_LOGS")
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| {
                    std::env::temp_dir().join(format!("jobsh-dev-{}.log", std::process::id()))
                });
            if let Ok(sink) = SimpleLogger::to_file(path, "") {
                logger.routes.push(Route::new("jobsh::dev", sink));
            }
        }

        logger
    }

    /// Install as the process-wide logger. Returns `false` if one was already installed.
    pub fn into_global_logger(self) -> bool {
        log::set_boxed_logger(Box::new(self))
            .map(|()| log::set_max_level(log::LevelFilter::Trace))
            .is_ok()
    }
}

impl log::Log for ShellLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        let level = Level::from(record.level());
        self.routes
            .iter()
            .filter(|route| route.accepts(record.target()))
            .for_each(|route| route.sink.log(level, record.args()));
    }

    fn flush(&self) {
        self.routes.iter().for_each(|route| route.sink.flush());
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warn,
            log::Level::Info => Level::Info,
            log::Level::Debug | log::Level::Trace => Level::Debug,
        }
    }
}

trait Log: Send + Sync {
    fn log(&self, level: Level, args: &fmt::Arguments<'_>);
    fn flush(&self);
}
