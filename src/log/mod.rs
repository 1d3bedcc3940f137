//! Diagnostic logging for the engine. This is separate from _reporting_ (see `crate::report`),
//! which writes the model output itself.
//!
//! The five `log` macros are re-exported here. Logging is off until a level is set, either from
//! code or with the runner's `--log-level` option, which takes a comma separated list of
//! directives:
//!
//! ```rust
//! use ixa_outbreak::log::configure_logging;
//!
//! // Info everywhere, every migration decision, and one line per status change.
//! configure_logging("info,simulation=debug,agent=trace").unwrap();
//! # configure_logging("off").unwrap();
//! ```
//!
//! A directive without `=` sets the global level. `module=level` sets a filter for one module;
//! names without a `::` are taken relative to this crate.
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

use std::str::FromStr;
use std::sync::{LazyLock, Mutex, MutexGuard};

pub use log::{debug, error, info, trace, warn, LevelFilter};
#[cfg(feature = "logging")]
use log4rs::Handle;

use crate::error::{invalid_parameter, OutbreakError};
use crate::hashing::HashMap;

const CRATE_PREFIX: &str = "ixa_outbreak::";

// Per-agent status traces are silenced unless a directive asks for them.
const DEFAULT_MODULE_FILTERS: [(&str, LevelFilter); 1] =
    [("ixa_outbreak::agent", LevelFilter::Off)];

static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// The global level plus the per-module overrides, and the handle of the installed logger.
#[derive(Debug)]
pub(in crate::log) struct LogConfiguration {
    pub(in crate::log) global_log_level: LevelFilter,
    pub(in crate::log) module_filters: HashMap<String, LevelFilter>,

    #[cfg(feature = "logging")]
    root_handle: Option<Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        Self {
            global_log_level: LevelFilter::Off,
            module_filters: DEFAULT_MODULE_FILTERS
                .iter()
                .map(|(module, level)| ((*module).to_string(), *level))
                .collect(),

            #[cfg(feature = "logging")]
            root_handle: None,
        }
    }
}

impl LogConfiguration {
    fn apply(&mut self, directives: &[Directive]) {
        for directive in directives {
            match directive {
                Directive::Global(level) => self.global_log_level = *level,
                Directive::Module(module, level) => {
                    self.module_filters.insert(module.clone(), *level);
                }
            }
        }
        self.set_config();
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Directive {
    Global(LevelFilter),
    Module(String, LevelFilter),
}

impl FromStr for Directive {
    type Err = OutbreakError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_level = |level: &str| {
            LevelFilter::from_str(level.trim()).map_err(|_| {
                invalid_parameter("log_level", format!("unknown level `{}`", level.trim()))
            })
        };
        match s.split_once('=') {
            None => Ok(Directive::Global(parse_level(s)?)),
            Some((module, level)) => {
                let module = module.trim();
                if module.is_empty() {
                    return Err(invalid_parameter(
                        "log_level",
                        format!("missing module name in `{s}`"),
                    ));
                }
                let module = if module.contains("::") || module == "ixa_outbreak" {
                    module.to_string()
                } else {
                    format!("{CRATE_PREFIX}{module}")
                };
                Ok(Directive::Module(module, parse_level(level)?))
            }
        }
    }
}

/// Parses and applies a comma separated list of logging directives such as
/// `"warn,simulation=debug"`. Nothing is applied unless every directive parses.
pub fn configure_logging(directives: &str) -> Result<(), OutbreakError> {
    let directives = directives
        .split(',')
        .filter(|directive| !directive.trim().is_empty())
        .map(Directive::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    get_log_configuration().apply(&directives);
    Ok(())
}

/// Sets the global log level. `LevelFilter::Off` disables logging for every module without its
/// own filter.
pub fn set_log_level(level: LevelFilter) {
    get_log_configuration().apply(&[Directive::Global(level)]);
}

/// Sets a level filter for a full module path such as `"ixa_outbreak::simulation"`.
pub fn set_module_filter(module_path: &str, level: LevelFilter) {
    get_log_configuration().apply(&[Directive::Module(module_path.to_string(), level)]);
}

fn get_log_configuration() -> MutexGuard<'static, LogConfiguration> {
    // The configuration holds no invariants a panicking holder could break.
    LOG_CONFIGURATION
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
