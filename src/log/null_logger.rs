/*!

A "logger" used when the `logging` feature is off. It outputs nothing but keeps the public API
working.

*/

use crate::log::LogConfiguration;

impl LogConfiguration {
    /// Applies the global level so that the `log` macros short-circuit.
    pub(in crate::log) fn set_config(&mut self) {
        log::set_max_level(self.global_log_level);
    }
}
