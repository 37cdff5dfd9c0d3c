//! Without the `logging` feature the engine installs no backend. The host model may install any
//! `log` implementation; the configured level still caps what the macros emit.

use crate::log::LogConfiguration;

impl LogConfiguration {
    pub(in crate::log) fn install(&mut self) {
        log::set_max_level(self.level);
    }
}
