use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

use crate::log::LogConfiguration;

// ISO 8601 timestamp, highlighted level, module path.
const PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";
const CONSOLE: &str = "console";

impl LogConfiguration {
    /// Rebuilds the log4rs configuration and installs it, or hands it to the running logger.
    pub(in crate::log) fn install(&mut self) {
        let console = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build();
        let loggers = self
            .filters
            .iter()
            .map(|(module, level)| Logger::builder().build(module.clone(), *level));
        let config = match Config::builder()
            .appender(Appender::builder().build(CONSOLE, Box::new(console)))
            .loggers(loggers)
            .build(Root::builder().appender(CONSOLE).build(self.level))
        {
            Ok(config) => config,
            Err(e) => panic!("invalid logging configuration: {e}"),
        };

        if let Some(handle) = &self.handle {
            handle.set_config(config);
            return;
        }
        match log4rs::init_config(config) {
            Ok(handle) => self.handle = Some(handle),
            // The host program installed its own logger; only the level is ours to set.
            Err(_) => log::set_max_level(self.level),
        }
    }
}
