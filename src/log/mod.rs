//! Diagnostics of the contact engine: channel registration, day transitions, state eviction and
//! Poisson table growth. These are log messages, not contact results; results come back from
//! the query methods.
//!
//! The five `log` macros are re-exported here and from the crate root, so a model built on the
//! engine can log through the same backend:
//!
//! ```rust
//! use ixa_contacts::info;
//!
//! pub fn seed_infections() {
//!     info!("Seeding initial infections.");
//! }
//! ```
//!
//! Logging is off until one of [`enable_logging`] or [`set_log_level`] is called. Filters can
//! target a module path or one of the engine's [`Component`]s:
//!
//! ```rust
//! use ixa_contacts::log::{set_component_level, set_log_level, Component, LevelFilter};
//!
//! set_log_level(LevelFilter::Info);
//! // Follow eviction and day transitions, but not every context meeting.
//! set_component_level(Component::Processes, LevelFilter::Debug);
//! set_component_level(Component::Channels, LevelFilter::Warn);
//! ```
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex, MutexGuard};

pub use log::{debug, error, info, trace, warn, LevelFilter};
#[cfg(feature = "logging")]
use log4rs::Handle;

/// Parts of the engine whose messages can be filtered together.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Component {
    /// Poisson checkpoint tables and discrete distributions.
    Sampling,
    /// Activity trackers of the contexts.
    Tracker,
    /// Contact processes and their retained states.
    Processes,
    /// Contexts, sparse and permanent channels.
    Channels,
    /// Registration, day advancement and calibration.
    Orchestrator,
}

impl Component {
    #[must_use]
    pub fn module_paths(self) -> &'static [&'static str] {
        match self {
            Component::Sampling => &["ixa_contacts::poisson", "ixa_contacts::discrete"],
            Component::Tracker => &["ixa_contacts::tracker"],
            Component::Processes => &["ixa_contacts::process", "ixa_contacts::window"],
            Component::Channels => &["ixa_contacts::channel"],
            Component::Orchestrator => &["ixa_contacts::orchestrator"],
        }
    }
}

/// Trackers report every replayed attendance change; that is only useful when asked for.
const DEFAULT_FILTERS: [(&str, LevelFilter); 1] = [("ixa_contacts::tracker", LevelFilter::Debug)];

static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// The process-wide logging state: a global level and per-module overrides. The backend is
/// reinstalled from it after every change.
#[derive(Debug)]
pub(in crate::log) struct LogConfiguration {
    pub(in crate::log) level: LevelFilter,
    pub(in crate::log) filters: BTreeMap<String, LevelFilter>,
    #[cfg(feature = "logging")]
    handle: Option<Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        LogConfiguration {
            level: LevelFilter::Off,
            filters: DEFAULT_FILTERS
                .iter()
                .map(|(module, level)| ((*module).to_string(), *level))
                .collect(),
            #[cfg(feature = "logging")]
            handle: None,
        }
    }
}

impl LogConfiguration {
    fn set_level(&mut self, level: LevelFilter) {
        self.level = level;
        self.install();
    }

    /// Applies every filter and reinstalls the backend once if any of them changed something.
    fn set_filters<'a>(&mut self, filters: impl IntoIterator<Item = (&'a str, LevelFilter)>) {
        let mut changed = false;
        for (module, level) in filters {
            changed |= self.filters.insert(module.to_string(), level) != Some(level);
        }
        if changed {
            self.install();
        }
    }

    fn remove_filter(&mut self, module: &str) {
        if self.filters.remove(module).is_some() {
            self.install();
        }
    }
}

fn configuration() -> MutexGuard<'static, LogConfiguration> {
    LOG_CONFIGURATION
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Emits everything. Same as `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Same as `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the level of every module without a filter of its own.
pub fn set_log_level(level: LevelFilter) {
    configuration().set_level(level);
}

pub fn set_module_filter(module_path: &str, level: LevelFilter) {
    configuration().set_filters([(module_path, level)]);
}

/// Sets several module filters with a single backend reinstall.
pub fn set_module_filters<S: ToString>(module_filters: &[(&S, LevelFilter)]) {
    let owned: Vec<(String, LevelFilter)> = module_filters
        .iter()
        .map(|(module, level)| (module.to_string(), *level))
        .collect();
    configuration().set_filters(owned.iter().map(|(module, level)| (module.as_str(), *level)));
}

/// Drops the filter of `module_path`, which falls back to the global level.
pub fn remove_module_filter(module_path: &str) {
    configuration().remove_filter(module_path);
}

/// Filters every module of `component`.
pub fn set_component_level(component: Component, level: LevelFilter) {
    configuration().set_filters(component.module_paths().iter().map(|path| (*path, level)));
}

#[cfg(test)]
mod tests {
    use super::*;

    // The configuration is global, so these tests take turns.
    static SERIAL: LazyLock<Mutex<()>> = LazyLock::new(Mutex::default);

    #[test]
    fn global_level() {
        let _guard = SERIAL.lock().unwrap();
        set_log_level(LevelFilter::Error);
        assert_eq!(configuration().level, LevelFilter::Error);
        error!("global_level: emitted at error");
        trace!("global_level: not emitted");
        enable_logging();
        assert_eq!(configuration().level, LevelFilter::Trace);
        disable_logging();
        assert_eq!(configuration().level, LevelFilter::Off);
    }

    #[test]
    fn module_and_component_filters() {
        let _guard = SERIAL.lock().unwrap();
        assert_eq!(
            configuration().filters.get("ixa_contacts::tracker"),
            Some(&LevelFilter::Debug)
        );

        set_component_level(Component::Processes, LevelFilter::Info);
        set_module_filters(&[(&"ixa_contacts::tracker", LevelFilter::Error)]);
        {
            let config = configuration();
            assert_eq!(config.filters.len(), 3);
            assert_eq!(
                config.filters.get("ixa_contacts::window"),
                Some(&LevelFilter::Info)
            );
            assert_eq!(
                config.filters.get("ixa_contacts::tracker"),
                Some(&LevelFilter::Error)
            );
        }

        for path in Component::Processes.module_paths() {
            remove_module_filter(path);
        }
        set_module_filter("ixa_contacts::tracker", LevelFilter::Debug);
        assert_eq!(configuration().filters.len(), 1);
    }
}
