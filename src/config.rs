use std::env;

use log::warn;

use crate::alloc::{raw::Lookup, report::ReportFormat};

pub const ENV_CAPACITY: &str = "LEAKTRACK_CAPACITY";
pub const ENV_LOOKUP: &str = "LEAKTRACK_LOOKUP";
pub const ENV_FORMAT: &str = "LEAKTRACK_FORMAT";
pub const ENV_REPORT_ON_TEARDOWN: &str = "LEAKTRACK_REPORT_ON_TEARDOWN";

/// How a [`Tracker`](crate::Tracker) is set up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Live allocations the registry can hold before it first grows
    pub initial_capacity: usize,
    /// Where to find the real allocator
    pub lookup: Lookup,
    /// Format of [`report_leaks()`](crate::report_leaks)
    pub format: ReportFormat,
    /// Report leaks in [`teardown()`](crate::teardown) before discarding them
    pub report_on_teardown: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: 8,
            lookup: Lookup::Next,
            format: ReportFormat::Text,
            report_on_teardown: false,
        }
    }
}

impl Config {
    /// The default configuration, overridden by any `LEAKTRACK_*` variables
    /// that are set. Values that don't parse are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = var(ENV_CAPACITY) {
            match v.trim().parse() {
                Ok(n) => config.initial_capacity = n,
                Err(e) => warn!("ignoring {ENV_CAPACITY}={v:?}: {e}"),
            }
        }

        if let Some(v) = var(ENV_LOOKUP) {
            match v.trim().to_ascii_lowercase().as_str() {
                "next" => config.lookup = Lookup::Next,
                "default" => config.lookup = Lookup::Default,
                _ => warn!("ignoring {ENV_LOOKUP}={v:?}: expected `next` or `default`"),
            }
        }

        if let Some(v) = var(ENV_FORMAT) {
            match v.trim().to_ascii_lowercase().as_str() {
                "text" => config.format = ReportFormat::Text,
                "json" => config.format = ReportFormat::Json,
                _ => warn!("ignoring {ENV_FORMAT}={v:?}: expected `text` or `json`"),
            }
        }

        if let Some(v) = var(ENV_REPORT_ON_TEARDOWN) {
            config.report_on_teardown = v.eq_ignore_ascii_case("true") || v == "1";
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_is_default() {
        assert_eq!(config_from(&[]), Config::default());
    }

    #[test]
    fn every_variable_is_read() {
        let config = config_from(&[
            (ENV_CAPACITY, "1024"),
            (ENV_LOOKUP, "Default"),
            (ENV_FORMAT, "json"),
            (ENV_REPORT_ON_TEARDOWN, "1"),
        ]);
        assert_eq!(
            config,
            Config {
                initial_capacity: 1024,
                lookup: Lookup::Default,
                format: ReportFormat::Json,
                report_on_teardown: true,
            }
        );
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let config = config_from(&[
            (ENV_CAPACITY, "lots"),
            (ENV_LOOKUP, "sideways"),
            (ENV_FORMAT, "xml"),
            (ENV_REPORT_ON_TEARDOWN, "nope"),
        ]);
        assert_eq!(config, Config::default());
    }
}
