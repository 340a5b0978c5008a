//! Configuration management for the annotator

use std::env;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::annotations::validate_color;
use crate::geometry::MergeConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: `{value}` ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub geometry: GeometryConfig,
    pub selection: SelectionConfig,
    pub highlight: HighlightConfig,
}

/// Persistence timeouts and the simulated local latency
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub create_timeout: Duration,
    pub update_timeout: Duration,
    pub delete_timeout: Duration,
    pub load_timeout: Duration,
    pub local_latency: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryConfig {
    pub line_tolerance: f64,
    pub adjacency_gap: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// Delay between pointer release and reading the selection
    pub settle_delay: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HighlightConfig {
    pub default_color: String,
    pub opacity: f32,
    pub underline_thickness: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            create_timeout: Duration::from_secs(8),
            update_timeout: Duration::from_secs(8),
            delete_timeout: Duration::from_secs(5),
            load_timeout: Duration::from_secs(8),
            local_latency: Duration::from_millis(50),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        GeometryConfig {
            line_tolerance: 5.0,
            adjacency_gap: 2.0,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        SelectionConfig {
            settle_delay: Duration::from_millis(10),
        }
    }
}

impl Default for HighlightConfig {
    fn default() -> Self {
        HighlightConfig {
            default_color: "#ffeb3b".to_string(),
            opacity: 0.35,
            underline_thickness: 2.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            geometry: GeometryConfig::default(),
            selection: SelectionConfig::default(),
            highlight: HighlightConfig::default(),
        }
    }
}

impl GeometryConfig {
    pub fn merge(&self) -> MergeConfig {
        MergeConfig {
            line_tolerance: self.line_tolerance,
            adjacency_gap: self.adjacency_gap,
        }
    }
}

impl Config {
    /// Read `ANNOTATOR_*` variables, falling back to defaults for unset ones
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from any variable source, e.g. a map in tests
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let lookup = &lookup;

        let config = Config {
            store: StoreConfig {
                create_timeout: millis_var(lookup, "ANNOTATOR_CREATE_TIMEOUT_MS", defaults.store.create_timeout)?,
                update_timeout: millis_var(lookup, "ANNOTATOR_UPDATE_TIMEOUT_MS", defaults.store.update_timeout)?,
                delete_timeout: millis_var(lookup, "ANNOTATOR_DELETE_TIMEOUT_MS", defaults.store.delete_timeout)?,
                load_timeout: millis_var(lookup, "ANNOTATOR_LOAD_TIMEOUT_MS", defaults.store.load_timeout)?,
                local_latency: millis_var(lookup, "ANNOTATOR_LOCAL_LATENCY_MS", defaults.store.local_latency)?,
            },
            geometry: GeometryConfig {
                line_tolerance: parsed_var(lookup, "ANNOTATOR_LINE_TOLERANCE_PX", defaults.geometry.line_tolerance)?,
                adjacency_gap: parsed_var(lookup, "ANNOTATOR_ADJACENCY_GAP_PX", defaults.geometry.adjacency_gap)?,
            },
            selection: SelectionConfig {
                settle_delay: millis_var(lookup, "ANNOTATOR_SETTLE_DELAY_MS", defaults.selection.settle_delay)?,
            },
            highlight: HighlightConfig {
                default_color: lookup("ANNOTATOR_HIGHLIGHT_COLOR").unwrap_or(defaults.highlight.default_color),
                opacity: parsed_var(lookup, "ANNOTATOR_HIGHLIGHT_OPACITY", defaults.highlight.opacity)?,
                underline_thickness: parsed_var(
                    lookup,
                    "ANNOTATOR_UNDERLINE_THICKNESS_PX",
                    defaults.highlight.underline_thickness,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = validate_color(&self.highlight.default_color) {
            return Err(ConfigError::InvalidValue {
                var: "ANNOTATOR_HIGHLIGHT_COLOR",
                value: self.highlight.default_color.clone(),
                reason: e.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.highlight.opacity) {
            return Err(ConfigError::InvalidValue {
                var: "ANNOTATOR_HIGHLIGHT_OPACITY",
                value: self.highlight.opacity.to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parsed_var<T>(
    lookup: &dyn Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::InvalidValue {
                var,
                reason: e.to_string(),
                value,
            }),
        },
        None => Ok(default),
    }
}

fn millis_var(
    lookup: &dyn Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parsed_var(lookup, var, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.store.create_timeout, Duration::from_secs(8));
        assert_eq!(config.store.update_timeout, Duration::from_secs(8));
        assert_eq!(config.store.load_timeout, Duration::from_secs(8));
        assert_eq!(config.store.delete_timeout, Duration::from_secs(5));
        assert_eq!(config.geometry.merge(), MergeConfig::default());
        assert_eq!(config.highlight.default_color, "#ffeb3b");
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(vars(&[
            ("ANNOTATOR_DELETE_TIMEOUT_MS", "1500"),
            ("ANNOTATOR_LINE_TOLERANCE_PX", "4.5"),
        ]))
        .unwrap();
        assert_eq!(config.store.delete_timeout, Duration::from_millis(1500));
        assert_eq!(config.store.create_timeout, Duration::from_secs(8));
        assert_eq!(config.geometry.line_tolerance, 4.5);

        let err = Config::from_lookup(vars(&[("ANNOTATOR_LINE_TOLERANCE_PX", "wide")])).unwrap_err();
        assert!(err.to_string().contains("ANNOTATOR_LINE_TOLERANCE_PX"));

        let err = Config::from_lookup(vars(&[("ANNOTATOR_HIGHLIGHT_OPACITY", "1.5")])).unwrap_err();
        assert!(err.to_string().contains("ANNOTATOR_HIGHLIGHT_OPACITY"));
    }
}
