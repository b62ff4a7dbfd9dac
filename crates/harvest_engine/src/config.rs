use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use harvest_core::SessionLimits;
use serde::{Deserialize, Serialize};

type DelayFn = dyn Fn(u32) -> Result<Duration, String> + Send + Sync;

/// Politeness pause between successive fetches of one session.
#[derive(Clone, Default)]
pub enum DelayPolicy {
    #[default]
    None,
    Fixed(Duration),
    /// Called with the ordinal about to be fetched. An `Err` is logged and the
    /// fetch goes ahead without pausing.
    Custom(Arc<DelayFn>),
}

impl DelayPolicy {
    pub fn custom(f: impl Fn(u32) -> Result<Duration, String> + Send + Sync + 'static) -> Self {
        DelayPolicy::Custom(Arc::new(f))
    }

    pub fn duration_before(&self, ordinal: u32) -> Result<Duration, String> {
        match self {
            DelayPolicy::None => Ok(Duration::ZERO),
            DelayPolicy::Fixed(duration) => Ok(*duration),
            DelayPolicy::Custom(f) => f(ordinal),
        }
    }
}

impl fmt::Debug for DelayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayPolicy::None => write!(f, "None"),
            DelayPolicy::Fixed(duration) => f.debug_tuple("Fixed").field(duration).finish(),
            DelayPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Everything a harvester needs besides its fetcher and extractor.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub limits: SessionLimits,
    pub delay: DelayPolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            limits: SessionLimits::default(),
            delay: DelayPolicy::Fixed(Duration::from_millis(500)),
        }
    }
}

impl HarvestConfig {
    pub fn from_settings(settings: &HarvestSettings) -> Self {
        let delay = match settings.delay_ms {
            0 => DelayPolicy::None,
            ms => DelayPolicy::Fixed(Duration::from_millis(ms)),
        };
        Self {
            limits: SessionLimits {
                max_pages: settings.max_pages,
                empty_page_threshold: settings.empty_page_threshold,
                detect_stall: settings.detect_stall,
                max_items: settings.max_items,
            },
            delay,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid harvest settings: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Flat, serializable form of [`HarvestConfig`] for orchestrator payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestSettings {
    pub max_pages: Option<u32>,
    pub empty_page_threshold: u32,
    pub detect_stall: bool,
    pub max_items: Option<usize>,
    pub delay_ms: u64,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            max_pages: None,
            empty_page_threshold: 1,
            detect_stall: true,
            max_items: None,
            delay_ms: 500,
        }
    }
}

impl HarvestSettings {
    pub fn from_json_str(input: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(input)?)
    }
}
