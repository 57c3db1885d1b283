use std::collections::TryReserveError;
use std::fmt;

use thiserror::Error;

use crate::session::SessionState;

/// Which node of the site/partition/CRTC tree a backend failed to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Site(Option<String>),
    Partition { site: usize, partition: usize },
    Crtc { site: usize, partition: usize, crtc: usize },
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Site(Some(name)) => write!(f, "site `{name}'"),
            Resource::Site(None) => write!(f, "default site"),
            Resource::Partition { site, partition } => {
                write!(f, "partition {partition} of site {site}")
            }
            Resource::Crtc {
                site,
                partition,
                crtc,
            } => write!(f, "CRTC {crtc} of partition {partition} of site {site}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GammaError {
    #[error("{} {index} does not exist. {}", capitalize(.noun), range_hint(.noun, .available))]
    InvalidPartitionIndex {
        noun: &'static str,
        index: usize,
        available: usize,
    },

    #[error("CRTC {index} does not exist. {}", range_hint(&"CRTC", .available))]
    InvalidCrtcIndex { index: usize, available: usize },

    #[error("Failed to open {resource}: {source:#}")]
    BackendOpenFailed {
        resource: Resource,
        #[source]
        source: anyhow::Error,
    },

    #[error("Gamma ramp size too small: {size}")]
    RampSizeTooSmall { size: usize },

    #[error("Failed to allocate gamma ramps: {0}")]
    AllocationFailed(#[from] TryReserveError),

    #[error("Failed to set gamma ramps on CRTC {crtc} (site {site}, partition {partition}): {source}")]
    SetRamps {
        site: usize,
        partition: usize,
        crtc: usize,
        #[source]
        source: SetRampsError,
    },

    #[error("Cannot {operation} a session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("{name} must be `all' or a non-negative integer, got `{value}'")]
    MalformedSelector { name: &'static str, value: String },

    #[error("Malformed gamma setting `{0}'")]
    MalformedGamma(String),

    #[error("Unknown adjustment method `{0}'")]
    UnknownMethod(String),

    #[error("No more methods to try")]
    NoMethodAvailable,
}

/// Failure kinds a backend reports when writing ramps.
#[derive(Debug, Error)]
pub enum SetRampsError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("device busy")]
    Busy,

    #[error("device removed")]
    DeviceRemoved,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SetRampsError {
    /// Failures that are expected to clear up by the next update.
    pub fn is_transient(&self) -> bool {
        matches!(self, SetRampsError::PermissionDenied | SetRampsError::Busy)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SettingError {
    #[error("Temperature must be between {min}K and {max}K, got {value}K")]
    Temperature { value: u32, min: u32, max: u32 },

    #[error("Brightness must be between {min:.1} and {max:.1}, got {value}")]
    Brightness { value: f32, min: f32, max: f32 },

    #[error("Gamma value must be between {min:.1} and {max:.1}, got {value}")]
    Gamma { value: f32, min: f32, max: f32 },
}

fn capitalize(noun: &str) -> String {
    let mut chars = noun.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn plural(noun: &str) -> String {
    format!("{noun}s")
}

fn range_hint(noun: &str, available: &usize) -> String {
    match *available {
        0 => format!("No {} exist.", plural(noun)),
        1 => format!("Only {noun} 0 exists."),
        n => format!("Valid {} are [0-{}].", plural(noun), n - 1),
    }
}
