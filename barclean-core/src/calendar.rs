//! Calendar service: instrument profiles keyed by identifier.
//!
//! A [`ProfileRegistry`] is loaded once (from TOML or the embedded built-in
//! table) and then shared read-only. Lookups are tagged so a caller can tell
//! "configured" apart from "not configured" without an error path.
//!
//! ```toml
//! [[instrument]]
//! id = "deuidxeur"
//! name = "DAX Index"
//! timezone = "Europe/Berlin"
//! session_open = "09:00"
//! session_close = "17:30"
//! asset_class = "session_bound"
//! holidays = ["2024-12-24", "2024-12-25"]
//! ```

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::{AssetClass, InstrumentProfile};

const BUILTIN: &str = include_str!("../profiles/builtin.toml");

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("failed to read profile file {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid profile document: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("instrument '{instrument}': unknown timezone '{timezone}'")]
    UnknownTimezone { instrument: String, timezone: String },

    #[error("instrument '{instrument}': invalid time '{value}' (expected HH:MM or HH:MM:SS)")]
    InvalidTime { instrument: String, value: String },

    #[error("instrument '{instrument}': session-bound profile needs session_open and session_close")]
    MissingSession { instrument: String },

    #[error("instrument '{instrument}': session opens after it closes")]
    InvertedSession { instrument: String },

    #[error("instrument '{0}' is defined twice")]
    Duplicate(String),
}

/// Result of a profile lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfileLookup<'a> {
    Found(&'a InstrumentProfile),
    NotConfigured,
}

impl<'a> ProfileLookup<'a> {
    pub fn profile(&self) -> Option<&'a InstrumentProfile> {
        match self {
            ProfileLookup::Found(p) => Some(p),
            ProfileLookup::NotConfigured => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    instrument: Vec<ProfileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    timezone: String,
    #[serde(default)]
    session_open: Option<String>,
    #[serde(default)]
    session_close: Option<String>,
    asset_class: AssetClass,
    #[serde(default)]
    holidays: Vec<NaiveDate>,
}

/// Immutable set of instrument profiles. Identifiers are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, InstrumentProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The embedded registry of indices, FX majors, metals, oil and crypto.
    pub fn builtin() -> Result<Self, CalendarError> {
        Self::from_toml_str(BUILTIN)
    }

    pub fn load(path: &Path) -> Result<Self, CalendarError> {
        let text = std::fs::read_to_string(path).map_err(|e| CalendarError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CalendarError> {
        let file: RegistryFile = toml::from_str(text)?;
        let mut registry = Self::new();
        for entry in file.instrument {
            let profile = entry.into_profile()?;
            if registry.profiles.contains_key(&profile.id) {
                return Err(CalendarError::Duplicate(profile.id));
            }
            registry.profiles.insert(profile.id.clone(), profile);
        }
        Ok(registry)
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, mut profile: InstrumentProfile) {
        profile.id = profile.id.to_ascii_lowercase();
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn lookup(&self, id: &str) -> ProfileLookup<'_> {
        match self.profiles.get(&id.to_ascii_lowercase()) {
            Some(p) => ProfileLookup::Found(p),
            None => ProfileLookup::NotConfigured,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &InstrumentProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl ProfileEntry {
    fn into_profile(self) -> Result<InstrumentProfile, CalendarError> {
        let id = self.id.trim().to_ascii_lowercase();
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| CalendarError::UnknownTimezone {
                instrument: id.clone(),
                timezone: self.timezone.clone(),
            })?;

        let (session_open, session_close) = match (self.session_open, self.session_close) {
            (Some(open), Some(close)) => (parse_time(&id, &open)?, parse_time(&id, &close)?),
            (None, None) if self.asset_class == AssetClass::Continuous => {
                (NaiveTime::MIN, NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN))
            }
            _ => return Err(CalendarError::MissingSession { instrument: id }),
        };
        if session_open > session_close {
            return Err(CalendarError::InvertedSession { instrument: id });
        }

        Ok(InstrumentProfile {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            timezone,
            session_open,
            session_close,
            asset_class: self.asset_class,
            holidays: self.holidays.into_iter().collect(),
        })
    }
}

fn parse_time(instrument: &str, value: &str) -> Result<NaiveTime, CalendarError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| CalendarError::InvalidTime {
            instrument: instrument.to_string(),
            value: value.to_string(),
        })
}
