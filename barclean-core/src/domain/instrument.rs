use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whether an instrument quotes around the clock or within a local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// Exchange-traded with a local session window (indices, equities).
    SessionBound,
    /// 24-hour markets (FX, spot metals, crypto).
    Continuous,
}

/// Immutable reference data for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentProfile {
    pub id: String,
    pub name: String,
    pub timezone: Tz,
    pub session_open: NaiveTime,
    pub session_close: NaiveTime,
    pub asset_class: AssetClass,
    pub holidays: BTreeSet<NaiveDate>,
}

impl InstrumentProfile {
    /// Effective `[open, close]` window, inclusive on both ends.
    ///
    /// Continuous instruments use `[00:00, 23:59]` regardless of configured hours.
    pub fn session_bounds(&self) -> (NaiveTime, NaiveTime) {
        match self.asset_class {
            AssetClass::SessionBound => (self.session_open, self.session_close),
            AssetClass::Continuous => (
                NaiveTime::MIN,
                NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
            ),
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Returns true if a local reading is a trading weekday, not a holiday,
    /// and within the session window.
    pub fn in_session(&self, local: &DateTime<Tz>) -> bool {
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        if self.is_holiday(local.date_naive()) {
            return false;
        }
        let (open, close) = self.session_bounds();
        let time = local.time();
        time >= open && time <= close
    }
}
