//! Flagged-date calendar: dates (typically major economic releases) whose
//! candles a caller may ask to drop.
//!
//! Loaded from a CSV with a required `date` column and an optional
//! `instrument` column. Rows without an instrument apply to every instrument.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use super::source::DataError;
use crate::domain::CandleSeries;

#[derive(Debug, Deserialize)]
struct FlaggedRow {
    date: String,
    #[serde(default)]
    instrument: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlaggedDates {
    global: BTreeSet<NaiveDate>,
    per_instrument: HashMap<String, BTreeSet<NaiveDate>>,
}

impl FlaggedDates {
    pub fn new() -> Self {
        Self::default()
    }

    /// A calendar whose dates apply to every instrument.
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            global: dates.into_iter().collect(),
            per_instrument: HashMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, DataError> {
        let file = std::fs::File::open(path)
            .map_err(|e| DataError::Io(format!("open {}: {e}", path.display())))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut dates = Self::new();
        for (i, row) in rdr.deserialize::<FlaggedRow>().enumerate() {
            let row = row?;
            let date = parse_date(&row.date)
                .ok_or_else(|| DataError::Csv(format!("row {}: invalid date '{}'", i + 1, row.date)))?;
            dates.insert(date, row.instrument.as_deref().filter(|s| !s.is_empty()));
        }
        Ok(dates)
    }

    pub fn insert(&mut self, date: NaiveDate, instrument: Option<&str>) {
        match instrument {
            None => {
                self.global.insert(date);
            }
            Some(id) => {
                self.per_instrument
                    .entry(id.to_ascii_lowercase())
                    .or_default()
                    .insert(date);
            }
        }
    }

    pub fn is_flagged(&self, instrument: &str, date: NaiveDate) -> bool {
        self.global.contains(&date)
            || self
                .per_instrument
                .get(&instrument.to_ascii_lowercase())
                .is_some_and(|set| set.contains(&date))
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.per_instrument.values().map(BTreeSet::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop candles whose local calendar date is flagged for `instrument`.
    /// Naive series are judged on their raw reading. Returns the kept series
    /// and the number of candles removed.
    pub fn exclude(
        &self,
        series: CandleSeries,
        instrument: &str,
    ) -> Result<(CandleSeries, usize), DataError> {
        let dates: Vec<NaiveDate> = match series.local_times() {
            Some(local) => local.iter().map(|t| t.date_naive()).collect(),
            None => series.candles().iter().map(|c| c.timestamp.date()).collect(),
        };
        let keep: Vec<bool> = dates
            .iter()
            .map(|d| !self.is_flagged(instrument, *d))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        Ok((series.retain_mask(&keep)?, removed))
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Candle, TimeBasis};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn loads_global_and_per_instrument_rows() {
        let csv = "date,instrument\n2024-03-08,\n2024-03-20,eurusd\n2024-05-02 00:00:00,\n";
        let flagged = FlaggedDates::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(flagged.len(), 3);
        assert!(flagged.is_flagged("deuidxeur", date(2024, 3, 8)));
        assert!(flagged.is_flagged("EURUSD", date(2024, 3, 20)));
        assert!(!flagged.is_flagged("gbpusd", date(2024, 3, 20)));
        assert!(flagged.is_flagged("gbpusd", date(2024, 5, 2)));
    }

    #[test]
    fn date_only_csv_is_accepted() {
        let flagged = FlaggedDates::from_reader("date\n2024-01-05\n".as_bytes()).unwrap();
        assert!(flagged.is_flagged("anything", date(2024, 1, 5)));
    }

    #[test]
    fn bad_date_is_an_error() {
        let err = FlaggedDates::from_reader("date\nlast friday\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::Csv(_)));
    }

    #[test]
    fn exclude_uses_local_date() {
        // 23:30 UTC on the 7th is already the 8th in Berlin.
        let late = date(2024, 3, 7).and_hms_opt(23, 30, 0).unwrap();
        let early = date(2024, 3, 7).and_hms_opt(10, 0, 0).unwrap();
        let series = CandleSeries::new(
            TimeBasis::Zoned(chrono_tz::Europe::Berlin),
            vec![
                Candle::new(early, 1.0, 1.0, 1.0, 1.0, 1.0),
                Candle::new(late, 1.0, 1.0, 1.0, 1.0, 1.0),
            ],
        );
        let flagged = FlaggedDates::from_dates([date(2024, 3, 8)]);
        let (kept, removed) = flagged.exclude(series, "deuidxeur").unwrap();
        assert_eq!(removed, 1);
        assert_eq!(kept.first_timestamp(), Some(early));
    }
}
