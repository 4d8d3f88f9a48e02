use std::collections::BTreeMap;

pub const HOURS_PER_DAY: usize = 24;

/// Canonical slot label for an hour of the day, e.g. `7 -> "07:00"`.
pub fn hour_label(hour: usize) -> String {
    format!("{hour:02}:00")
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Hourly readings for one day as shown by the portal.
///
/// `date` keeps the source text; it is only turned into a calendar date at
/// ingestion time. `hours` always holds the 24 canonical slots.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "wire::DayReadingWire"))]
pub struct DayReading {
    pub date: String,
    pub hours: BTreeMap<String, Option<f64>>,
    pub total_kwh: f64,
}

impl DayReading {
    /// Builds a day from positional hourly values and derives `total_kwh`.
    pub fn from_hourly(date: impl Into<String>, values: [Option<f64>; HOURS_PER_DAY]) -> Self {
        let hours: BTreeMap<String, Option<f64>> = values
            .iter()
            .enumerate()
            .map(|(h, v)| (hour_label(h), *v))
            .collect();
        let total_kwh = round3(values.iter().flatten().sum());

        Self {
            date: date.into(),
            hours,
            total_kwh,
        }
    }

    /// Slots in hour order as `(hour, value)`.
    pub fn slots(&self) -> impl Iterator<Item = (u8, Option<f64>)> + '_ {
        (0..HOURS_PER_DAY).map(move |h| {
            let value = self.hours.get(&hour_label(h)).copied().flatten();
            (h as u8, value)
        })
    }

    /// Number of slots with a reading.
    pub fn populated(&self) -> usize {
        self.slots().filter(|(_, v)| v.is_some()).count()
    }
}

/// A month's worth of day readings produced by a single scrape run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DailyBatch {
    pub year: i32,
    pub month: Option<String>,
    pub days: Vec<DayReading>,
}

impl DailyBatch {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[cfg(feature = "serde")]
mod wire {
    use std::collections::BTreeMap;

    use super::{hour_label, DayReading, HOURS_PER_DAY};

    /// Incoming shape; `total_kwh` is recomputed from the hours.
    #[derive(serde::Deserialize)]
    pub(super) struct DayReadingWire {
        date: String,
        #[serde(default)]
        hours: BTreeMap<String, Option<f64>>,
        #[allow(dead_code)]
        #[serde(default)]
        total_kwh: Option<f64>,
    }

    impl TryFrom<DayReadingWire> for DayReading {
        type Error = String;

        fn try_from(w: DayReadingWire) -> Result<Self, Self::Error> {
            let mut values = [None; HOURS_PER_DAY];
            for (label, value) in &w.hours {
                let slot = (0..HOURS_PER_DAY)
                    .find(|h| &hour_label(*h) == label)
                    .ok_or_else(|| format!("unknown hour slot '{label}'"))?;
                values[slot] = *value;
            }
            Ok(DayReading::from_hourly(w.date, values))
        }
    }
}
