use std::collections::HashSet;

/// A single column of the portal's monthly table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonthlyEntry {
    pub month_label: String,
    pub raw_value: String,
    /// `None` when the cell was empty or could not be parsed.
    pub parsed_value: Option<f64>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("month '{0}' already present in series")]
pub struct DuplicateMonth(pub String);

/// Ordered monthly values, one entry per distinct month label.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MonthlySeries {
    entries: Vec<MonthlyEntry>,
    #[cfg_attr(feature = "serde", serde(skip))]
    labels: HashSet<String>,
}

impl MonthlySeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, rejecting a label that is already present.
    pub fn push(&mut self, entry: MonthlyEntry) -> Result<(), DuplicateMonth> {
        if !self.labels.insert(entry.month_label.clone()) {
            return Err(DuplicateMonth(entry.month_label));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[MonthlyEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&MonthlyEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of months carrying a reading.
    pub fn populated(&self) -> usize {
        self.entries.iter().filter(|e| e.parsed_value.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, value: Option<f64>) -> MonthlyEntry {
        MonthlyEntry {
            month_label: label.to_string(),
            raw_value: value.map(|v| v.to_string()).unwrap_or_default(),
            parsed_value: value,
        }
    }

    #[test]
    fn push_rejects_duplicate_labels() {
        let mut series = MonthlySeries::new();
        series.push(entry("Gennaio", Some(1.0))).unwrap();

        let err = series.push(entry("Gennaio", Some(2.0))).unwrap_err();
        assert_eq!(err, DuplicateMonth("Gennaio".to_string()));
        assert_eq!(series.len(), 1);
        assert_eq!(series.get(0).unwrap().parsed_value, Some(1.0));
    }

    #[test]
    fn populated_counts_only_parsed_values() {
        let mut series = MonthlySeries::new();
        series.push(entry("Gennaio", Some(0.0))).unwrap();
        series.push(entry("Febbraio", None)).unwrap();

        assert_eq!(series.populated(), 1);
        assert!(!series.is_empty());
    }
}
