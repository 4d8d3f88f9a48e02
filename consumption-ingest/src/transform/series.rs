use energy_client::domain::MonthlySeries;

/// The month whose daily breakdown is requested next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrillDownMonth {
    pub label: String,
    /// Position within the series.
    pub index: usize,
}

/// Most recent month that carries a reading.
///
/// Trailing months may still be empty while older ones are populated, so the
/// scan walks backwards and skips `None` values. `Some(0.0)` is a reading.
pub fn select_latest(series: &MonthlySeries) -> Option<DrillDownMonth> {
    series
        .entries()
        .iter()
        .enumerate()
        .rev()
        .find(|(_, e)| e.parsed_value.is_some())
        .map(|(index, e)| DrillDownMonth {
            label: e.month_label.clone(),
            index,
        })
}
