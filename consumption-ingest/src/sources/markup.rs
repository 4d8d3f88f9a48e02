//! Structural extraction from portal markup.
//!
//! The portal's HTML has no versioned contract, so each lookup is a small
//! matcher that can be exercised against fixture markup on its own, and the
//! hourly table is found through an ordered chain of such matchers.

use energy_client::domain::{DayReading, MonthlyEntry, MonthlySeries, HOURS_PER_DAY};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::transform::{parse_hour_label, parse_locale_number};

static TABLE: Lazy<Selector> = Lazy::new(|| css("table"));
static TR: Lazy<Selector> = Lazy::new(|| css("tr"));
static TH: Lazy<Selector> = Lazy::new(|| css("th"));
static TD: Lazy<Selector> = Lazy::new(|| css("td"));
static CELL: Lazy<Selector> = Lazy::new(|| css("td, th"));
static LINK: Lazy<Selector> = Lazy::new(|| css("a"));
static CELL_LINK: Lazy<Selector> = Lazy::new(|| css("td a"));
static WITH_ID: Lazy<Selector> = Lazy::new(|| css("[id]"));

fn css(s: &'static str) -> Selector {
    Selector::parse(s).unwrap_or_else(|e| panic!("static selector '{s}' is invalid: {e}"))
}

/// Whitespace-collapsed text content of an element.
fn text_of(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Monthly grid plus where each month's link sits among the grid's `td a`
/// elements, which is what a browser-side click has to target.
#[derive(Debug, Clone, Default)]
pub struct MonthlyGrid {
    pub series: MonthlySeries,
    link_positions: Vec<Option<usize>>,
}

impl MonthlyGrid {
    pub fn link_position(&self, series_index: usize) -> Option<usize> {
        self.link_positions.get(series_index).copied().flatten()
    }
}

/// Reads month labels from the header row and values from the first data row.
///
/// Header and value cells are aligned from the right so a leading corner
/// header is ignored; a row label is expected as a `th` in the data row.
pub fn parse_monthly_grid(html: &str) -> MonthlyGrid {
    let doc = Html::parse_fragment(html);

    let headers: Vec<String> = doc
        .select(&TR)
        .find(|tr| tr.select(&TH).next().is_some())
        .map(|tr| tr.select(&TH).map(text_of).collect())
        .unwrap_or_default();

    let rows: Vec<ElementRef<'_>> = doc.select(&TR).filter(|tr| tr.select(&TD).next().is_some()).collect();
    let data_row = rows
        .iter()
        .find(|tr| tr.select(&LINK).next().is_some())
        .or_else(|| rows.first());

    let mut grid = MonthlyGrid::default();
    let Some(row) = data_row else {
        return grid;
    };

    let all_links: Vec<_> = doc.select(&CELL_LINK).map(|a| a.id()).collect();
    let cells: Vec<ElementRef<'_>> = row.select(&TD).collect();
    let pairs = headers.len().min(cells.len());
    let header_skip = headers.len() - pairs;
    let cell_skip = cells.len() - pairs;

    for (label, cell) in headers[header_skip..].iter().zip(&cells[cell_skip..]) {
        if label.is_empty() {
            continue;
        }

        let link = cell.select(&LINK).next();
        let raw_value = link.map(text_of).unwrap_or_else(|| text_of(*cell));
        let entry = MonthlyEntry {
            month_label: label.clone(),
            parsed_value: parse_locale_number(&raw_value),
            raw_value,
        };

        match grid.series.push(entry) {
            Ok(()) => {
                let position = link.and_then(|a| all_links.iter().position(|id| *id == a.id()));
                grid.link_positions.push(position);
            }
            Err(e) => tracing::warn!(error = %e, "dropping duplicate month column"),
        }
    }

    grid
}

/// One strategy for finding the hourly table in a page.
pub trait TableMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn locate<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>>;
}

/// Table carrying a known id, or the first table inside an element with it.
pub struct IdMatcher {
    id: String,
}

impl IdMatcher {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl TableMatcher for IdMatcher {
    fn name(&self) -> &'static str {
        "id"
    }

    fn locate<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        let el = doc.select(&WITH_ID).find(|el| el.value().id() == Some(self.id.as_str()))?;
        if el.value().name() == "table" {
            Some(el)
        } else {
            el.select(&TABLE).next()
        }
    }
}

/// First table with a row wide enough to hold every hourly slot.
pub struct ColumnCountMatcher {
    min_columns: usize,
}

impl ColumnCountMatcher {
    pub fn new(min_columns: usize) -> Self {
        Self { min_columns }
    }
}

impl TableMatcher for ColumnCountMatcher {
    fn name(&self) -> &'static str {
        "column-count"
    }

    fn locate<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        doc.select(&TABLE).find(|table| {
            table
                .select(&TR)
                .map(|tr| tr.select(&CELL).count())
                .max()
                .is_some_and(|n| n >= self.min_columns)
        })
    }
}

pub fn hourly_matchers(table_id: Option<&str>) -> Vec<Box<dyn TableMatcher>> {
    let mut chain: Vec<Box<dyn TableMatcher>> = Vec::with_capacity(2);
    if let Some(id) = table_id {
        chain.push(Box::new(IdMatcher::new(id)));
    }
    chain.push(Box::new(ColumnCountMatcher::new(HOURS_PER_DAY)));
    chain
}

/// Runs the matchers in order and parses the first table found.
///
/// `None` means no matcher recognised a table; an empty vector means a table
/// was found but held no day rows.
pub fn extract_hourly_days(html: &str, matchers: &[Box<dyn TableMatcher>]) -> Option<Vec<DayReading>> {
    let doc = Html::parse_document(html);
    let (name, table) = matchers.iter().find_map(|m| m.locate(&doc).map(|t| (m.name(), t)))?;
    tracing::debug!(matcher = name, "hourly table located");
    Some(parse_hourly_rows(table))
}

/// Column index -> hour, from the header when it names all 24 slots,
/// otherwise columns 1..=24 in order.
fn hour_columns(table: ElementRef<'_>) -> Vec<(usize, usize)> {
    let from_header: Vec<(usize, usize)> = table
        .select(&TR)
        .find(|tr| tr.select(&TH).next().is_some())
        .map(|tr| {
            tr.select(&CELL)
                .enumerate()
                .filter_map(|(col, cell)| parse_hour_label(&text_of(cell)).map(|h| (col, h as usize)))
                .collect()
        })
        .unwrap_or_default();

    if from_header.len() == HOURS_PER_DAY {
        from_header
    } else {
        (0..HOURS_PER_DAY).map(|h| (h + 1, h)).collect()
    }
}

fn parse_hourly_rows(table: ElementRef<'_>) -> Vec<DayReading> {
    let columns = hour_columns(table);
    let mut days = Vec::new();

    // Header rows carry no `td`; data rows may label the day with a `th`.
    for tr in table.select(&TR).filter(|tr| tr.select(&TD).next().is_some()) {
        let cells: Vec<String> = tr.select(&CELL).map(text_of).collect();
        let Some(date) = cells.first() else {
            continue;
        };
        // Blank and "Totale"-style rows carry no day.
        if !date.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }

        let mut values = [None; HOURS_PER_DAY];
        for (col, hour) in &columns {
            values[*hour] = cells.get(*col).and_then(|raw| parse_locale_number(raw));
        }
        days.push(DayReading::from_hourly(date.clone(), values));
    }

    days
}

/// Whether the login form is still rendered in `html`.
pub fn login_form_present(html: &str, form: &Selector) -> bool {
    Html::parse_document(html).select(form).next().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly_row(date: &str, value: &str) -> String {
        let cells: String = (0..24).map(|_| format!("<td>{value}</td>")).collect();
        format!("<tr><td>{date}</td>{cells}</tr>")
    }

    #[test]
    fn monthly_grid_pairs_headers_with_links() {
        let html = r##"
            <table id="grid">
              <tr><th>Anno</th><th>Gennaio</th><th>Febbraio</th></tr>
              <tr><th>2025</th><td><a href="#">1.500,00</a></td><td></td></tr>
            </table>"##;

        let grid = parse_monthly_grid(html);
        let entries = grid.series.entries();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].month_label, "Gennaio");
        assert_eq!(entries[0].raw_value, "1.500,00");
        assert_eq!(entries[0].parsed_value, Some(1500.0));
        assert_eq!(entries[1].month_label, "Febbraio");
        assert_eq!(entries[1].parsed_value, None);
        assert_eq!(grid.link_position(0), Some(0));
        assert_eq!(grid.link_position(1), None);
    }

    #[test]
    fn monthly_grid_link_positions_skip_empty_cells() {
        let html = r#"
            <table>
              <tr><th>Gen</th><th>Feb</th><th>Mar</th></tr>
              <tr><td><a>1,0</a></td><td></td><td><a>3,0</a></td></tr>
            </table>"#;

        let grid = parse_monthly_grid(html);
        assert_eq!(grid.link_position(2), Some(1));
    }

    #[test]
    fn monthly_grid_drops_duplicate_labels() {
        let html = r#"
            <table>
              <tr><th>Gen</th><th>Gen</th></tr>
              <tr><td><a>1,0</a></td><td><a>2,0</a></td></tr>
            </table>"#;

        let grid = parse_monthly_grid(html);
        assert_eq!(grid.series.len(), 1);
        assert_eq!(grid.series.entries()[0].parsed_value, Some(1.0));
    }

    #[test]
    fn monthly_grid_without_rows_is_empty() {
        assert!(parse_monthly_grid("<div>loading</div>").series.is_empty());
    }

    #[test]
    fn id_matcher_finds_table_or_wrapped_table() {
        let doc = Html::parse_document(r#"<div id="curve"><table class="x"><tr><td>1</td></tr></table></div>"#);
        let table = IdMatcher::new("curve").locate(&doc).unwrap();
        assert_eq!(table.value().name(), "table");

        let doc = Html::parse_document(r#"<table id="hours"><tr><td>1</td></tr></table>"#);
        assert!(IdMatcher::new("hours").locate(&doc).is_some());
        assert!(IdMatcher::new("missing").locate(&doc).is_none());
    }

    #[test]
    fn column_count_matcher_requires_24_columns() {
        let narrow = "<table><tr><td>a</td><td>b</td></tr></table>";
        let wide = format!("<table>{}</table>", hourly_row("01/01/2025", "1"));

        let m = ColumnCountMatcher::new(HOURS_PER_DAY);
        assert!(m.locate(&Html::parse_document(narrow)).is_none());
        assert!(m.locate(&Html::parse_document(&format!("{narrow}{wide}"))).is_some());
    }

    #[test]
    fn extract_hourly_days_uses_chain_order() {
        let html = format!(
            r#"<table id="other">{}</table><table id="hours">{}</table>"#,
            hourly_row("01/01/2025", "9,00"),
            hourly_row("02/01/2025", "1,00"),
        );

        let days = extract_hourly_days(&html, &hourly_matchers(Some("hours"))).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, "02/01/2025");

        let days = extract_hourly_days(&html, &hourly_matchers(None)).unwrap();
        assert_eq!(days[0].date, "01/01/2025");
    }

    #[test]
    fn extract_hourly_days_none_without_table() {
        let html = "<table><tr><td>01/01/2025</td><td>1</td></tr></table>";
        assert!(extract_hourly_days(html, &hourly_matchers(Some("hours"))).is_none());
    }

    #[test]
    fn hourly_rows_parse_values_and_skip_non_day_rows() {
        let html = format!(
            "<table><tr><th>Data</th></tr>{}<tr><td>Totale</td><td>24</td></tr>{}</table>",
            hourly_row("01/01/2025", "1,00"),
            hourly_row("02/01/2025", ""),
        );

        let days = extract_hourly_days(&html, &hourly_matchers(None)).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].total_kwh, 24.0);
        assert!(days[0].slots().all(|(_, v)| v == Some(1.0)));
        assert_eq!(days[1].populated(), 0);
        assert_eq!(days[1].hours.len(), HOURS_PER_DAY);
    }

    #[test]
    fn hourly_rows_follow_header_hour_order() {
        let header: String = (0..24).rev().map(|h| format!("<th>{h:02}:00</th>")).collect();
        let cells: String = (0..24).rev().map(|h| format!("<td>{h}</td>")).collect();
        let html = format!("<table><tr><th>Data</th>{header}</tr><tr><td>01/01/2025</td>{cells}</tr></table>");

        let days = extract_hourly_days(&html, &hourly_matchers(None)).unwrap();
        assert_eq!(days[0].hours.get("05:00"), Some(&Some(5.0)));
        assert_eq!(days[0].hours.get("23:00"), Some(&Some(23.0)));
    }

    #[test]
    fn hourly_rows_accept_th_date_label() {
        let header: String = (0..24).map(|h| format!("<th>{h:02}:00</th>")).collect();
        let cells: String = (0..24).map(|_| "<td>1,00</td>").collect();
        let html = format!(
            r#"<table id="tabellaConsumiOrari"><tr><th>Data</th>{header}</tr><tr><th>01/01/2025</th>{cells}</tr></table>"#
        );

        let days = extract_hourly_days(&html, &hourly_matchers(Some("tabellaConsumiOrari"))).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, "01/01/2025");
        assert_eq!(days[0].populated(), HOURS_PER_DAY);
        assert_eq!(days[0].total_kwh, 24.0);
    }

    #[test]
    fn hourly_rows_accept_th_date_without_header() {
        let cells: String = (0..24).map(|_| "<td>2,50</td>").collect();
        let html = format!("<table><tr><th>02/01/2025</th>{cells}</tr></table>");

        let days = extract_hourly_days(&html, &hourly_matchers(None)).unwrap();
        assert_eq!(days[0].date, "02/01/2025");
        assert_eq!(days[0].total_kwh, 60.0);
    }

    #[test]
    fn login_form_is_detected() {
        let form = Selector::parse("form#login").unwrap();
        assert!(login_form_present(r#"<form id="login"><input></form>"#, &form));
        assert!(!login_form_present("<main>dashboard</main>", &form));
    }
}
