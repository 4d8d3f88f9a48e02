pub mod normalize;
pub mod series;

pub use normalize::{parse_hour_label, parse_locale_number, parse_source_date, DateParseError};
pub use series::{select_latest, DrillDownMonth};
