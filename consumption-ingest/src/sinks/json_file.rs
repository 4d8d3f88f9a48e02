use std::path::{Path, PathBuf};

use energy_client::domain::DailyBatch;

/// Writes each scraped batch as a pretty-printed JSON document.
///
/// Shape: `{year, month, days: [{date, hours: {"00:00": kwh|null, ..}, total_kwh}]}`.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, batch: &DailyBatch) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(batch)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;

        tracing::info!(path = %self.path.display(), days = batch.days.len(), "batch written to output file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::domain::{DayReading, HOURS_PER_DAY};

    #[tokio::test]
    async fn writes_documented_shape() {
        let dir = std::env::temp_dir().join(format!("consumption-ingest-{}", std::process::id()));
        let sink = JsonFileSink::new(dir.join("nested").join("batch.json"));

        let mut values = [Some(1.0); HOURS_PER_DAY];
        values[23] = None;
        let batch = DailyBatch {
            year: 2025,
            month: Some("Gennaio".to_string()),
            days: vec![DayReading::from_hourly("01/01/2025", values)],
        };
        sink.write(&batch).await.unwrap();

        let raw = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["year"], 2025);
        assert_eq!(doc["month"], "Gennaio");
        assert_eq!(doc["days"][0]["date"], "01/01/2025");
        assert_eq!(doc["days"][0]["hours"]["00:00"], 1.0);
        assert!(doc["days"][0]["hours"]["23:00"].is_null());
        assert_eq!(doc["days"][0]["total_kwh"], 23.0);

        let back: DailyBatch = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, batch);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
