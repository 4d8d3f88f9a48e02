use std::{path::PathBuf, pin::Pin, time::SystemTime};

use async_stream::try_stream;
use energy_client::domain::DailyBatch;
use futures::Stream;
use tokio::{fs::File, io::AsyncReadExt};

use crate::pipeline::{Envelope, PipelineError};

/// Replays batches previously written by the JSON output sink.
///
/// The file may hold a single (pretty-printed) document or several
/// documents back to back, one per line.
pub struct BatchFileSource {
    path: PathBuf,
}

impl BatchFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn stream(&self) -> Pin<Box<dyn Stream<Item = Result<Envelope<DailyBatch>, PipelineError>> + Send>> {
        let path = self.path.clone();
        let s = try_stream! {
            let mut file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open batch file {}: {e}", path.display()))
            })?;
            let mut contents = String::new();
            file.read_to_string(&mut contents).await.map_err(|e| {
                PipelineError::Source(format!("failed to read batch file: {e}"))
            })?;

            let docs: Vec<Result<DailyBatch, serde_json::Error>> =
                serde_json::Deserializer::from_str(&contents).into_iter::<DailyBatch>().collect();
            for (idx, doc) in docs.into_iter().enumerate() {
                let batch = match doc {
                    Ok(b) => b,
                    Err(e) => {
                        metrics::counter!("batch_file_parse_errors_total").increment(1);
                        Err(PipelineError::Source(format!("invalid batch document #{idx}: {e}")))?
                    }
                };
                yield Envelope {
                    payload: batch,
                    received_at: SystemTime::now(),
                };
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(contents: &str, name: &str) -> Vec<Result<Envelope<DailyBatch>, PipelineError>> {
        let path = std::env::temp_dir().join(format!("{name}-{}.json", std::process::id()));
        tokio::fs::write(&path, contents).await.unwrap();
        let items = BatchFileSource::new(&path).stream().collect::<Vec<_>>().await;
        let _ = tokio::fs::remove_file(&path).await;
        items
    }

    #[tokio::test]
    async fn reads_single_pretty_document() {
        let doc = r#"{
            "year": 2025,
            "month": "Gennaio",
            "days": [{"date": "01/01/2025", "hours": {"00:00": 1.0}, "total_kwh": 1.0}]
        }"#;

        let items = collect(doc, "single-batch").await;
        assert_eq!(items.len(), 1);
        let batch = &items[0].as_ref().unwrap().payload;
        assert_eq!(batch.month.as_deref(), Some("Gennaio"));
        assert_eq!(batch.days[0].hours.len(), 24);
    }

    #[tokio::test]
    async fn reads_ndjson_and_stops_at_first_bad_line() {
        let contents = concat!(
            r#"{"year":2025,"month":null,"days":[]}"#,
            "\n",
            r#"{"year":2024,"month":"Dicembre","days":[]}"#,
            "\n",
            "not json\n",
        );

        let items = collect(contents, "ndjson-batch").await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].as_ref().unwrap().payload.year, 2024);
        assert!(matches!(items[2], Err(PipelineError::Source(_))));
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let items = BatchFileSource::new("/nonexistent/batches.json").stream().collect::<Vec<_>>().await;
        assert!(matches!(items.as_slice(), [Err(PipelineError::Source(_))]));
    }
}
