// Report writer producing one pretty-printed JSON document per report
use crate::application::report_writer::{ReportArtifact, ReportWriter};
use crate::domain::evaluation::ReportResult;
use crate::domain::report_config::ReportConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ReportDocument<'a> {
    report_id: &'a str,
    generated_at: DateTime<Utc>,
    config: &'a ReportConfig,
    result: &'a ReportResult,
}

pub struct JsonReportWriter {
    output_dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl ReportWriter for JsonReportWriter {
    async fn write(&self, report_id: &str, config: &ReportConfig, result: &ReportResult) -> Result<ReportArtifact> {
        let generated_at = Utc::now();
        let document = ReportDocument {
            report_id,
            generated_at,
            config,
            result,
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("{}.json", report_id));
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("Wrote report {} to {}", report_id, path.display());

        Ok(ReportArtifact {
            report_id: report_id.to_string(),
            location: path.display().to_string(),
            generated_at,
        })
    }
}
