//! Report generation - run the queries, render, upload both artifacts

use crate::analytics::html::render_report;
use crate::analytics::{run_queries, ReportQueries, ReportResults, QUERY_NAMES};
use crate::config::Config;
use crate::error::ReportError;
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Where reports go and how they are labelled
#[derive(Debug, Clone)]
pub struct ReportTarget {
    pub project_id: String,
    pub dataset_id: String,
    pub reports_bucket: String,
    pub public_base_url: String,
}

impl From<&Config> for ReportTarget {
    fn from(config: &Config) -> Self {
        Self {
            project_id: config.project_id.clone(),
            dataset_id: config.dataset_id.clone(),
            reports_bucket: config.reports_bucket.clone(),
            public_base_url: config.public_base_url.clone(),
        }
    }
}

/// Success body returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportOutcome {
    pub status: &'static str,
    pub timestamp: String,
    pub html_report: String,
    pub json_report: String,
    pub queries_executed: usize,
    pub public_html_url: String,
}

/// Structured data artifact
#[derive(Serialize)]
struct ReportDocument<'a> {
    generated_at: &'a str,
    project_id: &'a str,
    dataset_id: &'a str,
    total_queries: usize,
    results: &'a ReportResults,
}

pub fn html_key(timestamp: &str) -> String {
    format!("reports/analytics_report_{}.html", timestamp)
}

pub fn json_key(timestamp: &str) -> String {
    format!("reports/analytics_data_{}.json", timestamp)
}

pub async fn generate_report<Q: ReportQueries, S: ObjectStore>(
    queries: &Q,
    store: &S,
    target: &ReportTarget,
) -> Result<ReportOutcome, ReportError> {
    generate_report_at(queries, store, target, Utc::now()).await
}

/// Query failures end up inside the report; only rendering and upload
/// errors fail the run
pub async fn generate_report_at<Q: ReportQueries, S: ObjectStore>(
    queries: &Q,
    store: &S,
    target: &ReportTarget,
    now: DateTime<Utc>,
) -> Result<ReportOutcome, ReportError> {
    info!(
        "Generating report for {}/{} into {}",
        target.project_id, target.dataset_id, target.reports_bucket
    );

    let results = run_queries(queries).await;
    let failed = results.failed();
    if !failed.is_empty() {
        warn!("Report continues without: {}", failed.join(", "));
    }

    let timestamp = now.format("%Y%m%d_%H%M%S").to_string();
    let bucket = &target.reports_bucket;

    let html = render_report(&results, now)?;
    let html_key = html_key(&timestamp);
    store.put(bucket, &html_key, html.into_bytes()).await?;
    info!("HTML report saved: {}", store.uri(bucket, &html_key));

    let document = ReportDocument {
        generated_at: &timestamp,
        project_id: &target.project_id,
        dataset_id: &target.dataset_id,
        total_queries: QUERY_NAMES.len(),
        results: &results,
    };
    let json = serde_json::to_vec_pretty(&document)?;
    let json_key = json_key(&timestamp);
    store.put(bucket, &json_key, json).await?;
    info!("JSON report saved: {}", store.uri(bucket, &json_key));

    Ok(ReportOutcome {
        status: "success",
        html_report: store.uri(bucket, &html_key),
        json_report: store.uri(bucket, &json_key),
        queries_executed: QUERY_NAMES.len(),
        public_html_url: format!("{}/{}/{}", target.public_base_url, bucket, html_key),
        timestamp,
    })
}
