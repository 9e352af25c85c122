//! `ingest` command: expand OM sheets into metrics and record each one.
//!
//! Every metric is recorded in its own transaction. Metrics of a sheet are
//! recorded concurrently, bounded by `HPDB_INGEST_CONCURRENCY`. A failed metric
//! is logged and counted; the rest of the sheet still lands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use futures::stream::{self, StreamExt};
use hpdb_core::{
    validate_with, AppConfig, Finding, NewMetric, OmContext, OmSheet, RuleBook, Severity,
};

#[derive(Debug)]
pub(crate) struct IngestArgs {
    pub path: PathBuf,
    pub deal_id: Option<String>,
    pub period: Option<String>,
    pub asset_type: Option<String>,
}

/// Read the file named by `args` and expand every sheet into metrics.
fn expand_file(config: &AppConfig, args: &IngestArgs) -> anyhow::Result<Vec<NewMetric>> {
    let file = std::fs::File::open(&args.path)
        .with_context(|| format!("failed to open OM file {}", args.path.display()))?;
    let sheets = hpdb_core::read_om_sheets(file)
        .with_context(|| format!("invalid OM file {}", args.path.display()))?;
    expand_sheets(config, args, &sheets)
}

pub(crate) fn expand_sheets(
    config: &AppConfig,
    args: &IngestArgs,
    sheets: &[OmSheet],
) -> anyhow::Result<Vec<NewMetric>> {
    let ctx = OmContext {
        deal_id: args.deal_id.clone(),
        asset_type: args
            .asset_type
            .clone()
            .unwrap_or_else(|| config.default_asset_type.clone()),
        default_geography: config.default_geography.clone(),
        period: args.period.clone(),
        source_uri: Some(source_uri(&args.path)),
    };

    for (index, sheet) in sheets.iter().enumerate() {
        tracing::debug!(
            row = index + 1,
            opportunity_zone = sheet.is_opportunity_zone(),
            "read OM sheet"
        );
    }
    Ok(hpdb_core::expand_sheets(sheets, &ctx)?)
}

fn source_uri(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

/// Record every metric of the file and print a per-deal summary.
pub(crate) async fn run_ingest(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    args: &IngestArgs,
) -> anyhow::Result<()> {
    let metrics = expand_file(config, args)?;
    let options = config.validation_options();
    let total = metrics.len();

    let results: Vec<_> = stream::iter(metrics)
        .map(|metric| async move {
            let result = hpdb_db::record_and_validate(pool, &metric, options).await;
            (metric, result)
        })
        .buffer_unordered(config.ingest_concurrency)
        .collect()
        .await;

    let mut recorded: Vec<(NewMetric, Vec<Finding>)> = Vec::with_capacity(total);
    let mut failed = 0usize;
    for (metric, result) in results {
        match result {
            Ok(outcome) => recorded.push((metric, outcome.findings)),
            Err(e) => {
                failed += 1;
                tracing::error!(
                    deal_id = %metric.deal_id,
                    metric = %metric.metric_name,
                    error = %e,
                    "failed to record metric"
                );
            }
        }
    }

    print_findings(&recorded);
    for (deal_id, count) in deals(&recorded) {
        println!("recorded {count} metric(s) for {deal_id}; run `report {deal_id}` to compare");
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} metric(s) failed to record");
    }
    Ok(())
}

/// Validate against the rules file only. Nothing is written.
pub(crate) fn run_ingest_dry_run(config: &AppConfig, args: &IngestArgs) -> anyhow::Result<()> {
    let metrics = expand_file(config, args)?;
    let rules = hpdb_core::load_rules(&config.rules_path).with_context(|| {
        format!("failed to load rules from {}", config.rules_path.display())
    })?;
    let book: RuleBook = rules.rules.into_iter().collect();
    let options = config.validation_options();

    let checked: Vec<(NewMetric, Vec<Finding>)> = metrics
        .into_iter()
        .map(|metric| {
            let findings = validate_with(&book, metric.as_value(), options);
            (metric, findings)
        })
        .collect();

    print_findings(&checked);
    for (deal_id, count) in deals(&checked) {
        println!("dry-run: would record {count} metric(s) for {deal_id}");
    }
    Ok(())
}

fn deals(results: &[(NewMetric, Vec<Finding>)]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for (metric, _) in results {
        *counts.entry(metric.deal_id.as_str()).or_insert(0) += 1;
    }
    counts
}

fn print_findings(results: &[(NewMetric, Vec<Finding>)]) {
    let mut flagged: Vec<&(NewMetric, Vec<Finding>)> =
        results.iter().filter(|(_, f)| !f.is_empty()).collect();
    if flagged.is_empty() {
        println!("no validation flags");
        return;
    }
    flagged.sort_by(|(a, _), (b, _)| {
        a.metric_name
            .cmp(&b.metric_name)
            .then_with(|| a.unit_type().cmp(&b.unit_type()))
    });

    println!("{:<30}{:<6}{:<17}{:<6}MESSAGE", "METRIC", "TYPE", "FLAG", "SEV");
    for (metric, findings) in flagged {
        for finding in findings {
            println!(
                "{:<30}{:<6}{:<17}{:<6}{}",
                metric.metric_name,
                metric.unit_type().unwrap_or("\u{2014}"),
                finding.kind,
                finding.severity,
                finding.message
            );
        }
    }

    let high = results
        .iter()
        .flat_map(|(_, f)| f)
        .filter(|f| f.severity == Severity::High)
        .count();
    if high > 0 {
        println!("{high} high-severity flag(s)");
    }
}
