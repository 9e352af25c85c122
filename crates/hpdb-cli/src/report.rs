use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::Write;

use chrono::Utc;
use hpdb_core::{AppConfig, ComparisonRow};
use rust_decimal::Decimal;

/// Print the comparison report for one deal.
///
/// # Errors
///
/// Returns an error if the deal has no stored metrics or the query fails.
pub(crate) async fn run_report(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    deal_id: &str,
    json: bool,
) -> anyhow::Result<()> {
    let rows = hpdb_db::compare_deal(pool, deal_id, &config.comparison_policy()).await?;
    if rows.is_empty() {
        anyhow::bail!("no metrics found for deal '{deal_id}'; run `ingest` first");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let now = Utc::now().format("%Y-%m-%d %H:%M UTC");
    println!("Deal: {deal_id}");
    println!(
        "Market: {} (aggregate: {})",
        market_label(&rows),
        config.benchmark_aggregate
    );
    println!("Generated: {now}");
    println!();
    print!("{}", render_table(&rows, &config.provider_priority));
    Ok(())
}

/// Every distinct geography / asset type pair in the report, sorted.
pub(crate) fn market_label(rows: &[ComparisonRow]) -> String {
    rows.iter()
        .map(|row| (row.geography.as_str(), row.asset_type.as_str()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|(geography, asset_type)| format!("{geography} / {asset_type}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Render comparison rows as a fixed-width table with one column per
/// priority provider.
pub(crate) fn render_table(rows: &[ComparisonRow], providers: &[String]) -> String {
    let mut out = String::new();

    let _ = write!(out, "{:<30}{:<6}{:>14}", "METRIC", "TYPE", "VALUE");
    for provider in providers {
        let _ = write!(out, "{provider:>14}");
    }
    let _ = writeln!(out, "{:>12}  COMMENT", "DEVIATION");

    for row in rows {
        let _ = write!(
            out,
            "{:<30}{:<6}{:>14}",
            row.metric_name,
            row.unit_type.as_deref().unwrap_or("\u{2014}"),
            fmt_decimal(row.value)
        );
        for provider in providers {
            let value = row
                .benchmarks
                .iter()
                .find(|b| &b.provider == provider)
                .and_then(|b| b.value);
            let _ = write!(out, "{:>14}", fmt_decimal(value));
        }
        let _ = writeln!(out, "{:>12}  {}", fmt_decimal(row.deviation), row.comment);
    }

    out
}

fn fmt_decimal(value: Option<Decimal>) -> String {
    value.map_or_else(|| "\u{2014}".to_string(), |v| v.to_string())
}

/// Write the OM upload template (header plus one example row) as CSV.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub(crate) fn write_template<W: Write>(out: W) -> anyhow::Result<()> {
    let template = hpdb_core::csv_template();
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&template.columns)?;
    writer.write_record(template.example.iter().map(|(_, value)| *value))?;
    writer.flush()?;
    Ok(())
}
