//! Offering Memorandum sheet → long-format metric rows.
//!
//! The upload template is one wide row per property. Each numeric column maps
//! to one metric name and unit; rent columns map to `avg_rent_usd_month` with a
//! bedroom-count unit type.

use std::io::Read;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::NewMetric;

#[derive(Debug, Error)]
pub enum OmError {
    #[error("OM sheet has no address")]
    MissingAddress,
    #[error("column '{column}' has a non-numeric value: '{value}'")]
    InvalidNumber { column: &'static str, value: String },
    #[error("{metric} is outside the representable range")]
    Overflow { metric: &'static str },
    #[error("line {line}: malformed row: {source}")]
    Csv {
        line: usize,
        #[source]
        source: csv::Error,
    },
    #[error("OM file has no data rows")]
    Empty,
    #[error("an explicit deal id applies to a single property but the file has {rows} rows")]
    DealIdForManyRows { rows: usize },
    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: Box<OmError>,
    },
}

/// One row of the OM upload template. Every cell is optional text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmSheet {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub opportunity_zone: Option<String>,
    #[serde(default)]
    pub cap_rate: Option<String>,
    #[serde(default)]
    pub rentable_sqft: Option<String>,
    #[serde(default)]
    pub avg_sqft_per_unit: Option<String>,
    #[serde(default)]
    pub asking_price: Option<String>,
    #[serde(default)]
    pub lot_size_acres: Option<String>,
    #[serde(default)]
    pub total_units: Option<String>,
    #[serde(default)]
    pub one_bed_rent: Option<String>,
    #[serde(default)]
    pub two_bed_rent: Option<String>,
    #[serde(default)]
    pub three_bed_rent: Option<String>,
    #[serde(default)]
    pub four_bed_rent: Option<String>,
    #[serde(default)]
    pub noi: Option<String>,
    #[serde(default)]
    pub price_per_sqft: Option<String>,
    #[serde(default)]
    pub price_per_unit: Option<String>,
    #[serde(default)]
    pub price_per_acre: Option<String>,
    #[serde(default)]
    pub vacancy_rate: Option<String>,
    #[serde(default)]
    pub gross_potential_rent: Option<String>,
}

/// Caller-supplied settings for turning a sheet into metrics.
#[derive(Debug, Clone)]
pub struct OmContext {
    /// Overrides the address-derived deal id.
    pub deal_id: Option<String>,
    pub asset_type: String,
    /// Used when the address has no "city, state" suffix.
    pub default_geography: String,
    pub period: Option<String>,
    pub source_uri: Option<String>,
}

/// Scalar template columns: (column, metric name, unit).
const SCALAR_COLUMNS: [(&str, &str, &str); 12] = [
    ("rentable_sqft", "rentable_sqft", "sqft"),
    ("avg_sqft_per_unit", "avg_sqft_per_unit", "sqft"),
    ("asking_price", "asking_price_usd", "USD"),
    ("lot_size_acres", "lot_size_acres", "acres"),
    ("total_units", "total_units", "units"),
    ("cap_rate", "cap_rate_pct", "%"),
    ("noi", "noi_usd", "USD"),
    ("price_per_sqft", "price_per_sf_usd", "$/sf"),
    ("price_per_unit", "price_per_unit_usd", "$/unit"),
    ("price_per_acre", "price_per_acre_usd", "$/acre"),
    ("vacancy_rate", "vacancy_rate", "ratio"),
    ("gross_potential_rent", "gross_potential_rent_usd", "USD"),
];

/// Rent columns: (column, unit type).
const RENT_COLUMNS: [(&str, &str); 4] = [
    ("one_bed_rent", "1BR"),
    ("two_bed_rent", "2BR"),
    ("three_bed_rent", "3BR"),
    ("four_bed_rent", "4BR"),
];

pub const RENT_METRIC: &str = "avg_rent_usd_month";
pub const EGI_METRIC: &str = "effective_gross_income_usd";

const TEMPLATE_EXAMPLE: [(&str, &str); 18] = [
    ("address", "123 Main St, Tampa, FL"),
    ("opportunity_zone", "No"),
    ("cap_rate", "5.4"),
    ("rentable_sqft", "108750"),
    ("avg_sqft_per_unit", "920"),
    ("asking_price", "34250000"),
    ("lot_size_acres", "1.85"),
    ("total_units", "120"),
    ("one_bed_rent", "1650"),
    ("two_bed_rent", "2100"),
    ("three_bed_rent", "2450"),
    ("four_bed_rent", "2800"),
    ("noi", "1890000"),
    ("price_per_sqft", "315"),
    ("price_per_unit", "285417"),
    ("price_per_acre", "18513514"),
    ("vacancy_rate", "0.06"),
    ("gross_potential_rent", "2300000"),
];

/// Column list plus a filled-in example row for the upload template.
#[derive(Debug, Clone, Serialize)]
pub struct CsvTemplate {
    pub columns: Vec<&'static str>,
    pub example: Vec<(&'static str, &'static str)>,
}

#[must_use]
pub fn csv_template() -> CsvTemplate {
    CsvTemplate {
        columns: TEMPLATE_EXAMPLE.iter().map(|(column, _)| *column).collect(),
        example: TEMPLATE_EXAMPLE.to_vec(),
    }
}

impl OmSheet {
    fn cell(&self, column: &str) -> Option<&str> {
        let raw = match column {
            "address" => &self.address,
            "opportunity_zone" => &self.opportunity_zone,
            "cap_rate" => &self.cap_rate,
            "rentable_sqft" => &self.rentable_sqft,
            "avg_sqft_per_unit" => &self.avg_sqft_per_unit,
            "asking_price" => &self.asking_price,
            "lot_size_acres" => &self.lot_size_acres,
            "total_units" => &self.total_units,
            "one_bed_rent" => &self.one_bed_rent,
            "two_bed_rent" => &self.two_bed_rent,
            "three_bed_rent" => &self.three_bed_rent,
            "four_bed_rent" => &self.four_bed_rent,
            "noi" => &self.noi,
            "price_per_sqft" => &self.price_per_sqft,
            "price_per_unit" => &self.price_per_unit,
            "price_per_acre" => &self.price_per_acre,
            "vacancy_rate" => &self.vacancy_rate,
            "gross_potential_rent" => &self.gross_potential_rent,
            _ => &None,
        };
        raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn number(&self, column: &'static str) -> Result<Option<Decimal>, OmError> {
        self.cell(column)
            .map(|raw| {
                Decimal::from_str(raw)
                    .or_else(|_| Decimal::from_scientific(raw))
                    .map_err(|_| OmError::InvalidNumber {
                        column,
                        value: raw.to_string(),
                    })
            })
            .transpose()
    }

    /// The property address, trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`OmError::MissingAddress`] when the cell is blank.
    pub fn address(&self) -> Result<&str, OmError> {
        self.cell("address").ok_or(OmError::MissingAddress)
    }

    /// `OM_` followed by the address with spaces as underscores and commas removed.
    ///
    /// # Errors
    ///
    /// Returns [`OmError::MissingAddress`] when the cell is blank.
    pub fn deal_id(&self) -> Result<String, OmError> {
        let address = self.address()?;
        Ok(format!(
            "OM_{}",
            address.replace(' ', "_").replace(',', "")
        ))
    }

    /// `"City, ST"` from the last two comma-separated address parts.
    #[must_use]
    pub fn geography(&self) -> Option<String> {
        self.cell("address").and_then(extract_geography)
    }

    #[must_use]
    pub fn is_opportunity_zone(&self) -> bool {
        self.cell("opportunity_zone")
            .is_some_and(|v| v.eq_ignore_ascii_case("yes"))
    }

    /// Expand the sheet into one metric per populated template column.
    ///
    /// Blank scalar cells become metrics with no value so the validation
    /// engine can flag them as missing. Blank rent cells are skipped, since
    /// not every property offers every unit type. Effective gross income is
    /// derived when both gross potential rent and vacancy are present.
    ///
    /// # Errors
    ///
    /// Returns [`OmError`] if the address is blank or a cell is not a number.
    pub fn into_metrics(&self, ctx: &OmContext) -> Result<Vec<NewMetric>, OmError> {
        let deal_id = match &ctx.deal_id {
            Some(id) => id.clone(),
            None => self.deal_id()?,
        };
        let geography = self
            .geography()
            .unwrap_or_else(|| ctx.default_geography.clone());

        let base = |metric_name: &str, unit: &str, value: Option<Decimal>| {
            NewMetric::new(&deal_id, &geography, &ctx.asset_type, metric_name)
                .with_value(value)
                .with_unit(unit)
                .with_period(ctx.period.clone())
                .with_source_uri(ctx.source_uri.clone())
        };

        let mut metrics = Vec::with_capacity(SCALAR_COLUMNS.len() + RENT_COLUMNS.len() + 1);

        for (column, metric_name, unit) in SCALAR_COLUMNS {
            metrics.push(base(metric_name, unit, self.number(column)?));
        }

        for (column, unit_type) in RENT_COLUMNS {
            if let Some(rent) = self.number(column)? {
                metrics.push(base(RENT_METRIC, "USD/month", Some(rent)).with_unit_type(unit_type));
            }
        }

        let gpr = self.number("gross_potential_rent")?;
        let vacancy = self.number("vacancy_rate")?;
        if let (Some(gpr), Some(vacancy)) = (gpr, vacancy) {
            let egi = Decimal::ONE
                .checked_sub(vacancy)
                .and_then(|occupied| gpr.checked_mul(occupied))
                .ok_or(OmError::Overflow { metric: EGI_METRIC })?;
            metrics.push(base(EGI_METRIC, "USD", Some(egi)));
        }

        Ok(metrics)
    }
}

/// Parse OM sheets from CSV. Unknown columns are ignored, blank cells are `None`.
///
/// # Errors
///
/// Returns [`OmError::Csv`] with the 1-based file line of the first bad row.
pub fn read_om_sheets<R: Read>(reader: R) -> Result<Vec<OmSheet>, OmError> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    csv.deserialize::<OmSheet>()
        .enumerate()
        .map(|(index, row)| row.map_err(|source| OmError::Csv { line: index + 2, source }))
        .collect()
}

/// Expand every sheet of one upload into metrics, in row order.
///
/// # Errors
///
/// Fails on an upload with no rows, on an explicit deal id with more than one
/// row, or on the first row that does not expand.
pub fn expand_sheets(sheets: &[OmSheet], ctx: &OmContext) -> Result<Vec<NewMetric>, OmError> {
    if sheets.is_empty() {
        return Err(OmError::Empty);
    }
    if ctx.deal_id.is_some() && sheets.len() > 1 {
        return Err(OmError::DealIdForManyRows { rows: sheets.len() });
    }

    let mut metrics = Vec::new();
    for (index, sheet) in sheets.iter().enumerate() {
        let expanded = sheet.into_metrics(ctx).map_err(|source| OmError::Row {
            row: index + 1,
            source: Box::new(source),
        })?;
        metrics.extend(expanded);
    }
    Ok(metrics)
}

fn extract_geography(address: &str) -> Option<String> {
    let parts: Vec<&str> = address.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [.., city, state] if !city.is_empty() && !state.is_empty() => {
            Some(format!("{city}, {state}"))
        }
        _ => None,
    }
}
