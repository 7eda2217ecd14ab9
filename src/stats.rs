use crate::config::DatasetConfig;
use crate::error::{OverlayError, OverlayResult};
use crate::matcher::{match_feature, StatMatch};
use crate::normalize::{normalize_geo_code, normalize_name};
use crate::types::{BoundaryFeature, StatRecord};
use csv::ReaderBuilder;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parallel code and name indexes over one dataset.
#[derive(Debug, Clone, Default)]
pub struct StatLookup {
    pub by_code: HashMap<String, Arc<StatRecord>>,
    pub by_name: HashMap<String, Arc<StatRecord>>,
}

impl StatLookup {
    pub fn build(records: &[StatRecord]) -> Self {
        let mut lookup = StatLookup::default();
        let mut duplicate_codes = 0usize;

        for record in records {
            let record = Arc::new(record.clone());
            if let Some(code) = &record.geo_code {
                if lookup.by_code.insert(code.clone(), Arc::clone(&record)).is_some() {
                    duplicate_codes += 1;
                }
            }
            let key = normalize_name(&record.name);
            if !key.is_empty() {
                lookup.by_name.insert(key, record);
            }
        }

        if duplicate_codes > 0 {
            warn!("{} records share a county code; the last one wins", duplicate_codes);
        }
        debug!(
            by_code = lookup.by_code.len(),
            by_name = lookup.by_name.len(),
            "Built statistics lookup"
        );
        lookup
    }

    pub fn resolve(&self, feature: &BoundaryFeature) -> Option<StatMatch<'_>> {
        match_feature(feature, &self.by_code, &self.by_name)
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty() && self.by_name.is_empty()
    }
}

/// Reads every record of a configured dataset CSV.
pub fn load_dataset(dataset_id: &str, config: &DatasetConfig) -> OverlayResult<Vec<StatRecord>> {
    let what = format!("dataset '{}' ({:?})", dataset_id, config.path);
    let file = std::fs::File::open(&config.path).map_err(|e| OverlayError::unavailable(&what, e))?;
    let records = read_records(file, config).map_err(|reason| OverlayError::unavailable(&what, reason))?;
    info!("Loaded {} records for dataset '{}'", records.len(), dataset_id);
    Ok(records)
}

/// Parses dataset rows. Rows without a name are skipped; unparseable numbers
/// become `None` with a warning.
pub fn read_records<R: Read>(reader: R, config: &DatasetConfig) -> Result<Vec<StatRecord>, String> {
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).flexible(true).from_reader(reader);
    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| format!("column '{}' not found", name))
    };

    let name_idx = column(config.name_column.as_str())?;
    let code_idx = config.code_column.as_deref().map(column).transpose()?;
    let change_idx = config.change_column.as_deref().map(column).transpose()?;
    let period_idx = config
        .periods
        .iter()
        .map(|(period, col)| Ok((period.clone(), column(col.as_str())?)))
        .collect::<Result<Vec<_>, String>>()?;

    let mut records = Vec::new();
    let mut malformed = 0usize;

    for (row, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| e.to_string())?;
        let name = record.get(name_idx).unwrap_or("").to_string();
        if name.is_empty() {
            continue;
        }

        let mut number = |idx: usize, field: &str| -> Option<f64> {
            let cell = record.get(idx).unwrap_or("");
            parse_number(cell).unwrap_or_else(|| {
                malformed += 1;
                warn!(row = row + 1, field, value = cell, "Malformed numeric value treated as missing");
                None
            })
        };

        let mut values = BTreeMap::new();
        for (period, idx) in &period_idx {
            values.insert(period.clone(), number(*idx, period.as_str()));
        }
        let change = change_idx.and_then(|idx| number(idx, "change"));
        let geo_code = code_idx
            .and_then(|idx| record.get(idx))
            .and_then(normalize_geo_code);

        records.push(StatRecord {
            geo_code,
            name,
            values,
            change,
        });
    }

    if malformed > 0 {
        warn!("{} malformed numeric cells in dataset", malformed);
    }
    Ok(records)
}

/// `Some(None)` for an empty cell, `Some(Some(v))` for a finite number and
/// `None` when the cell is malformed.
fn parse_number(cell: &str) -> Option<Option<f64>> {
    let cleaned: String = cell.chars().filter(|c| !matches!(c, ',' | '$' | '%')).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || matches!(cleaned, "(X)" | "N/A" | "NA" | "null") {
        return Some(None);
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(Some(v)),
        _ => None,
    }
}
