use serde::{Deserialize, Serialize};
use serde_json::from_slice;
use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

pub const PRODUCTION_FILE: &str = "production.json";
pub const TRADE_FILE: &str = "trade.json";
pub const FLOW_FILE: &str = "material_flow.json";

const BUILTIN_PRODUCTION: &str = include_str!("../data/production.json");
const BUILTIN_TRADE: &str = include_str!("../data/trade.json");
const BUILTIN_FLOW: &str = include_str!("../data/material_flow.json");

/// Statistical agency a production figure was reported by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "BGS")]
    Bgs,
    #[serde(rename = "USGS")]
    Usgs,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::Bgs => "BGS",
            Source::Usgs => "USGS",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Flow {
    Export,
    Import,
}

impl Flow {
    pub fn label(self) -> &'static str {
        match self {
            Flow::Export => "Export",
            Flow::Import => "Import",
        }
    }
}

/// Annual mine production of one subcommodity, metric tons.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub country: String,
    pub year: i32,
    pub subcommodity: String,
    pub quantity: Option<f64>,
    pub source: Source,
}

/// Annual trade of one HS commodity code. `value` is in thousands of USD,
/// `quantity` in metric tons.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub country: String,
    pub year: i32,
    pub subcommodity: String,
    pub flow: Flow,
    pub quantity: Option<f64>,
    pub value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    pub name: String,
}

/// Directed, weighted edge between two nodes, referenced by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowLink {
    pub source: String,
    pub target: String,
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub links: Vec<FlowLink>,
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("could not read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate production record: {0}")]
    DuplicateProductionRecord(String),
    #[error("duplicate trade record: {0}")]
    DuplicateTradeRecord(String),
    #[error("invalid {field} {value} in {record}")]
    InvalidNumber {
        field: &'static str,
        value: f64,
        record: String,
    },
}

/// How option lists for the selectors are ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionOrder {
    FirstSeen,
    Sorted,
}

/// Distinct values of one field, for populating a selector.
pub fn distinct<'a, T, F>(records: &'a [T], field: F, order: OptionOrder) -> Vec<String>
where
    F: Fn(&'a T) -> &'a str,
{
    let mut seen = HashSet::new();
    let mut out: Vec<String> = records
        .iter()
        .map(field)
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect();
    if order == OptionOrder::Sorted {
        out.sort();
    }
    out
}

/// Immutable, in-memory copy of the three datasets.
#[derive(Clone, Debug)]
pub struct RecordStore {
    production: Vec<ProductionRecord>,
    trade: Vec<TradeRecord>,
    flow: FlowGraph,
    origin: Option<PathBuf>,
}

impl RecordStore {
    /// Datasets bundled into the binary.
    pub fn builtin() -> Result<Self, DataError> {
        let production = parse(PRODUCTION_FILE, BUILTIN_PRODUCTION.as_bytes())?;
        let trade = parse(TRADE_FILE, BUILTIN_TRADE.as_bytes())?;
        let flow = parse(FLOW_FILE, BUILTIN_FLOW.as_bytes())?;
        Self::from_parts(production, trade, flow, None)
    }

    /// Replacement datasets from a directory holding the same three files.
    pub fn load<P: AsRef<Path>>(base: P) -> Result<Self, DataError> {
        let base = base.as_ref().to_path_buf();
        let production = parse(PRODUCTION_FILE, &read(&base, PRODUCTION_FILE)?)?;
        let trade = parse(TRADE_FILE, &read(&base, TRADE_FILE)?)?;
        let flow = parse(FLOW_FILE, &read(&base, FLOW_FILE)?)?;
        Self::from_parts(production, trade, flow, Some(base))
    }

    pub fn from_parts(
        production: Vec<ProductionRecord>,
        trade: Vec<TradeRecord>,
        flow: FlowGraph,
        origin: Option<PathBuf>,
    ) -> Result<Self, DataError> {
        validate_production(&production)?;
        validate_trade(&trade)?;
        info!(
            production = production.len(),
            trade = trade.len(),
            flow_nodes = flow.nodes.len(),
            flow_links = flow.links.len(),
            origin = %origin.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "builtin".into()),
            "loaded datasets"
        );
        Ok(Self { production, trade, flow, origin })
    }

    pub fn production(&self) -> &[ProductionRecord] {
        &self.production
    }

    pub fn trade(&self) -> &[TradeRecord] {
        &self.trade
    }

    pub fn flow(&self) -> &FlowGraph {
        &self.flow
    }

    /// Directory the datasets came from, `None` for the bundled ones.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn production_countries(&self) -> Vec<String> {
        distinct(&self.production, |r| r.country.as_str(), OptionOrder::FirstSeen)
    }

    pub fn production_commodities(&self) -> Vec<String> {
        distinct(&self.production, |r| r.subcommodity.as_str(), OptionOrder::FirstSeen)
    }

    pub fn trade_countries(&self) -> Vec<String> {
        distinct(&self.trade, |r| r.country.as_str(), OptionOrder::Sorted)
    }
}

fn read(base: &Path, file: &str) -> Result<Vec<u8>, DataError> {
    fs::read(base.join(file)).map_err(|source| DataError::Io { file: file.to_string(), source })
}

fn parse<T: for<'de> Deserialize<'de>>(file: &str, bytes: &[u8]) -> Result<T, DataError> {
    from_slice(bytes).map_err(|source| DataError::Parse { file: file.to_string(), source })
}

fn check_number(field: &'static str, value: Option<f64>, record: &dyn fmt::Display) -> Result<(), DataError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(DataError::InvalidNumber {
            field,
            value: v,
            record: record.to_string(),
        }),
        _ => Ok(()),
    }
}

fn validate_production(records: &[ProductionRecord]) -> Result<(), DataError> {
    let mut keys = HashSet::new();
    for r in records {
        let key = format!("{}/{}/{}/{}", r.country, r.year, r.subcommodity, r.source.label());
        check_number("quantity", r.quantity, &key)?;
        if !keys.insert((r.country.as_str(), r.year, r.subcommodity.as_str(), r.source)) {
            return Err(DataError::DuplicateProductionRecord(key));
        }
    }
    Ok(())
}

fn validate_trade(records: &[TradeRecord]) -> Result<(), DataError> {
    let mut keys = HashSet::new();
    for r in records {
        let key = format!("{}/{}/{}/{}", r.country, r.year, r.subcommodity, r.flow.label());
        check_number("quantity", r.quantity, &key)?;
        check_number("value", r.value, &key)?;
        if !keys.insert((r.country.as_str(), r.year, r.subcommodity.as_str(), r.flow)) {
            return Err(DataError::DuplicateTradeRecord(key));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prod(country: &str, year: i32, source: Source) -> ProductionRecord {
        ProductionRecord {
            country: country.to_string(),
            year,
            subcommodity: "Ilmenite".to_string(),
            quantity: Some(10.0),
            source,
        }
    }

    #[test]
    fn builtin_datasets_load() {
        let store = RecordStore::builtin().unwrap();
        assert!(!store.production().is_empty());
        assert!(!store.trade().is_empty());
        assert_eq!(store.flow().nodes.len(), 11);
        assert_eq!(store.flow().links.len(), 10);
        assert!(store.origin().is_none());
    }

    #[test]
    fn option_lists_follow_requested_order() {
        let store = RecordStore::builtin().unwrap();
        let countries = store.production_countries();
        assert_eq!(countries.first().map(String::as_str), Some("Australia"));
        assert_eq!(store.production_commodities()[0], "Ilmenite");

        let trade = store.trade_countries();
        let mut sorted = trade.clone();
        sorted.sort();
        assert_eq!(trade, sorted);
    }

    #[test]
    fn distinct_keeps_first_seen_order() {
        let records = vec![prod("Norway", 2020, Source::Bgs), prod("Canada", 2020, Source::Bgs), prod("Norway", 2021, Source::Bgs)];
        assert_eq!(
            distinct(&records, |r| r.country.as_str(), OptionOrder::FirstSeen),
            vec!["Norway", "Canada"]
        );
        assert_eq!(
            distinct(&records, |r| r.country.as_str(), OptionOrder::Sorted),
            vec!["Canada", "Norway"]
        );
    }

    #[test]
    fn duplicate_production_key_is_rejected() {
        let records = vec![prod("Norway", 2020, Source::Bgs), prod("Norway", 2020, Source::Bgs)];
        let err = RecordStore::from_parts(records, Vec::new(), FlowGraph::default(), None).unwrap_err();
        assert!(matches!(err, DataError::DuplicateProductionRecord(_)));
    }

    #[test]
    fn same_year_from_both_sources_is_fine() {
        let records = vec![prod("Norway", 2020, Source::Bgs), prod("Norway", 2020, Source::Usgs)];
        assert!(RecordStore::from_parts(records, Vec::new(), FlowGraph::default(), None).is_ok());
    }

    #[test]
    fn negative_trade_value_is_rejected() {
        let trade = vec![TradeRecord {
            country: "Norway".into(),
            year: 2020,
            subcommodity: "261400".into(),
            flow: Flow::Export,
            quantity: Some(1.0),
            value: Some(-3.0),
        }];
        let err = RecordStore::from_parts(Vec::new(), trade, FlowGraph::default(), None).unwrap_err();
        assert!(matches!(err, DataError::InvalidNumber { field: "value", .. }));
    }

    #[test]
    fn load_reads_directory_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = RecordStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, DataError::Io { ref file, .. } if file == PRODUCTION_FILE));

        fs::write(dir.path().join(PRODUCTION_FILE), BUILTIN_PRODUCTION).unwrap();
        fs::write(dir.path().join(TRADE_FILE), "[]").unwrap();
        fs::write(dir.path().join(FLOW_FILE), r#"{"nodes": [], "links": []}"#).unwrap();
        let store = RecordStore::load(dir.path()).unwrap();
        assert!(store.trade().is_empty());
        assert_eq!(store.origin(), Some(dir.path()));
    }

    #[test]
    fn malformed_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PRODUCTION_FILE), "[{").unwrap();
        let err = RecordStore::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(PRODUCTION_FILE));
    }
}
