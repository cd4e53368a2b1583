//! Filter/pivot of flat records into one row per year.
//!
//! Every row carries every declared series key. A missing record for a
//! (year, series) pair is kept as an explicit `None` so charts can draw a
//! break instead of a false zero.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::data::{Flow, ProductionRecord, Source, TradeRecord};

/// The (country, subcommodity) pair a view is looking at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selector<'a> {
    pub country: &'a str,
    pub subcommodity: &'a str,
}

/// Closed set of discriminator values for a record type.
pub trait SeriesKey: Copy + Eq + 'static {
    const ALL: &'static [Self];
    fn label(self) -> &'static str;
}

impl SeriesKey for Source {
    const ALL: &'static [Self] = &[Source::Bgs, Source::Usgs];
    fn label(self) -> &'static str {
        Source::label(self)
    }
}

impl SeriesKey for Flow {
    const ALL: &'static [Self] = &[Flow::Export, Flow::Import];
    fn label(self) -> &'static str {
        Flow::label(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Measure {
    Quantity,
    Value,
}

impl Measure {
    pub fn label(self) -> &'static str {
        match self {
            Measure::Quantity => "Quantity",
            Measure::Value => "Value",
        }
    }
}

pub trait PivotRecord {
    type Series: SeriesKey;
    /// Measures each record contributes. A single measure is keyed by the
    /// series label alone ("BGS"); several are keyed label+measure ("ExportValue").
    const MEASURES: &'static [Measure];

    fn country(&self) -> &str;
    fn subcommodity(&self) -> &str;
    fn year(&self) -> i32;
    fn series(&self) -> Self::Series;
    fn measure(&self, measure: Measure) -> Option<f64>;
}

impl PivotRecord for ProductionRecord {
    type Series = Source;
    const MEASURES: &'static [Measure] = &[Measure::Quantity];

    fn country(&self) -> &str {
        &self.country
    }
    fn subcommodity(&self) -> &str {
        &self.subcommodity
    }
    fn year(&self) -> i32 {
        self.year
    }
    fn series(&self) -> Source {
        self.source
    }
    fn measure(&self, measure: Measure) -> Option<f64> {
        match measure {
            Measure::Quantity => self.quantity,
            Measure::Value => None,
        }
    }
}

impl PivotRecord for TradeRecord {
    type Series = Flow;
    const MEASURES: &'static [Measure] = &[Measure::Value, Measure::Quantity];

    fn country(&self) -> &str {
        &self.country
    }
    fn subcommodity(&self) -> &str {
        &self.subcommodity
    }
    fn year(&self) -> i32 {
        self.year
    }
    fn series(&self) -> Flow {
        self.flow
    }
    fn measure(&self, measure: Measure) -> Option<f64> {
        match measure {
            Measure::Quantity => self.quantity,
            Measure::Value => self.value,
        }
    }
}

/// Column name for one (series, measure) pair.
pub fn series_key<R: PivotRecord>(series: R::Series, measure: Measure) -> String {
    if R::MEASURES.len() == 1 {
        series.label().to_string()
    } else {
        format!("{}{}", series.label(), measure.label())
    }
}

/// All column names a pivot over `R` produces, in declaration order.
pub fn declared_keys<R: PivotRecord>() -> Vec<String> {
    R::Series::ALL
        .iter()
        .flat_map(|s| R::MEASURES.iter().map(move |m| series_key::<R>(*s, *m)))
        .collect()
}

/// One chart row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct YearSeries {
    pub year: i32,
    pub values: BTreeMap<String, Option<f64>>,
}

impl YearSeries {
    /// Value for `key`; `None` both for a gap and for an unknown key.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().flatten()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

pub fn pivot<R: PivotRecord>(records: &[R], selector: &Selector<'_>) -> Vec<YearSeries> {
    let filtered: Vec<&R> = records
        .iter()
        .filter(|r| r.country() == selector.country && r.subcommodity() == selector.subcommodity)
        .collect();
    let years: BTreeSet<i32> = filtered.iter().map(|r| r.year()).collect();

    years
        .into_iter()
        .map(|year| {
            let mut values = BTreeMap::new();
            for series in R::Series::ALL {
                // first record in store order wins
                let hit = filtered.iter().find(|r| r.year() == year && r.series() == *series);
                for measure in R::MEASURES {
                    values.insert(
                        series_key::<R>(*series, *measure),
                        hit.and_then(|r| r.measure(*measure)),
                    );
                }
            }
            YearSeries { year, values }
        })
        .collect()
}

/// Typed view of a pivoted trade row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TradeYear {
    pub year: i32,
    pub export_value: Option<f64>,
    pub export_quantity: Option<f64>,
    pub import_value: Option<f64>,
    pub import_quantity: Option<f64>,
}

impl TradeYear {
    pub fn from_series(row: &YearSeries) -> Self {
        let key = |flow, measure| row.get(&series_key::<TradeRecord>(flow, measure));
        Self {
            year: row.year,
            export_value: key(Flow::Export, Measure::Value),
            export_quantity: key(Flow::Export, Measure::Quantity),
            import_value: key(Flow::Import, Measure::Value),
            import_quantity: key(Flow::Import, Measure::Quantity),
        }
    }
}

pub fn trade_years(rows: &[YearSeries]) -> Vec<TradeYear> {
    rows.iter().map(TradeYear::from_series).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn prod(country: &str, year: i32, source: Source, quantity: Option<f64>) -> ProductionRecord {
        ProductionRecord {
            country: country.to_string(),
            year,
            subcommodity: "Rutile".to_string(),
            quantity,
            source,
        }
    }

    fn sel<'a>(country: &'a str) -> Selector<'a> {
        Selector { country, subcommodity: "Rutile" }
    }

    #[test]
    fn keys_are_declared_up_front() {
        assert_eq!(declared_keys::<ProductionRecord>(), vec!["BGS", "USGS"]);
        assert_eq!(
            declared_keys::<TradeRecord>(),
            vec!["ExportValue", "ExportQuantity", "ImportValue", "ImportQuantity"]
        );
    }

    #[test]
    fn missing_source_becomes_explicit_gap() {
        let records = vec![
            prod("Norway", 2021, Source::Usgs, Some(5.0)),
            prod("Norway", 2020, Source::Bgs, Some(3.0)),
            prod("Norway", 2020, Source::Usgs, Some(4.0)),
            prod("Canada", 2019, Source::Bgs, Some(1.0)),
        ];
        let rows = pivot(&records, &sel("Norway"));
        assert_eq!(rows.iter().map(|r| r.year).collect::<Vec<_>>(), vec![2020, 2021]);
        assert_eq!(rows[0].get("BGS"), Some(3.0));
        assert_eq!(rows[0].get("USGS"), Some(4.0));
        assert!(rows[1].has_key("BGS"));
        assert_eq!(rows[1].values["BGS"], None);
        assert_eq!(rows[1].get("USGS"), Some(5.0));
    }

    #[test]
    fn absent_quantity_stays_absent() {
        let records = vec![prod("Norway", 2020, Source::Bgs, None)];
        let rows = pivot(&records, &sel("Norway"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values["BGS"], None);
    }

    #[test]
    fn unmatched_selector_is_empty() {
        let records = vec![prod("Norway", 2020, Source::Bgs, Some(1.0))];
        assert!(pivot(&records, &sel("Atlantis")).is_empty());
        assert!(pivot::<ProductionRecord>(&[], &sel("Norway")).is_empty());
    }

    #[test]
    fn trade_rows_split_value_and_quantity() {
        let records = vec![TradeRecord {
            country: "Norway".into(),
            year: 2020,
            subcommodity: "261400".into(),
            flow: Flow::Import,
            quantity: Some(200.0),
            value: Some(50.0),
        }];
        let rows = pivot(&records, &Selector { country: "Norway", subcommodity: "261400" });
        let typed = TradeYear::from_series(&rows[0]);
        assert_eq!(
            typed,
            TradeYear {
                year: 2020,
                export_value: None,
                export_quantity: None,
                import_value: Some(50.0),
                import_quantity: Some(200.0),
            }
        );
    }

    proptest! {
        #[test]
        fn one_row_per_year_with_every_key(
            entries in prop::collection::vec((2000i32..2010, any::<bool>(), prop::option::of(0.0f64..1e6)), 0..40)
        ) {
            let records: Vec<ProductionRecord> = entries
                .iter()
                .map(|(year, bgs, q)| prod("Norway", *year, if *bgs { Source::Bgs } else { Source::Usgs }, *q))
                .collect();
            let rows = pivot(&records, &sel("Norway"));
            let years: BTreeSet<i32> = entries.iter().map(|e| e.0).collect();
            prop_assert_eq!(rows.len(), years.len());
            for (row, year) in rows.iter().zip(years) {
                prop_assert_eq!(row.year, year);
                prop_assert!(row.has_key("BGS") && row.has_key("USGS"));
                prop_assert_eq!(row.values.len(), 2);
            }
        }
    }
}
