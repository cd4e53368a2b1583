//! Secondary metrics computed from pivoted trade rows.

use serde::Serialize;

use crate::pivot::TradeYear;

/// Trade values are stored in thousands of USD; quantities in tons.
pub const UNIT_SCALE: f64 = 1000.0;

/// USD per ton, or `None` when either input is missing or the quantity is zero.
pub fn unit_value(value: Option<f64>, quantity: Option<f64>) -> Option<f64> {
    let (value, quantity) = (value?, quantity?);
    if quantity == 0.0 {
        return None;
    }
    Some(value * UNIT_SCALE / quantity).filter(|v| v.is_finite())
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct UnitValueRow {
    pub year: i32,
    pub export_unit_value: Option<f64>,
    pub import_unit_value: Option<f64>,
}

/// Unit values per year. Years with neither direction computable are dropped
/// so the line chart stays continuous.
pub fn derive_unit_value(rows: &[TradeYear]) -> Vec<UnitValueRow> {
    rows.iter()
        .map(|r| UnitValueRow {
            year: r.year,
            export_unit_value: unit_value(r.export_value, r.export_quantity),
            import_unit_value: unit_value(r.import_value, r.import_quantity),
        })
        .filter(|r| r.export_unit_value.is_some() || r.import_unit_value.is_some())
        .collect()
}

/// Export minus import value, thousands of USD. Positive means net exporter.
pub fn trade_balance(row: &TradeYear) -> Option<f64> {
    Some(row.export_value? - row.import_value?)
}
