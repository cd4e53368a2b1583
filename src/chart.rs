//! Turns pivoted rows into point lists for the line charts.

use crate::pivot::YearSeries;

pub type Point = (f64, f64);

/// (year, value) pairs of one column.
pub fn column<'a>(rows: &'a [YearSeries], key: &'a str) -> impl Iterator<Item = (i32, Option<f64>)> + 'a {
    rows.iter().map(move |r| (r.year, r.get(key)))
}

/// Splits a series at gaps, so each run can be drawn as its own line and a
/// missing year shows as a break.
pub fn segments<I>(points: I) -> Vec<Vec<Point>>
where
    I: IntoIterator<Item = (i32, Option<f64>)>,
{
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (year, value) in points {
        match value {
            Some(v) => current.push((f64::from(year), v)),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Present points only, joined across gaps.
pub fn connected<I>(points: I) -> Vec<Point>
where
    I: IntoIterator<Item = (i32, Option<f64>)>,
{
    points
        .into_iter()
        .filter_map(|(year, value)| value.map(|v| (f64::from(year), v)))
        .collect()
}

/// Axis bounds over all points, padded so single points and flat lines still
/// get a non-empty range. The y axis always includes zero.
pub fn bounds<'a, I>(series: I) -> Option<([f64; 2], [f64; 2])>
where
    I: IntoIterator<Item = &'a [Point]>,
{
    let mut x = [f64::INFINITY, f64::NEG_INFINITY];
    let mut y = [0.0f64, f64::NEG_INFINITY];
    let mut any = false;
    for points in series {
        for &(px, py) in points {
            any = true;
            x = [x[0].min(px), x[1].max(px)];
            y = [y[0].min(py), y[1].max(py)];
        }
    }
    if !any {
        return None;
    }
    if x[0] == x[1] {
        x = [x[0] - 1.0, x[1] + 1.0];
    }
    if y[1] <= y[0] {
        y[1] = y[0] + 1.0;
    }
    y[1] *= 1.05;
    Some((x, y))
}
