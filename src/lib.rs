//! Mineral-commodity statistics dashboard: production and trade series,
//! derived unit values, a material-flow diagram layout and AI summaries.

pub mod chart;
pub mod config;
pub mod data;
pub mod derive;
pub mod flow_layout;
pub mod format;
pub mod pivot;
pub mod sankey_draw;
pub mod state;
pub mod summary;
pub mod ui;
