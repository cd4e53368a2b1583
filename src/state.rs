use crossterm::event::KeyCode;
use tracing::debug;

use crate::{
    data::{ProductionRecord, RecordStore, TradeRecord},
    derive::{UnitValueRow, derive_unit_value},
    pivot::{Selector, TradeYear, YearSeries, pivot, trade_years},
    summary::{RequestId, SummaryContext, SummaryState, production_prompt, trade_prompt},
};

/// HS code for titanium ores and concentrates.
pub const TITANIUM_ORES_HS: &str = "261400";
pub const TITANIUM_ORES_LABEL: &str = "Titanium ores and concentrates";

const DEFAULT_COUNTRY: &str = "Australia";
const DEFAULT_COMMODITY: &str = "Ilmenite";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Production,
    Trade,
    MaterialFlow,
}

impl View {
    pub const ALL: [View; 3] = [View::Production, View::Trade, View::MaterialFlow];

    pub fn title(self) -> &'static str {
        match self {
            View::Production => "Production",
            View::Trade => "Trade",
            View::MaterialFlow => "Material Flow",
        }
    }

    fn index(self) -> usize {
        match self {
            View::Production => 0,
            View::Trade => 1,
            View::MaterialFlow => 2,
        }
    }

    fn step(self, forward: bool) -> View {
        let n = Self::ALL.len();
        let i = if forward { (self.index() + 1) % n } else { (self.index() + n - 1) % n };
        Self::ALL[i]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    NextView,
    PrevView,
    NextCountry,
    PrevCountry,
    NextCommodity,
    PrevCommodity,
    RequestSummary,
    SummaryArrived { id: RequestId, text: String },
    Quit,
}

/// Work the reducer asks the shell to perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    RequestSummary { id: RequestId, prompt: String },
}

/// A selector list and the highlighted entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Choice {
    pub options: Vec<String>,
    pub selected: usize,
}

impl Choice {
    fn new(options: Vec<String>, preferred: &str) -> Self {
        let selected = options.iter().position(|o| o == preferred).unwrap_or(0);
        Self { options, selected }
    }

    pub fn current(&self) -> &str {
        self.options.get(self.selected).map(String::as_str).unwrap_or("")
    }

    /// Returns whether the selection moved.
    fn step(&mut self, forward: bool) -> bool {
        if forward && self.selected + 1 < self.options.len() {
            self.selected += 1;
            true
        } else if !forward && self.selected > 0 {
            self.selected -= 1;
            true
        } else {
            false
        }
    }
}

pub struct AppState {
    pub store: RecordStore,
    pub view: View,
    pub production_country: Choice,
    pub commodity: Choice,
    pub trade_country: Choice,
    pub summary: SummaryState,
    pub quit: bool,
}

impl AppState {
    pub const HELP_TEXT: &'static str = "\
Tab / Shift+Tab: switch view
Up/Down: country
Left/Right: commodity
s: AI summary
q: quit";

    pub fn new(store: RecordStore) -> Self {
        let production_country = Choice::new(store.production_countries(), DEFAULT_COUNTRY);
        let commodity = Choice::new(store.production_commodities(), DEFAULT_COMMODITY);
        let trade_country = Choice::new(store.trade_countries(), DEFAULT_COUNTRY);
        Self {
            store,
            view: View::Production,
            production_country,
            commodity,
            trade_country,
            summary: SummaryState::default(),
            quit: false,
        }
    }

    pub fn production_selector(&self) -> Selector<'_> {
        Selector {
            country: self.production_country.current(),
            subcommodity: self.commodity.current(),
        }
    }

    pub fn trade_selector(&self) -> Selector<'_> {
        Selector {
            country: self.trade_country.current(),
            subcommodity: TITANIUM_ORES_HS,
        }
    }

    pub fn production_rows(&self) -> Vec<YearSeries> {
        pivot::<ProductionRecord>(self.store.production(), &self.production_selector())
    }

    pub fn trade_rows(&self) -> Vec<YearSeries> {
        pivot::<TradeRecord>(self.store.trade(), &self.trade_selector())
    }

    pub fn trade_table(&self) -> Vec<TradeYear> {
        trade_years(&self.trade_rows())
    }

    pub fn unit_values(&self) -> Vec<UnitValueRow> {
        derive_unit_value(&self.trade_table())
    }

    /// The country selector of the active view, if it has one.
    fn country_choice(&mut self) -> Option<&mut Choice> {
        match self.view {
            View::Production => Some(&mut self.production_country),
            View::Trade => Some(&mut self.trade_country),
            View::MaterialFlow => None,
        }
    }

    fn summary_prompt(&self) -> Option<String> {
        match self.view {
            View::Production => {
                let context = SummaryContext {
                    country: self.production_country.current(),
                    commodity: self.commodity.current(),
                };
                Some(production_prompt(&self.production_rows(), &context))
            }
            View::Trade => {
                let context = SummaryContext {
                    country: self.trade_country.current(),
                    commodity: TITANIUM_ORES_LABEL,
                };
                Some(trade_prompt(&self.trade_rows(), &context, TITANIUM_ORES_HS))
            }
            View::MaterialFlow => None,
        }
    }

    pub fn reduce(&mut self, action: Action) -> Option<Effect> {
        debug!(?action, view = self.view.title(), "reduce");
        let moved = match action {
            Action::Quit => {
                self.quit = true;
                false
            }
            Action::NextView | Action::PrevView => {
                self.view = self.view.step(action == Action::NextView);
                true
            }
            Action::NextCountry | Action::PrevCountry => {
                let forward = action == Action::NextCountry;
                self.country_choice().is_some_and(|c| c.step(forward))
            }
            Action::NextCommodity | Action::PrevCommodity => {
                self.view == View::Production && self.commodity.step(action == Action::NextCommodity)
            }
            Action::RequestSummary => {
                let prompt = self.summary_prompt()?;
                let id = self.summary.begin()?;
                return Some(Effect::RequestSummary { id, prompt });
            }
            Action::SummaryArrived { id, text } => {
                self.summary.apply(id, text);
                false
            }
        };
        if moved {
            self.summary.invalidate();
        }
        None
    }
}

/// Keyboard binding for the dashboard.
pub fn action_for_key(key: KeyCode) -> Option<Action> {
    use KeyCode::*;
    match key {
        Char('q') | Esc => Some(Action::Quit),
        Tab => Some(Action::NextView),
        BackTab => Some(Action::PrevView),
        Down => Some(Action::NextCountry),
        Up => Some(Action::PrevCountry),
        Right => Some(Action::NextCommodity),
        Left => Some(Action::PrevCommodity),
        Char('s') => Some(Action::RequestSummary),
        _ => None,
    }
}
