use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    widgets::{
        Axis, Block, Borders, Cell, Chart, Dataset, GraphType, List, ListItem, ListState, Paragraph, Row, Table,
        Wrap,
    },
};

use crate::{
    chart::{Point, bounds, column, connected, segments},
    derive::trade_balance,
    format::{compact, or_dash, thousands, usd_from_thousands},
    sankey_draw::FlowView,
    state::{AppState, Choice, TITANIUM_ORES_HS, View},
};

const EXPORT_COLOR: Color = Color::Cyan;
const IMPORT_COLOR: Color = Color::Magenta;

/// One named line, possibly broken into several runs.
struct Series<'a> {
    name: &'a str,
    color: Color,
    graph_type: GraphType,
    runs: Vec<Vec<Point>>,
}

pub fn draw(f: &mut Frame, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(20),
            Constraint::Percentage(60),
            Constraint::Percentage(20),
        ])
        .split(f.area());

    draw_sidebar(f, state, chunks[0]);

    let title = format!("{} Dashboard", state.view.title());
    match state.view {
        View::Production => draw_production(f, state, chunks[1], &title),
        View::Trade => draw_trade(f, state, chunks[1], &title),
        View::MaterialFlow => draw_material_flow(f, state, chunks[1], &title),
    }

    draw_side_panel(f, state, chunks[2]);
}

fn draw_sidebar(f: &mut Frame, state: &AppState, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(8)])
        .split(area);

    let items: Vec<ListItem> = View::ALL.iter().map(|v| ListItem::new(v.title())).collect();
    let mut list_state = ListState::default();
    list_state.select(View::ALL.iter().position(|v| *v == state.view));
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("MineralSands"))
        .highlight_symbol(">> ")
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    f.render_stateful_widget(list, rows[0], &mut list_state);

    let help = Paragraph::new(AppState::HELP_TEXT)
        .block(Block::default().borders(Borders::ALL).title("Keys"))
        .wrap(Wrap { trim: true });
    f.render_widget(help, rows[1]);
}

fn draw_production(f: &mut Frame, state: &AppState, area: Rect, title: &str) {
    let rows = state.production_rows();
    let series = [
        Series {
            name: "BGS Production",
            color: EXPORT_COLOR,
            graph_type: GraphType::Line,
            runs: segments(column(&rows, "BGS")),
        },
        Series {
            name: "USGS Production",
            color: Color::LightBlue,
            graph_type: GraphType::Line,
            runs: segments(column(&rows, "USGS")),
        },
    ];
    let title = format!(
        "{title}: {} in {} (metric tons)",
        state.commodity.current(),
        state.production_country.current()
    );
    line_chart(f, area, &title, &series, compact);
}

fn draw_trade(f: &mut Frame, state: &AppState, area: Rect, title: &str) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(22),
            Constraint::Percentage(22),
            Constraint::Percentage(26),
        ])
        .split(area);

    let rows = state.trade_rows();
    let values = [
        Series {
            name: "Export Value",
            color: EXPORT_COLOR,
            graph_type: GraphType::Line,
            runs: segments(column(&rows, "ExportValue")),
        },
        Series {
            name: "Import Value",
            color: IMPORT_COLOR,
            graph_type: GraphType::Line,
            runs: segments(column(&rows, "ImportValue")),
        },
    ];
    let heading = format!("{title}: HS {TITANIUM_ORES_HS}, {}", state.trade_country.current());
    line_chart(f, parts[0], &heading, &values, usd_from_thousands);

    let quantities = [
        Series {
            name: "Export Quantity",
            color: EXPORT_COLOR,
            graph_type: GraphType::Bar,
            runs: vec![connected(column(&rows, "ExportQuantity"))],
        },
        Series {
            name: "Import Quantity",
            color: IMPORT_COLOR,
            graph_type: GraphType::Bar,
            runs: vec![connected(column(&rows, "ImportQuantity"))],
        },
    ];
    line_chart(f, parts[1], "Trade Volume (metric tons)", &quantities, compact);

    let unit = state.unit_values();
    let unit_series = [
        Series {
            name: "Export Unit Value",
            color: EXPORT_COLOR,
            graph_type: GraphType::Line,
            runs: vec![connected(unit.iter().map(|r| (r.year, r.export_unit_value)))],
        },
        Series {
            name: "Import Unit Value",
            color: IMPORT_COLOR,
            graph_type: GraphType::Line,
            runs: vec![connected(unit.iter().map(|r| (r.year, r.import_unit_value)))],
        },
    ];
    line_chart(f, parts[2], "Unit Value (USD per metric ton)", &unit_series, |v| format!("${v:.0}"));

    draw_trade_table(f, state, parts[3]);
}

fn draw_trade_table(f: &mut Frame, state: &AppState, area: Rect) {
    let header = Row::new(["Year", "Export", "Import", "Export t", "Import t", "Balance"])
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    let rows: Vec<Row> = state
        .trade_table()
        .iter()
        .map(|r| {
            let balance = trade_balance(r);
            let balance_style = match balance {
                Some(b) if b >= 0.0 => Style::default().fg(Color::Green),
                Some(_) => Style::default().fg(Color::Red),
                None => Style::default(),
            };
            Row::new(vec![
                Cell::from(r.year.to_string()),
                Cell::from(or_dash(r.export_value, usd_from_thousands)),
                Cell::from(or_dash(r.import_value, usd_from_thousands)),
                Cell::from(or_dash(r.export_quantity, thousands)),
                Cell::from(or_dash(r.import_quantity, thousands)),
                Cell::from(or_dash(balance, usd_from_thousands)).style(balance_style),
            ])
        })
        .collect();
    let widths = [
        Constraint::Length(6),
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Fill(1),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Trade by year (values in USD)"));
    f.render_widget(table, area);
}

fn draw_material_flow(f: &mut Frame, state: &AppState, area: Rect, title: &str) {
    let title = format!("{title}: titanium feedstock, kt TiO2 equivalent (illustrative)");
    FlowView::new(state.store.flow()).render(f, area, &title);
}

fn line_chart(f: &mut Frame, area: Rect, title: &str, series: &[Series<'_>], y_label: fn(f64) -> String) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let all_runs = series.iter().flat_map(|s| s.runs.iter().map(Vec::as_slice));
    let Some((x, y)) = bounds(all_runs) else {
        let empty = Paragraph::new("No data for this selection").block(block);
        f.render_widget(empty, area);
        return;
    };

    let mut datasets = Vec::new();
    for s in series {
        for (i, run) in s.runs.iter().enumerate() {
            let mut dataset = Dataset::default()
                .marker(Marker::Braille)
                .graph_type(s.graph_type)
                .style(Style::default().fg(s.color))
                .data(run);
            if i == 0 {
                dataset = dataset.name(s.name);
            }
            datasets.push(dataset);
        }
    }

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(x)
                .labels(vec![format!("{:.0}", x[0]), format!("{:.0}", x[1])]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(y)
                .labels(vec![y_label(y[0]), y_label((y[0] + y[1]) / 2.0), y_label(y[1])]),
        );
    f.render_widget(chart, area);
}

fn choice_list(f: &mut Frame, area: Rect, title: &str, choice: &Choice) {
    let items: Vec<ListItem> = choice.options.iter().map(|o| ListItem::new(o.as_str())).collect();
    let mut list_state = ListState::default();
    list_state.select(Some(choice.selected));
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .highlight_symbol(">> ")
        .highlight_style(Style::default().fg(Color::Red));
    f.render_stateful_widget(list, area, &mut list_state);
}

fn draw_side_panel(f: &mut Frame, state: &AppState, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Percentage(20),
            Constraint::Percentage(45),
        ])
        .split(area);

    match state.view {
        View::Production => {
            choice_list(f, rows[0], "Country", &state.production_country);
            choice_list(f, rows[1], "Commodity", &state.commodity);
        }
        View::Trade => {
            choice_list(f, rows[0], "Country", &state.trade_country);
            let info = Paragraph::new(format!("HS {TITANIUM_ORES_HS}\nTitanium ores and concentrates"))
                .block(Block::default().borders(Borders::ALL).title("Commodity"))
                .wrap(Wrap { trim: true });
            f.render_widget(info, rows[1]);
        }
        View::MaterialFlow => {
            let info = Paragraph::new(
                "Simplified national-level material flow for titanium, from supply to final processing. \
All values are illustrative.",
            )
            .block(Block::default().borders(Borders::ALL).title("About"))
            .wrap(Wrap { trim: true });
            f.render_widget(info, rows[0]);
        }
    }

    let (text, style) = if state.summary.is_loading() {
        ("Loading analysis from Gemini...".to_string(), Style::default().fg(Color::Gray))
    } else if let Some(text) = state.summary.text() {
        (text.to_string(), Style::default().fg(Color::White))
    } else if state.view == View::MaterialFlow {
        (String::new(), Style::default())
    } else {
        ("Press s for a summary".to_string(), Style::default().fg(Color::DarkGray))
    };
    let title = if state.summary.is_loading() { "AI Summary (Generating...)" } else { "AI Summary" };
    let summary = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .style(style)
        .wrap(Wrap { trim: true });
    f.render_widget(summary, rows[2]);
}
