use ratatui::{
    Frame,
    layout::Rect as TuiRect,
    style::{Color, Style},
    symbols::Marker,
    widgets::{
        Block, Borders, Paragraph, Wrap,
        canvas::{Canvas, Context, Line},
    },
};
use tracing::warn;

use crate::{
    data::FlowGraph,
    flow_layout::{FlowLayout, LayoutConfig, LayoutError, Viewport, layout},
    format::thousands,
};

const PALETTE: [Color; 8] = [
    Color::Cyan,
    Color::LightMagenta,
    Color::Yellow,
    Color::LightGreen,
    Color::LightBlue,
    Color::LightRed,
    Color::Magenta,
    Color::Green,
];

/// Braille dots per terminal cell.
const DOTS_X: f64 = 2.0;
const DOTS_Y: f64 = 4.0;

/// Material-flow diagram painted on a braille canvas.
pub struct FlowView<'a> {
    graph: &'a FlowGraph,
    config: LayoutConfig,
}

impl<'a> FlowView<'a> {
    pub fn new(graph: &'a FlowGraph) -> Self {
        Self { graph, config: Self::terminal_config() }
    }

    /// Node sizes in braille dots rather than pixels.
    pub fn terminal_config() -> LayoutConfig {
        LayoutConfig {
            node_width: 3.0,
            node_padding: 6.0,
            min_layer_gap: 4.0,
            curve_segments: 12,
            ..LayoutConfig::default()
        }
    }

    /// Drawing extent inside a bordered block of `area`.
    pub fn viewport_for(area: TuiRect) -> Viewport {
        let width = f64::from(area.width.saturating_sub(2)) * DOTS_X;
        let height = f64::from(area.height.saturating_sub(2)) * DOTS_Y;
        Viewport::new(0.0, 1.0, width, (height - 1.0).max(1.0))
    }

    pub fn compute(&self, area: TuiRect) -> Result<FlowLayout, LayoutError> {
        layout(self.graph, &Self::viewport_for(area), &self.config)
    }

    pub fn render(&self, f: &mut Frame, area: TuiRect, title: &str) {
        let block = Block::default().title(title.to_string()).borders(Borders::ALL);
        let flow = match self.compute(area) {
            Ok(flow) => flow,
            Err(err) => {
                warn!(error = %err, "material flow layout failed");
                let msg = Paragraph::new(format!("Cannot lay out material flow: {err}"))
                    .block(block)
                    .style(Style::default().fg(Color::Red))
                    .wrap(Wrap { trim: true });
                f.render_widget(msg, area);
                return;
            }
        };
        if flow.is_empty() {
            f.render_widget(Paragraph::new("No material flow data").block(block), area);
            return;
        }

        let width = f64::from(area.width.saturating_sub(2)) * DOTS_X;
        let height = f64::from(area.height.saturating_sub(2)) * DOTS_Y;
        let canvas = Canvas::default()
            .block(block)
            .marker(Marker::Braille)
            .x_bounds([0.0, width])
            .y_bounds([0.0, height])
            .paint(|ctx| paint(ctx, &flow, width, height));
        f.render_widget(canvas, area);
    }
}

fn paint(ctx: &mut Context<'_>, flow: &FlowLayout, width: f64, height: f64) {
    // canvas y grows upward, layout y grows downward
    let flip = |y: f64| height - y;

    for link in &flow.links {
        let color = PALETTE[link.source % PALETTE.len()];
        let half = link.thickness / 2.0;
        let offsets: &[f64] = if link.thickness > 2.0 { &[-half, 0.0, half] } else { &[0.0] };
        for &offset in offsets {
            for pair in link.path.0.windows(2) {
                ctx.draw(&Line {
                    x1: pair[0].x,
                    y1: flip(pair[0].y + offset),
                    x2: pair[1].x,
                    y2: flip(pair[1].y + offset),
                    color,
                });
            }
        }
    }

    ctx.layer();
    for (i, node) in flow.nodes.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let (min, max) = (node.rect.min(), node.rect.max());
        let mut y = min.y;
        while y <= max.y {
            ctx.draw(&Line { x1: min.x, y1: flip(y), x2: max.x, y2: flip(y), color });
            y += 1.0;
        }
    }

    for node in &flow.nodes {
        let label = format!("{}: {} kt", node.name, thousands(node.value));
        let (min, max) = (node.rect.min(), node.rect.max());
        let x = if min.x < width / 2.0 {
            max.x + DOTS_X
        } else {
            (min.x - DOTS_X * (label.chars().count() as f64 + 1.0)).max(0.0)
        };
        ctx.print(x, flip(node.center_y()), label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RecordStore;
    use ratatui::{Terminal, backend::TestBackend};

    #[test]
    fn viewport_matches_braille_resolution() {
        let vp = FlowView::viewport_for(TuiRect::new(0, 0, 82, 42));
        assert_eq!(vp.x1, 160.0);
        assert_eq!(vp.y1, 159.0);
    }

    #[test]
    fn builtin_flow_lays_out_in_terminal_units() {
        let store = RecordStore::builtin().unwrap();
        let view = FlowView::new(store.flow());
        let flow = view.compute(TuiRect::new(0, 0, 120, 40)).unwrap();
        assert_eq!(flow.layers, 5);
        assert!(flow.nodes.iter().all(|n| n.rect.max().x <= 236.0 + 1e-9));
    }

    #[test]
    fn renders_labels() {
        let store = RecordStore::builtin().unwrap();
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();
        terminal
            .draw(|f| FlowView::new(store.flow()).render(f, f.area(), "Flow"))
            .unwrap();
        let text: String = terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("Supply: 1,100 kt"));
    }

    #[test]
    fn layout_errors_are_shown() {
        let mut graph = RecordStore::builtin().unwrap().flow().clone();
        graph.links[0].target = "Nowhere".into();
        let mut terminal = Terminal::new(TestBackend::new(100, 10)).unwrap();
        terminal
            .draw(|f| FlowView::new(&graph).render(f, f.area(), "Flow"))
            .unwrap();
        let text: String = terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("Cannot lay out material flow"));
    }
}
