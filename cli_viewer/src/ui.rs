use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use ratatui::layout::{Constraint, Direction, Layout, Margin};
use ratatui::prelude::Rect;
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Points};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use sim_runtime::{ControlState, Snapshot};

/// Braille cells hold a 2x4 dot grid.
const DOTS_PER_CELL_X: u32 = 2;
const DOTS_PER_CELL_Y: u32 = 4;

pub struct UiState {
    pub control: ControlState,
    pub latest: Option<Arc<Snapshot>>,
    pub logs: VecDeque<String>,
    pub max_logs: usize,
}

impl UiState {
    pub fn new(control: ControlState) -> Self {
        Self {
            control,
            latest: None,
            logs: VecDeque::new(),
            max_logs: 6,
        }
    }

    pub fn push_log<S: Into<String>>(&mut self, line: S) {
        let mut text: String = line.into();
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }
        if text.is_empty() {
            return;
        }
        self.logs.push_front(text);
        while self.logs.len() > self.max_logs {
            self.logs.pop_back();
        }
    }
}

struct Areas {
    header: Rect,
    canvas: Rect,
    commands: Rect,
    logs: Rect,
}

fn layout(area: Rect) -> Areas {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(8),
        ])
        .split(area);
    Areas {
        header: chunks[0],
        canvas: chunks[1],
        commands: chunks[2],
        logs: chunks[3],
    }
}

/// Drawable geometry, in canvas dots, for a terminal of `area`.
pub fn viewport_for(area: Rect) -> (u32, u32) {
    let canvas = layout(area).canvas.inner(&Margin {
        vertical: 1,
        horizontal: 1,
    });
    (
        u32::from(canvas.width) * DOTS_PER_CELL_X,
        u32::from(canvas.height) * DOTS_PER_CELL_Y,
    )
}

pub fn draw_ui(frame: &mut Frame, state: &UiState) {
    let areas = layout(frame.size());
    draw_header(frame, areas.header, state);
    draw_population(frame, areas.canvas, state);
    draw_commands(frame, areas.commands);
    draw_logs(frame, areas.logs, state);
}

fn in_flight_marker(in_flight: bool) -> &'static str {
    if in_flight {
        "*"
    } else {
        ""
    }
}

fn draw_header(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Petri Viewer");
    let control = &state.control;
    let (timestep, population) = state
        .latest
        .as_ref()
        .map(|snapshot| (snapshot.timestep.to_string(), snapshot.population()))
        .unwrap_or_else(|| ("-".to_string(), 0));
    let (status, status_colour) = if control.paused {
        ("PAUSED", Color::Yellow)
    } else {
        ("running", Color::Green)
    };
    let line = Line::from(vec![
        Span::raw(format!("T {timestep} | {population} molecules | ")),
        Span::styled(
            format!("{status}{}", in_flight_marker(control.paused_in_flight)),
            Style::default().fg(status_colour),
        ),
        Span::raw(" | cap "),
        Span::styled(
            format!(
                "{}{}",
                control.molecule_limit,
                in_flight_marker(control.molecule_limit_in_flight)
            ),
            Style::default().fg(Color::Cyan),
        ),
    ]);
    let text = Paragraph::new(line).wrap(Wrap { trim: true });
    frame.render_widget(block, area);
    frame.render_widget(
        text,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

/// Molecule positions grouped by display colour, y flipped so the wire's
/// top-left origin lands at the canvas' top-left.
fn canvas_points(snapshot: &Snapshot) -> BTreeMap<(u8, u8, u8), Vec<(f64, f64)>> {
    let mut groups: BTreeMap<(u8, u8, u8), Vec<(f64, f64)>> = BTreeMap::new();
    for molecule in &snapshot.molecules {
        let colour = molecule.display_colour();
        groups
            .entry((colour.r, colour.g, colour.b))
            .or_default()
            .push((molecule.x, 1.0 - molecule.y));
    }
    groups
}

fn draw_population(frame: &mut Frame, area: Rect, state: &UiState) {
    let groups = state
        .latest
        .as_deref()
        .map(canvas_points)
        .unwrap_or_default();
    let canvas = Canvas::default()
        .block(Block::default().borders(Borders::ALL).title("Population"))
        .marker(Marker::Braille)
        .x_bounds([0.0, 1.0])
        .y_bounds([0.0, 1.0])
        .paint(|ctx| {
            for (&(r, g, b), coords) in &groups {
                ctx.draw(&Points {
                    coords,
                    color: Color::Rgb(r, g, b),
                });
            }
        });
    frame.render_widget(canvas, area);
}

fn draw_commands(frame: &mut Frame, area: Rect) {
    let key = |label: &'static str| Span::styled(label, Style::default().fg(Color::Yellow));
    let line = Line::from(vec![
        key("p/space"),
        Span::raw(" pause/resume  "),
        key("r"),
        Span::raw(" reset  "),
        key("+/-"),
        Span::raw(" molecule cap  "),
        key("q"),
        Span::raw(" quit"),
    ]);
    let block = Block::default().borders(Borders::ALL).title("Commands");
    let paragraph = Paragraph::new(line).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}

fn draw_logs(frame: &mut Frame, area: Rect, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Logs");
    let lines: Vec<Line> = state
        .logs
        .iter()
        .map(|entry| Line::from(Span::raw(entry)))
        .collect();
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(block, area);
    frame.render_widget(
        paragraph,
        area.inner(&Margin {
            vertical: 1,
            horizontal: 1,
        }),
    );
}
