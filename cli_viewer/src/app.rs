use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use sim_runtime::{ControlState, SnapshotBuffer, UserAction};
use tokio::sync::{mpsc::UnboundedSender, watch};
use tracing::{debug, info};

use crate::ui::{draw_ui, viewport_for, UiState};

/// What a key press asks of the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyIntent {
    Action(UserAction),
    Quit,
}

pub fn key_intent(code: KeyCode) -> Option<KeyIntent> {
    let action = match code {
        KeyCode::Char('q') | KeyCode::Esc => return Some(KeyIntent::Quit),
        KeyCode::Char('p') | KeyCode::Char('P') | KeyCode::Char(' ') => UserAction::TogglePause,
        KeyCode::Char('r') | KeyCode::Char('R') => UserAction::Reset {
            molecule_limit: None,
            seed: None,
        },
        KeyCode::Char('=') | KeyCode::Char('+') => UserAction::NudgeMoleculeLimit(1),
        KeyCode::Char('-') | KeyCode::Char('_') => UserAction::NudgeMoleculeLimit(-1),
        _ => return None,
    };
    Some(KeyIntent::Action(action))
}

pub struct ViewerApp {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
    ui_state: UiState,
    buffer: SnapshotBuffer,
    control: watch::Receiver<ControlState>,
    actions: UnboundedSender<UserAction>,
    shutdown_sender: Sender<()>,
    log_receiver: Receiver<String>,
    redraw_interval: Duration,
}

impl ViewerApp {
    pub fn new(
        buffer: SnapshotBuffer,
        control: watch::Receiver<ControlState>,
        actions: UnboundedSender<UserAction>,
        shutdown_sender: Sender<()>,
        log_receiver: Receiver<String>,
        redraw_interval: Duration,
    ) -> Result<Self> {
        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        crossterm::terminal::enable_raw_mode()?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        let ui_state = UiState::new(*control.borrow());
        Ok(Self {
            terminal,
            ui_state,
            buffer,
            control,
            actions,
            shutdown_sender,
            log_receiver,
            redraw_interval,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let size = self.terminal.size()?;
        self.report_size(size);
        let mut last_draw: Option<Instant> = None;

        loop {
            while let Ok(line) = self.log_receiver.try_recv() {
                self.ui_state.push_log(line);
            }

            if last_draw.map_or(true, |at| at.elapsed() >= self.redraw_interval) {
                self.ui_state.control = *self.control.borrow();
                self.ui_state.latest = self.buffer.latest();
                self.terminal.draw(|frame| draw_ui(frame, &self.ui_state))?;
                last_draw = Some(Instant::now());
            }

            if !event::poll(Duration::from_millis(20))? {
                continue;
            }
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => {
                    match key_intent(key.code) {
                        Some(KeyIntent::Quit) => break,
                        Some(KeyIntent::Action(action)) => self.dispatch(action),
                        None => {}
                    }
                }
                Event::Resize(width, height) => {
                    self.report_size(Rect::new(0, 0, width, height));
                }
                _ => {}
            }
        }

        self.terminal.show_cursor()?;
        crossterm::terminal::disable_raw_mode()?;
        self.dispatch(UserAction::Shutdown);
        let _ = self.shutdown_sender.send(());
        info!(target: "petri::viewer", "Viewer requested shutdown");
        Ok(())
    }

    fn report_size(&self, area: Rect) {
        let (width, height) = viewport_for(area);
        self.dispatch(UserAction::Resize { width, height });
    }

    fn dispatch(&self, action: UserAction) {
        debug!(target: "petri::viewer", ?action, "action.dispatched");
        if self.actions.send(action).is_err() {
            debug!(target: "petri::viewer", "action.dropped=session_gone");
        }
    }
}
