//! Application state, input handling and the main loop.
//!
//! Everything runs on one current-thread runtime. The loop waits on terminal
//! input, PTY readiness, session notifications and background results, and
//! redraws after each wakeup.

use std::io;
use std::path::PathBuf;

use crossterm::event::{
    DisableBracketedPaste, EnableBracketedPaste, Event, EventStream, KeyCode, KeyEvent,
    KeyEventKind, KeyModifiers,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use futures::StreamExt;
use panechat_pty::{decode_keystrokes, escape_keystrokes, SessionController, SessionEvent, SpawnConfig};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::Rect;
use ratatui::Terminal;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::chat::{self, ApiMessage, Endpoint};
use crate::commands::{self, Command};
use crate::config::{self, Settings, PRESELECTED_MODELS};
use crate::editor::LineEditor;
use crate::events::AppEvent;
use crate::input::key_event_to_bytes;
use crate::transcript::Transcript;
use crate::ui;
use crate::winch::ResizeWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Chat,
    Terminal,
}

pub struct App {
    pub(crate) settings: Settings,
    settings_path: Option<PathBuf>,
    pub(crate) controller: SessionController,
    session_rx: UnboundedReceiver<SessionEvent>,
    app_tx: UnboundedSender<AppEvent>,
    app_rx: UnboundedReceiver<AppEvent>,
    pub(crate) transcript: Transcript,
    /// Conversation as sent to the model.
    history: Vec<ApiMessage>,
    http: reqwest::Client,
    pub(crate) editor: LineEditor,
    pub(crate) focus: Focus,
    pub(crate) split: bool,
    /// Transcript rows scrolled up from the bottom.
    pub(crate) scroll: usize,
    pending_reply: bool,
    pub(crate) should_quit: bool,
    full_redraw: bool,
    area: Rect,
    last_pane: Option<(u16, u16)>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl App {
    pub fn new(settings: Settings, settings_path: Option<PathBuf>, transcript: Transcript) -> Self {
        let (session_tx, session_rx) = unbounded_channel();
        let (app_tx, app_rx) = unbounded_channel();
        let mut spawn = SpawnConfig {
            shell: settings.shell.clone(),
            ..SpawnConfig::default()
        };
        if let Some(term) = &settings.term {
            spawn.term = term.clone();
        }

        let mut app = Self {
            controller: SessionController::new(spawn, session_tx),
            settings,
            settings_path,
            session_rx,
            app_tx,
            app_rx,
            transcript,
            history: Vec::new(),
            http: reqwest::Client::new(),
            editor: LineEditor::new(),
            focus: Focus::Chat,
            split: false,
            scroll: 0,
            pending_reply: false,
            should_quit: false,
            full_redraw: false,
            area: Rect::default(),
            last_pane: None,
        };
        let model = app.settings.model.as_deref().unwrap_or("N/A");
        let welcome = format!(
            "Chatting with {model}. Commands: /model, /split, /unsplit, /type, /get_output, /get_full_output, /help, /quit."
        );
        app.transcript.system(&welcome);
        app
    }

    pub fn handle_terminal_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key),
            Event::Paste(text) => match self.focus {
                Focus::Terminal => self.controller.paste(&text),
                Focus::Chat => self.editor.insert_str(&text),
            },
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('g') {
            if self.split {
                self.focus = match self.focus {
                    Focus::Chat => Focus::Terminal,
                    Focus::Terminal => Focus::Chat,
                };
            }
            return;
        }

        if self.focus == Focus::Terminal {
            let application_cursor = self.controller.vt().application_cursor();
            if let Some(bytes) = key_event_to_bytes(key, application_cursor) {
                self.controller.write_input(&bytes);
            }
            return;
        }

        match key.code {
            KeyCode::Char('c') | KeyCode::Char('d') if ctrl => self.should_quit = true,
            KeyCode::Char('l') if ctrl => self.full_redraw = true,
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => self.editor.backspace(),
            KeyCode::Delete => self.editor.delete(),
            KeyCode::Left => self.editor.left(),
            KeyCode::Right => self.editor.right(),
            KeyCode::Home => self.editor.home(),
            KeyCode::End => self.editor.end(),
            KeyCode::Up => self.scroll_by(1),
            KeyCode::Down => self.scroll_by(-1),
            KeyCode::PageUp => self.scroll_by(self.page_size()),
            KeyCode::PageDown => self.scroll_by(-self.page_size()),
            KeyCode::Char(ch) if !ctrl && !key.modifiers.contains(KeyModifiers::ALT) => {
                self.editor.insert(ch)
            }
            _ => {}
        }
    }

    fn page_size(&self) -> isize {
        let rows = ui::areas(self.area, self.split).transcript.height;
        rows.saturating_sub(1).max(1) as isize
    }

    fn scroll_by(&mut self, delta: isize) {
        let areas = ui::areas(self.area, self.split);
        let total = ui::transcript_height(&self.transcript, areas.transcript.width);
        let max = total.saturating_sub(areas.transcript.height as usize);
        self.scroll = self.scroll.saturating_add_signed(delta).min(max);
    }

    pub fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Message(message) => self.transcript.system(&message),
            SessionEvent::Started => log::debug!("session started"),
            SessionEvent::Stopped => {
                self.split = false;
                self.focus = Focus::Chat;
                self.last_pane = None;
                self.full_redraw = true;
            }
            SessionEvent::Redraw => {}
        }
    }

    pub fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ChatReply(result) => {
                self.pending_reply = false;
                self.transcript.clear_temporary();
                match result {
                    Ok(reply) => {
                        self.transcript.assistant(&reply);
                        self.history.push(ApiMessage::assistant(reply));
                    }
                    Err(e) => {
                        log::warn!("chat request failed: {e}");
                        self.transcript.error(&format!("API call error: {e}"));
                        if self.history.last().is_some_and(|turn| turn.role == "user") {
                            self.history.pop();
                        }
                    }
                }
            }
            AppEvent::Resize => log::debug!("terminal resized"),
        }
    }

    /// Handle everything already queued without waiting.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.session_rx.try_recv() {
            self.handle_session_event(event);
        }
        while let Ok(event) = self.app_rx.try_recv() {
            self.handle_app_event(event);
        }
    }

    /// Record the frame size and keep the child's grid matched to the pane.
    pub fn sync_viewport(&mut self, area: Rect) {
        self.area = area;
        if !self.split || !self.controller.is_active() {
            return;
        }
        let pane = ui::terminal_pane_size(area);
        if self.last_pane != Some(pane) {
            log::debug!("terminal pane is now {}x{}", pane.0, pane.1);
            self.controller.resize(pane.0, pane.1);
            self.last_pane = Some(pane);
        }
    }

    fn submit(&mut self) {
        let text = self.editor.take();
        self.scroll = 0;
        if let Some(command) = commands::parse(&text) {
            self.run_command(command);
        }
    }

    fn run_command(&mut self, command: Command) {
        match command {
            Command::Split => self.split(),
            Command::Unsplit => {
                if self.split {
                    self.controller.stop_session();
                    self.split = false;
                    self.focus = Focus::Chat;
                }
            }
            Command::Type(keys) => {
                if !self.split {
                    self.transcript.system("No active terminal session");
                } else if keys.is_empty() {
                    self.transcript.system("Usage: /type <keys>");
                } else {
                    self.controller.write_keystrokes(&keys);
                    let shown = escape_keystrokes(&decode_keystrokes(&keys));
                    self.transcript.system(&format!("Sent keystrokes: {shown}"));
                }
            }
            Command::GetOutput => {
                if !self.split {
                    self.transcript.system("No active terminal session");
                    return;
                }
                let output = self.controller.get_new_output();
                if output.is_empty() {
                    self.transcript.system("No new terminal output");
                } else {
                    self.transcript.system(&format!("Terminal output:\n{output}"));
                }
            }
            Command::GetFullOutput => {
                if self.split {
                    let output = self.controller.get_full_output();
                    self.transcript.system(&format!("Full terminal output:\n{output}"));
                } else {
                    self.transcript.system("No active terminal session");
                }
            }
            Command::Model(None) => self.show_models(),
            Command::Model(Some(choice)) => self.set_model(&choice),
            Command::Help => self.transcript.system(&commands::help_lines().join("\n")),
            Command::Quit => self.should_quit = true,
            Command::Unknown(command) => self.transcript.system(&format!("Unknown command: {command}")),
            Command::Chat(text) => self.send_chat(text),
        }
    }

    fn split(&mut self) {
        if self.split {
            return;
        }
        let pane = ui::terminal_pane_size(self.area);
        match self.controller.start_session(Some(pane)) {
            Ok(()) => {
                self.split = true;
                self.last_pane = Some(pane);
            }
            Err(e) => {
                log::error!("failed to start terminal session: {e}");
                self.transcript.system(&format!("Failed to start terminal session: {e}"));
            }
        }
    }

    fn show_models(&mut self) {
        let current = self.settings.model.as_deref().unwrap_or("not set");
        let mut lines = vec![format!("Current model: {current}")];
        lines.extend(
            PRESELECTED_MODELS
                .iter()
                .enumerate()
                .map(|(idx, model)| format!("{}. {model}", idx + 1)),
        );
        lines.push("Use /model <number> or /model <name> to switch.".to_string());
        self.transcript.system(&lines.join("\n"));
    }

    fn set_model(&mut self, choice: &str) {
        let model = match choice.parse::<usize>() {
            Ok(n) if (1..=PRESELECTED_MODELS.len()).contains(&n) => PRESELECTED_MODELS[n - 1].to_string(),
            Ok(_) => {
                self.transcript.system(&format!(
                    "Invalid choice. Please enter a number between 1 and {}.",
                    PRESELECTED_MODELS.len()
                ));
                return;
            }
            Err(_) => choice.to_string(),
        };
        self.settings.model = Some(model.clone());
        if let Some(path) = &self.settings_path {
            if let Err(e) = config::save(path, &self.settings) {
                self.transcript.error(&format!("could not save settings: {e}"));
            }
        }
        log::info!("model set to {model}");
        self.transcript.system(&format!("Model set to: {model}"));

        if let Some(var) = config::required_key_var(&model) {
            if self.settings.api_key(var, env_var).is_none() {
                self.transcript.system(&format!(
                    "{var} is not set. Export it or add it to the settings file (panechat --configure)."
                ));
            }
        }
    }

    fn send_chat(&mut self, text: String) {
        let Some(endpoint) = self.begin_chat_turn(text) else {
            return;
        };
        let http = self.http.clone();
        let messages = self.history.clone();
        let events = self.app_tx.clone();
        tokio::spawn(async move {
            let reply = chat::complete(&http, &endpoint, &messages).await;
            // The loop may already be gone at exit.
            let _ = events.send(AppEvent::ChatReply(reply));
        });
    }

    /// Record the user's turn and resolve where it goes. `None` when the
    /// message cannot be sent.
    fn begin_chat_turn(&mut self, text: String) -> Option<Endpoint> {
        if self.pending_reply {
            self.transcript.system("Still waiting for the previous reply.");
            return None;
        }
        self.transcript.user(&text);
        let endpoint = match Endpoint::resolve(&self.settings, env_var) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.transcript.error(&e.to_string());
                return None;
            }
        };
        self.history.push(ApiMessage::user(text));
        self.transcript.thinking();
        self.pending_reply = true;
        Some(endpoint)
    }
}

/// Set up the terminal, run the loop and restore the terminal.
pub async fn run(mut app: App) -> io::Result<()> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(EnableBracketedPaste)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut app, &mut terminal).await;
    app.controller.stop_session();

    disable_raw_mode()?;
    terminal.backend_mut().execute(DisableBracketedPaste)?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_loop<B: Backend>(app: &mut App, terminal: &mut Terminal<B>) -> io::Result<()> {
    let _resize = ResizeWatcher::spawn(app.app_tx.clone())?;
    let mut input = EventStream::new();
    terminal.clear()?;

    while !app.should_quit {
        if app.full_redraw {
            terminal.clear()?;
            app.full_redraw = false;
        }
        let size = terminal.size()?;
        app.sync_viewport(Rect::new(0, 0, size.width, size.height));
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            event = input.next() => match event {
                Some(Ok(event)) => app.handle_terminal_event(event),
                Some(Err(e)) => return Err(e),
                None => break,
            },
            result = app.controller.data_ready() => app.controller.on_data_ready(result),
            Some(event) = app.session_rx.recv() => app.handle_session_event(event),
            Some(event) = app.app_rx.recv() => app.handle_app_event(event),
        }
        app.drain_events();
    }
    Ok(())
}
