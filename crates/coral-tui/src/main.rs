//! Coral - terminal chat client.
//!
//! This is the entry point for the `coral` binary.

mod app;
mod cache;
mod markdown;
mod ui;

use std::io;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;

use app::{App, Focus};
use cache::WorkspaceCache;
use coral_client::ApiClient;
use coral_core::StreamUpdate;

/// Refresh interval for the conversation list.
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Coral - streaming chat client with subscription gating.
#[derive(Parser, Debug)]
#[command(name = "coral")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API origin.
    #[arg(long, env = "CORAL_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter("coral_tui=debug,coral_core=debug,coral_client=debug,warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let client = ApiClient::new(&args.base_url);
    let cache = WorkspaceCache::new(client.clone());

    // Stream consumer tasks deliver into this channel; the event loop is the
    // single writer applying them to the history.
    let (updates_tx, updates_rx) = mpsc::channel::<StreamUpdate>(128);
    let mut app = App::new(client, cache, updates_tx);

    // Setup terminal with mouse capture enabled
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.bootstrap().await;

    let result = run_event_loop(&mut terminal, &mut app, updates_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

/// Main event loop with real-time streaming support.
///
/// Stream updates trigger an immediate redraw so text appears as it arrives.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut updates_rx: mpsc::Receiver<StreamUpdate>,
) -> anyhow::Result<()> {
    let mut refresh_interval = tokio::time::interval(REFRESH_INTERVAL);

    loop {
        app.tick_animation();

        terminal.draw(|f| ui::render(f, app))?;

        // Shorter tick rate during streaming keeps the spinner smooth.
        let tick_rate = if app.is_streaming() {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(100)
        };

        tokio::select! {
            // Terminal events - poll with short timeout
            () = tokio::time::sleep(tick_rate) => {
                while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        handle_input(app, evt).await;
                    }
                }
            }

            // Stream updates - immediate redraw for real-time streaming
            Some(update) = updates_rx.recv() => {
                if app.handle_stream_update(update) {
                    terminal.draw(|f| ui::render(f, app))?;
                }
            }

            // Periodic conversation refresh (only while idle)
            _ = refresh_interval.tick() => {
                if !app.is_streaming() && app.fatal_error.is_none() {
                    app.refresh_conversations().await;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    // Teardown: cancelling is idempotent and safe when nothing streams.
    app.cancel_streaming();

    Ok(())
}

/// Handle input events.
async fn handle_input(app: &mut App, event: Event) {
    match event {
        Event::Key(key) => {
            if key.kind != KeyEventKind::Press {
                return;
            }

            // Fail-closed: while the workspace failed to load, only quitting
            // is allowed.
            if app.fatal_error.is_some() {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                    || (key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL))
                {
                    app.should_quit = true;
                }
                return;
            }

            match key.code {
                KeyCode::Tab => {
                    app.focus = app.focus.next();
                    return;
                }
                KeyCode::PageUp => {
                    app.scroll_chat_up(10);
                    return;
                }
                KeyCode::PageDown => {
                    app.scroll_chat_down(10);
                    return;
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    app.should_quit = true;
                    return;
                }
                _ => {}
            }

            match app.focus {
                Focus::Conversations => handle_list_keys(app, key.code).await,
                Focus::Chat => handle_chat_keys(app, key.code, key.modifiers).await,
            }
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3),
            _ => {}
        },
        _ => {}
    }
}

/// Handle keys while the conversation list has focus.
async fn handle_list_keys(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => app.select_prev_conversation(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next_conversation(),
        KeyCode::Enter => {
            app.activate_selected().await;
            if app.active_conversation.is_some() {
                app.focus = Focus::Chat;
            }
        }
        KeyCode::Char('u') => app.upgrade().await,
        KeyCode::Char('r') => app.refresh_conversations().await,
        KeyCode::Char('R') => app.hard_refresh().await,
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Esc => app.clear_error(),
        _ => {}
    }
}

/// Handle keys while the chat column has focus.
async fn handle_chat_keys(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    match code {
        KeyCode::Esc => {
            if app.is_streaming() {
                app.cancel_streaming();
            } else if app.error_message.is_some() {
                app.clear_error();
            } else {
                app.focus = Focus::Conversations;
            }
        }
        KeyCode::Enter => {
            if let Err(e) = app.submit() {
                app.set_error(e.to_string());
            }
        }
        KeyCode::Char(c) => {
            if modifiers.contains(KeyModifiers::CONTROL) {
                match c {
                    'a' => app.move_cursor_start(),
                    'e' => app.move_cursor_end(),
                    'u' => app.clear_input(),
                    'w' => app.delete_word(),
                    _ => {}
                }
            } else {
                app.insert_char(c);
            }
        }
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Down => app.scroll_chat_down(1),
        _ => {}
    }
}
