use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;

mod app;
mod config;
mod error;
mod logging;
mod modules;
mod ui;

use app::{App, AppState, MenuSection};
use config::Config;
use logging::LoggingConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    LoggingConfig::from_config(&config).init()?;
    let mut app = App::new(config)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;
    app.shutdown().await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = %format!("{err:#}"), "exited with error");
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(KeyEvent { code, modifiers, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press {
                    continue;
                }
                if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }
                match app.state {
                    AppState::Normal => match code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('?') => app.show_help = !app.show_help,
                        KeyCode::Char(c @ '1'..='8') => {
                            let index = (c as usize) - ('1' as usize);
                            app.set_section(MenuSection::ALL[index]);
                        }
                        KeyCode::Tab => app.next_section(),
                        KeyCode::BackTab => app.previous_section(),
                        KeyCode::Up | KeyCode::Char('k') => app.previous_item(),
                        KeyCode::Down | KeyCode::Char('j') => app.next_item(),
                        KeyCode::PageUp => app.page_up(),
                        KeyCode::PageDown => app.page_down(),
                        KeyCode::Home => app.go_home(),
                        KeyCode::End => app.go_end(),
                        KeyCode::Char(']') => {
                            if let Err(e) = app.next_page().await { app.report_error("Paging failed", e); }
                        }
                        KeyCode::Char('[') => {
                            if let Err(e) = app.previous_page().await { app.report_error("Paging failed", e); }
                        }
                        KeyCode::Char('/') => app.open_search(),
                        KeyCode::Char('r') => {
                            if let Err(e) = app.refresh().await { app.report_error("Refresh failed", e); }
                        }
                        KeyCode::Enter => {
                            if let Err(e) = app.activate_item().await { app.report_error("Action failed", e); }
                        }
                        KeyCode::Char('t') => app.toggle_detail(),
                        KeyCode::Char('n') => app.new_item(),
                        KeyCode::Char('e') => app.edit_item(),
                        KeyCode::Char('d') => app.delete_item(),
                        KeyCode::Char('L') => {
                            if let Err(e) = app.cycle_locale().await { app.report_error("Language switch failed", e); }
                        }
                        KeyCode::Char('o') => app.logout().await,
                        KeyCode::Char('c') if app.current_section == MenuSection::Notifications => {
                            app.clear_notifications()
                        }
                        KeyCode::Char('m') if app.current_section == MenuSection::Notifications => {
                            app.mark_notifications_read()
                        }
                        KeyCode::Char('p') => {
                            if let Err(e) = app.generate_pdf().await { app.report_error("PDF generation failed", e); }
                        }
                        KeyCode::Char('s') => {
                            if let Err(e) = app.cycle_quote_status().await { app.report_error("Status update failed", e); }
                        }
                        KeyCode::Char('a') => {
                            if let Err(e) = app.toggle_review_approval().await { app.report_error("Approval failed", e); }
                        }
                        KeyCode::Char('u') => app.open_upload(),
                        KeyCode::Esc => app.show_help = false,
                        _ => {}
                    },
                    AppState::Input => match code {
                        KeyCode::Enter => {
                            if let Err(e) = app.submit_input().await { app.report_error("Submit failed", e); }
                        }
                        KeyCode::Esc => app.cancel_input(),
                        KeyCode::Backspace => app.input_backspace(),
                        KeyCode::Char(c) => app.input_char(c),
                        KeyCode::Left => app.input_move_left(),
                        KeyCode::Right => app.input_move_right(),
                        _ => {}
                    },
                    AppState::Confirm => match code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => {
                            if let Err(e) = app.confirm_action().await { app.report_error("Delete failed", e); }
                        }
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                            app.cancel_confirm()
                        }
                        _ => {}
                    },
                }
            }
        }

        if let Err(e) = app.auto_refresh().await { app.report_error("Auto refresh failed", e); }
    }
}
