use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Rows moved per mouse wheel notch
const WHEEL_ROWS: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize => {
            if app.follow_tail {
                app.scroll_to_bottom();
            }
        }
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return;
            }
            KeyCode::Char('o') => {
                app.open_file_picker();
                return;
            }
            KeyCode::Char('u') if app.input_mode != InputMode::SelectingFile => {
                app.start_upload();
                return;
            }
            _ => {}
        }
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
        InputMode::SelectingFile => handle_file_picker(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Back to typing
        KeyCode::Char('i') | KeyCode::Char('a') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
        }

        // Dataset
        KeyCode::Char('f') => app.open_file_picker(),
        KeyCode::Char('u') => app.start_upload(),

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('g') | KeyCode::Home => app.scroll_to_top(),
        KeyCode::Char('G') | KeyCode::End => {
            app.follow_tail = true;
            app.scroll_to_bottom();
        }
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_down(app.half_page());
        }
        KeyCode::PageDown => app.scroll_down(app.half_page()),
        KeyCode::PageUp => app.scroll_up(app.half_page()),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.send_query(),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::PageDown => app.scroll_down(app.half_page()),
        KeyCode::PageUp => app.scroll_up(app.half_page()),
        KeyCode::Char(c) => app.insert_char(c),
        _ => {}
    }
}

fn handle_file_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.file_input.clear();
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Enter => app.confirm_file_picker(),
        KeyCode::Backspace => {
            app.file_input.pop();
        }
        KeyCode::Char(c) => app.file_input.push(c),
        _ => {}
    }
}

fn handle_paste(app: &mut App, text: &str) {
    match app.input_mode {
        InputMode::SelectingFile => {
            app.file_input.push_str(text.trim_end_matches(['\r', '\n']));
        }
        InputMode::Editing => app.insert_str(text),
        InputMode::Normal => {
            app.input_mode = InputMode::Editing;
            app.insert_str(text);
        }
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(WHEEL_ROWS),
        MouseEventKind::ScrollUp => app.scroll_up(WHEEL_ROWS),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyst::{QueryReply, Transport};
    use crate::dataset::DatasetFile;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn upload_dataset(&self, _file: &DatasetFile) -> Result<(), TransportError> {
            Err(TransportError::Aborted("offline".to_string()))
        }

        async fn submit_query(&self, _text: &str) -> Result<QueryReply, TransportError> {
            Err(TransportError::Aborted("offline".to_string()))
        }
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn app() -> App {
        App::new(Arc::new(Offline), "http://test")
    }

    #[test]
    fn test_typing_and_mode_switches() {
        let mut app = app();
        assert_eq!(app.input_mode, InputMode::Editing);

        for c in "hi q".chars() {
            handle_event(&mut app, key(KeyCode::Char(c)));
        }
        assert_eq!(app.session.pending_input(), "hi q");
        assert!(!app.should_quit);

        handle_event(&mut app, key(KeyCode::Esc));
        assert_eq!(app.input_mode, InputMode::Normal);
        handle_event(&mut app, key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }

    #[test]
    fn test_enter_on_blank_input_does_nothing() {
        let mut app = app();
        handle_event(&mut app, key(KeyCode::Char(' ')));
        handle_event(&mut app, key(KeyCode::Enter));
        assert_eq!(app.session.messages().len(), 1);
        assert!(!app.session.awaiting_reply());
    }

    #[test]
    fn test_file_picker_flow() {
        let mut app = app();
        handle_event(&mut app, ctrl('o'));
        assert_eq!(app.input_mode, InputMode::SelectingFile);

        handle_event(&mut app, AppEvent::Paste("/tmp/data.xlsx\n".to_string()));
        // 'q' is text here, not quit
        handle_event(&mut app, key(KeyCode::Char('q')));
        handle_event(&mut app, key(KeyCode::Backspace));
        handle_event(&mut app, key(KeyCode::Enter));

        assert_eq!(app.input_mode, InputMode::Editing);
        assert!(!app.should_quit);
        assert_eq!(app.session.active_file().unwrap().name, "data.xlsx");
    }

    #[test]
    fn test_file_picker_escape_keeps_previous_selection() {
        let mut app = app();
        app.select_file("/tmp/a.csv");
        handle_event(&mut app, ctrl('o'));
        assert_eq!(app.file_input, "/tmp/a.csv");
        handle_event(&mut app, key(KeyCode::Esc));
        assert_eq!(app.session.active_file().unwrap().name, "a.csv");
    }

    #[test]
    fn test_upload_shortcut_without_file_sets_prompt() {
        let mut app = app();
        handle_event(&mut app, ctrl('u'));
        assert_eq!(
            app.session.upload_status().to_string(),
            "Please select a file first."
        );
        assert!(!app.has_running_tasks());
    }

    #[test]
    fn test_mouse_outside_chat_is_ignored() {
        let mut app = app();
        app.chat_area = Some(Rect::new(10, 0, 10, 10));
        app.chat_scroll = 5;
        handle_event(
            &mut app,
            AppEvent::Mouse(MouseEvent {
                kind: MouseEventKind::ScrollUp,
                column: 2,
                row: 2,
                modifiers: KeyModifiers::NONE,
            }),
        );
        assert_eq!(app.chat_scroll, 5);

        handle_event(
            &mut app,
            AppEvent::Mouse(MouseEvent {
                kind: MouseEventKind::ScrollUp,
                column: 12,
                row: 2,
                modifiers: KeyModifiers::NONE,
            }),
        );
        assert_eq!(app.chat_scroll, 2);
    }
}
