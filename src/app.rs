use std::path::PathBuf;
use std::sync::Arc;

use ratatui::layout::Rect;
use tokio::task::JoinHandle;

use crate::analyst::{QueryReply, Transport};
use crate::dataset::DatasetFile;
use crate::error::TransportError;
use crate::render::{self, SummaryRenderer};
use crate::session::{QueryTicket, Session, UploadTicket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    SelectingFile,
}

type QueryTask = JoinHandle<Result<QueryReply, TransportError>>;
type UploadTask = JoinHandle<Result<(), TransportError>>;

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub session: Session,
    pub api_url: String,

    // Query input state
    pub input_cursor: usize, // cursor position in the session's pending input, in chars

    // File picker state
    pub file_input: String,

    // Chat pane state
    pub chat_scroll: u16,
    pub follow_tail: bool,
    pub chat_height: u16, // Inner height of the chat pane, for scroll calculations
    pub chat_width: u16,  // Inner width of the chat pane, for wrap calculations
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Charts are written here as JSON when set
    pub chart_dir: Option<PathBuf>,
    exported: usize,

    transport: Arc<dyn Transport>,
    query_task: Option<(QueryTicket, QueryTask)>,
    upload_tasks: Vec<(UploadTicket, UploadTask)>,
}

impl App {
    pub fn new(transport: Arc<dyn Transport>, api_url: impl Into<String>) -> Self {
        let session = Session::new();
        let exported = session.messages().len();

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            session,
            api_url: api_url.into(),
            input_cursor: 0,
            file_input: String::new(),
            chat_scroll: 0,
            follow_tail: true,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,
            chart_dir: None,
            exported,
            transport,
            query_task: None,
            upload_tasks: Vec::new(),
        }
    }

    pub fn with_chart_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.chart_dir = dir;
        self
    }

    /// Preselect a dataset, as if the user had picked it
    pub fn select_file(&mut self, path: &str) {
        let path = expand_home(path.trim());
        if path.as_os_str().is_empty() {
            return;
        }
        self.session.select_file(DatasetFile::new(path));
    }

    pub fn open_file_picker(&mut self) {
        self.file_input = self
            .session
            .active_file()
            .map(|f| f.path.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.input_mode = InputMode::SelectingFile;
    }

    pub fn confirm_file_picker(&mut self) {
        let input = std::mem::take(&mut self.file_input);
        self.select_file(&input);
        self.input_mode = InputMode::Editing;
    }

    /// Send the pending input. Ignored while a reply is outstanding or when
    /// the input is blank.
    pub fn send_query(&mut self) {
        let Some(ticket) = self.session.submit_pending() else {
            return;
        };
        self.input_cursor = 0;

        let transport = Arc::clone(&self.transport);
        let text = ticket.text().to_string();
        let handle = tokio::spawn(async move { transport.submit_query(&text).await });
        self.query_task = Some((ticket, handle));

        // Scroll to bottom so "Analyzing..." is visible
        self.follow_tail = true;
        self.scroll_to_bottom();
    }

    pub fn start_upload(&mut self) {
        let ticket = match self.session.begin_upload() {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::debug!(error = %e, "upload not started");
                return;
            }
        };

        let transport = Arc::clone(&self.transport);
        let file = ticket.file().clone();
        let handle = tokio::spawn(async move { transport.upload_dataset(&file).await });
        self.upload_tasks.push((ticket, handle));
    }

    /// Hand finished round trips back to the session
    pub async fn poll_tasks(&mut self) {
        let mut changed = false;

        if self
            .query_task
            .as_ref()
            .is_some_and(|(_, handle)| handle.is_finished())
        {
            if let Some((ticket, handle)) = self.query_task.take() {
                let result = handle.await.map_err(TransportError::from).and_then(|r| r);
                self.session.finish_query(ticket, result);
                changed = true;
            }
        }

        let mut i = 0;
        while i < self.upload_tasks.len() {
            if self.upload_tasks[i].1.is_finished() {
                let (ticket, handle) = self.upload_tasks.remove(i);
                let result = handle.await.map_err(TransportError::from).and_then(|r| r);
                // Failures are already reflected in the status line
                let _ = self.session.finish_upload(ticket, result);
                changed = true;
            } else {
                i += 1;
            }
        }

        if changed {
            self.export_new_charts();
            if self.follow_tail {
                self.scroll_to_bottom();
            }
        }
    }

    pub fn has_running_tasks(&self) -> bool {
        self.query_task.is_some() || !self.upload_tasks.is_empty()
    }

    fn export_new_charts(&mut self) {
        let messages = self.session.messages();
        let new = &messages[self.exported.min(messages.len())..];

        if let Some(dir) = &self.chart_dir {
            for msg in new {
                if let Some(chart) = msg.chart() {
                    let path = dir.join(format!("chart-{}.json", msg.id().get()));
                    match chart.save(&path) {
                        Ok(()) => tracing::info!(path = %path.display(), "chart saved"),
                        Err(e) => tracing::warn!(error = %e, "could not save chart"),
                    }
                }
            }
        }
        self.exported = messages.len();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.awaiting_reply() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    fn content_height(&self) -> u16 {
        let lines = render::transcript_lines(
            self.session.messages(),
            self.session.awaiting_reply(),
            self.animation_frame,
            &SummaryRenderer,
        );
        render::wrapped_height(&lines, self.chat_width)
    }

    fn max_scroll(&self) -> u16 {
        self.content_height().saturating_sub(self.chat_height)
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
    }

    pub fn scroll_down(&mut self, rows: u16) {
        let max = self.max_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(rows).min(max);
        self.follow_tail = self.chat_scroll >= max;
    }

    pub fn scroll_up(&mut self, rows: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(rows);
        self.follow_tail = false;
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_tail = false;
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    // Input editing, cursor counted in chars
    pub fn insert_char(&mut self, c: char) {
        let input = self.session.pending_input_mut();
        let byte_pos = char_to_byte_index(input, self.input_cursor);
        input.insert(byte_pos, c);
        self.input_cursor += 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        for c in text.chars().filter(|c| !c.is_control()) {
            self.insert_char(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
            let input = self.session.pending_input_mut();
            let byte_pos = char_to_byte_index(input, self.input_cursor);
            input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        let cursor = self.input_cursor;
        let input = self.session.pending_input_mut();
        if cursor < input.chars().count() {
            let byte_pos = char_to_byte_index(input, cursor);
            input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let char_count = self.session.pending_input().chars().count();
        self.input_cursor = (self.input_cursor + 1).min(char_count);
    }

    pub fn cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.input_cursor = self.session.pending_input().chars().count();
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FALLBACK_REPLY, GREETING};
    use crate::store::Role;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Holds every query until released, then answers with a chart
    struct GatedTransport {
        release: Notify,
        upload_fails: bool,
    }

    impl GatedTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                release: Notify::new(),
                upload_fails: false,
            })
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn upload_dataset(&self, _file: &DatasetFile) -> Result<(), TransportError> {
            if self.upload_fails {
                Err(TransportError::Status { status: 500, detail: None })
            } else {
                Ok(())
            }
        }

        async fn submit_query(&self, text: &str) -> Result<QueryReply, TransportError> {
            self.release.notified().await;
            if text == "crash" {
                panic!("backend task died");
            }
            Ok(QueryReply {
                answer: format!("answer to {text}"),
                plot: serde_json::from_value(json!({"data": [{"type": "bar"}], "layout": {}})).ok(),
            })
        }
    }

    async fn settle(app: &mut App) {
        for _ in 0..200 {
            app.poll_tasks().await;
            if !app.has_running_tasks() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("tasks did not finish");
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.insert_char(c);
        }
    }

    #[tokio::test]
    async fn test_send_appends_user_message_immediately() {
        let transport = GatedTransport::new();
        let mut app = App::new(transport.clone(), "http://test");

        type_text(&mut app, "total revenue?");
        app.send_query();

        assert_eq!(app.session.messages().len(), 2);
        assert_eq!(app.session.messages()[1].role(), Role::User);
        assert_eq!(app.session.pending_input(), "");
        assert_eq!(app.input_cursor, 0);
        assert!(app.session.awaiting_reply());

        // A second send while waiting is ignored
        type_text(&mut app, "again");
        app.send_query();
        assert_eq!(app.session.messages().len(), 2);
        assert_eq!(app.session.pending_input(), "again");

        transport.release.notify_one();
        settle(&mut app).await;

        let last = app.session.messages().last().unwrap();
        assert_eq!(last.text(), "answer to total revenue?");
        assert!(last.chart().is_some());
        assert!(!app.session.awaiting_reply());
    }

    #[tokio::test]
    async fn test_panicked_task_releases_flag() {
        let transport = GatedTransport::new();
        let mut app = App::new(transport.clone(), "http://test");

        type_text(&mut app, "crash");
        app.send_query();
        transport.release.notify_one();
        settle(&mut app).await;

        assert_eq!(app.session.messages().last().unwrap().text(), FALLBACK_REPLY);
        assert!(!app.session.awaiting_reply());
    }

    #[tokio::test]
    async fn test_upload_without_file_spawns_nothing() {
        let mut app = App::new(GatedTransport::new(), "http://test");
        app.start_upload();
        assert!(!app.has_running_tasks());
        assert_eq!(
            app.session.upload_status().to_string(),
            "Please select a file first."
        );
        assert_eq!(app.session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_then_query_keeps_invocation_order() {
        let transport = GatedTransport::new();
        let mut app = App::new(transport.clone(), "http://test");

        app.open_file_picker();
        assert_eq!(app.input_mode, InputMode::SelectingFile);
        app.file_input = "  /data/sales.csv ".to_string();
        app.confirm_file_picker();
        assert_eq!(app.input_mode, InputMode::Editing);

        app.start_upload();
        type_text(&mut app, "top region");
        app.send_query();
        transport.release.notify_one();
        settle(&mut app).await;

        let texts: Vec<&str> = app.session.messages().iter().map(|m| m.text()).collect();
        assert_eq!(
            texts,
            vec![
                GREETING,
                "top region",
                "System: Dataset \"sales.csv\" loaded successfully. I am now ready to analyze it.",
                "answer to top region",
            ]
        );
        assert_eq!(app.session.active_file().unwrap().name, "sales.csv");
    }

    #[tokio::test]
    async fn test_charts_exported_when_dir_set() {
        let dir = tempfile::tempdir().unwrap();
        let transport = GatedTransport::new();
        let mut app =
            App::new(transport.clone(), "http://test").with_chart_dir(Some(dir.path().to_path_buf()));

        type_text(&mut app, "plot");
        app.send_query();
        transport.release.notify_one();
        settle(&mut app).await;

        let id = app.session.messages().last().unwrap().id().get();
        assert!(dir.path().join(format!("chart-{id}.json")).exists());
    }

    #[test]
    fn test_utf8_input_editing() {
        let mut app = App::new(GatedTransport::new(), "http://test");
        type_text(&mut app, "héllo");
        app.cursor_left();
        app.backspace();
        assert_eq!(app.session.pending_input(), "hélo");
        app.cursor_home();
        app.delete();
        assert_eq!(app.session.pending_input(), "élo");
        app.cursor_end();
        app.insert_str("!\n");
        assert_eq!(app.session.pending_input(), "élo!");
    }

    #[test]
    fn test_scrolling_clamps() {
        let mut app = App::new(GatedTransport::new(), "http://test");
        app.chat_height = 2;
        app.chat_width = 20;
        app.scroll_to_bottom();
        let bottom = app.chat_scroll;
        assert!(bottom > 0);

        app.scroll_down(100);
        assert_eq!(app.chat_scroll, bottom);
        assert!(app.follow_tail);

        app.scroll_up(100);
        assert_eq!(app.chat_scroll, 0);
        assert!(!app.follow_tail);
    }
}
