use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use crate::dataset::SUPPORTED_EXTENSIONS;
use crate::render::{self, SummaryRenderer};

const SIDEBAR_WIDTH: u16 = 32;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    // Sidebar collapses on narrow terminals
    let sidebar_width = if body_area.width >= SIDEBAR_WIDTH * 3 { SIDEBAR_WIDTH } else { 0 };
    let [sidebar_area, main_area] = Layout::horizontal([
        Constraint::Length(sidebar_width),
        Constraint::Min(0),
    ])
    .areas(body_area);

    if sidebar_width > 0 {
        render_sidebar(app, frame, sidebar_area);
    }
    render_chat(app, frame, main_area);
    render_footer(app, frame, footer_area);

    if app.input_mode == InputMode::SelectingFile {
        render_file_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (dot, state) = if app.session.awaiting_reply() {
        (Span::styled(" ● ", Style::default().fg(Color::Yellow)), "Analyzing")
    } else {
        (Span::styled(" ● ", Style::default().fg(Color::Green)), "Session Active")
    };

    let title = Line::from(vec![
        Span::styled(" Data Analyst ", Style::default().fg(Color::Cyan).bold()),
        dot,
        Span::raw(state),
        Span::styled(format!("  {}", app.api_url), Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_sidebar(app: &App, frame: &mut Frame, area: Rect) {
    let [dataset_area, info_area] = Layout::vertical([
        Constraint::Length(7),
        Constraint::Min(0),
    ])
    .areas(area);

    let dataset_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Active Dataset ");

    let mut lines: Vec<Line> = Vec::new();
    match app.session.active_file() {
        Some(file) => {
            lines.push(Line::from(Span::styled(
                file.name.clone(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            )));
            if !file.is_supported() {
                lines.push(Line::from(Span::styled(
                    "unrecognized file type",
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
        None => lines.push(Line::from(Span::styled(
            "No file selected",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    lines.push(Line::default());

    let status = app.session.upload_status();
    let status_color = if status.is_failure() {
        Color::Red
    } else if app.session.uploading() {
        Color::Yellow
    } else {
        Color::Green
    };
    lines.push(Line::from(Span::styled(
        status.to_string(),
        Style::default().fg(status_color),
    )));

    let dataset = Paragraph::new(Text::from(lines))
        .block(dataset_block)
        .wrap(Wrap { trim: true });
    frame.render_widget(dataset, dataset_area);

    let info_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Capabilities ");

    let muted = Style::default().fg(Color::Gray);
    let info = Paragraph::new(Text::from(vec![
        Line::from(Span::styled("• Exploratory data analysis", muted)),
        Line::from(Span::styled("• Statistical summaries", muted)),
        Line::from(Span::styled("• Charts", muted)),
        Line::default(),
        Line::from(Span::styled(
            format!("Formats: {}", SUPPORTED_EXTENSIONS.join(", ")),
            Style::default().fg(Color::DarkGray),
        )),
    ]))
    .block(info_block)
    .wrap(Wrap { trim: true });
    frame.render_widget(info, info_area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_area = Some(chat_area);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);
    if app.follow_tail {
        app.scroll_to_bottom();
    }

    let chat_border_color = if app.input_mode == InputMode::Normal {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(chat_border_color))
        .title(" Conversation ");

    let lines = render::transcript_lines(
        app.session.messages(),
        app.session.awaiting_reply(),
        app.animation_frame,
        &SummaryRenderer,
    );

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_input(app, frame, input_area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let input_border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Ask a question about your data ");

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .session
        .pending_input()
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input_style = if app.session.awaiting_reply() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };
    let input = Paragraph::new(visible_text)
        .style(input_style)
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        InputMode::SelectingFile => (" FILE ", Style::default().bg(Color::Magenta).fg(Color::White)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let pairs: &[(&str, &str)] = match app.input_mode {
        InputMode::Normal => &[
            ("j/k", "scroll"),
            ("i", "type"),
            ("f", "file"),
            ("u", "upload"),
            ("q", "quit"),
        ],
        InputMode::Editing => &[
            ("Enter", "send"),
            ("^O", "file"),
            ("^U", "upload"),
            ("Esc", "stop typing"),
        ],
        InputMode::SelectingFile => &[("Enter", "select"), ("Esc", "cancel")],
    };

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];
    for (key, label) in pairs {
        spans.push(Span::styled(format!(" {key} "), key_style));
        spans.push(Span::styled(format!(" {label} "), label_style));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_file_picker(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 64.min(area.width.saturating_sub(4));
    let popup_height = 7;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Select Dataset ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Type or paste a file path. Enter to select, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    // Show the tail of long paths so the file name stays visible
    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let width = input_area.width as usize;
    let char_count = app.file_input.chars().count();
    let skip = char_count.saturating_sub(width.saturating_sub(1));
    let visible: String = app.file_input.chars().skip(skip).collect();

    let input = Paragraph::new(visible.clone()).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = visible.chars().count().min(width) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let hint = Paragraph::new(format!("Formats: {}", SUPPORTED_EXTENSIONS.join(", ")))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(hint, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyst::{QueryReply, Transport};
    use crate::dataset::DatasetFile;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;

    struct Never;

    #[async_trait]
    impl Transport for Never {
        async fn upload_dataset(&self, _file: &DatasetFile) -> Result<(), TransportError> {
            Ok(())
        }

        async fn submit_query(&self, _text: &str) -> Result<QueryReply, TransportError> {
            Err(TransportError::Aborted("unused".to_string()))
        }
    }

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        let mut text = String::new();
        for row in buffer.content.chunks(width) {
            for cell in row {
                text.push_str(cell.symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_renders_greeting_and_dataset_status() {
        let mut app = App::new(Arc::new(Never), "http://localhost:8000");

        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        let text = screen_text(&terminal);

        assert!(text.contains("Data Analyst"));
        assert!(text.contains("No file selected"));
        assert!(text.contains("Analyst:"));
        assert!(text.contains("INSERT"));

        // Upload with nothing selected only changes the status line
        app.start_upload();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        let text = screen_text(&terminal);
        assert!(text.contains("Please select a file first."));

        app.select_file("/tmp/sales.csv");
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        let text = screen_text(&terminal);
        assert!(text.contains("sales.csv"));
        assert!(!text.contains("Please select a file first."));
    }

    #[test]
    fn test_file_picker_popup() {
        let mut app = App::new(Arc::new(Never), "http://localhost:8000");
        app.open_file_picker();
        app.file_input = "/data/q3.json".to_string();

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        let text = screen_text(&terminal);

        assert!(text.contains("Select Dataset"));
        assert!(text.contains("/data/q3.json"));
    }
}
