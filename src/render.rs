//! Turns the conversation log into terminal lines
//!
//! Text is styled here; charts are handed to a [`ChartRenderer`] and never
//! interpreted by anything else.

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

use crate::chart::ChartPayload;
use crate::store::{Message, MessageTag, Role};

/// Draws a chart payload as lines of the transcript
pub trait ChartRenderer {
    fn render(&self, chart: &ChartPayload) -> Vec<Line<'static>>;
}

/// Text summary of a chart: its title and one line per trace
pub struct SummaryRenderer;

impl ChartRenderer for SummaryRenderer {
    fn render(&self, chart: &ChartPayload) -> Vec<Line<'static>> {
        let frame_style = Style::default().fg(Color::Magenta);
        let title = chart.title().unwrap_or_else(|| "Chart".to_string());

        let mut lines = vec![Line::from(vec![
            Span::styled("┌ ", frame_style),
            Span::styled(title, frame_style.add_modifier(Modifier::BOLD)),
        ])];

        let traces = chart.traces();
        if traces.is_empty() {
            lines.push(Line::from(vec![
                Span::styled("│ ", frame_style),
                Span::styled("(no traces)", Style::default().fg(Color::DarkGray)),
            ]));
        }
        for trace in traces {
            let mut label = trace.kind;
            if let Some(name) = trace.name {
                label.push_str(&format!(" \"{name}\""));
            }
            lines.push(Line::from(vec![
                Span::styled("│ ", frame_style),
                Span::raw(label),
                Span::styled(
                    format!(" · {} points", trace.points),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
        }
        lines.push(Line::from(Span::styled("└", frame_style)));
        lines
    }
}

/// Parse a line of text and convert **bold** markdown to styled spans
pub fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(len) = after.find("**") else {
            break;
        };
        if len == 0 {
            // "****" is not a bold span
            spans.push(Span::raw(rest[..start + 4].to_string()));
            rest = &after[2..];
            continue;
        }
        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        spans.push(Span::styled(
            after[..len].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after[len + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Build the transcript for the chat pane. `animation_frame` drives the
/// ellipsis of the pending indicator shown while a reply is outstanding.
pub fn transcript_lines(
    messages: &[Message],
    awaiting_reply: bool,
    animation_frame: u8,
    charts: &dyn ChartRenderer,
) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for msg in messages {
        match (msg.role(), msg.tag()) {
            (Role::User, _) => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.text().lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            (Role::Bot, MessageTag::System) => {
                lines.push(Line::from(Span::styled(
                    msg.text().to_string(),
                    Style::default().fg(Color::Green).add_modifier(Modifier::ITALIC),
                )));
            }
            (Role::Bot, MessageTag::Chat) => {
                lines.push(Line::from(Span::styled(
                    "Analyst:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in msg.text().lines() {
                    lines.push(parse_markdown_line(line));
                }
                if let Some(chart) = msg.chart() {
                    lines.extend(charts.render(chart));
                }
            }
        }
        lines.push(Line::default());
    }

    if awaiting_reply {
        lines.push(Line::from(Span::styled(
            "Analyst:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((animation_frame as usize % 3) + 1);
        lines.push(Line::from(Span::styled(
            format!("Analyzing{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

/// Number of rows `lines` occupy once word-wrapped to `width` columns
pub fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let rows: usize = lines.iter().map(|line| wrapped_rows(line, width)).sum();
    rows.min(u16::MAX as usize) as u16
}

/// Greedy word wrap: a word that does not fit moves to the next row, a word
/// wider than the pane is split, and whitespace past the edge is dropped.
fn wrapped_rows(line: &Line, width: usize) -> usize {
    let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();

    let mut rows = 1;
    let mut used = 0;
    for token in text.split_inclusive(char::is_whitespace) {
        let word = token.trim_end_matches(char::is_whitespace);
        let word_width = Span::raw(word).width();
        let gap_width = Span::raw(&token[word.len()..]).width();

        if used > 0 && used + word_width > width {
            rows += 1;
            used = 0;
        }
        if word_width > width {
            let extra = (word_width - 1) / width;
            rows += extra;
            used = word_width - extra * width;
        } else {
            used += word_width;
        }
        used = (used + gap_width).min(width);
    }
    rows
}
