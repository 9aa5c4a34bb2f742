use chrono::{DateTime, Utc};
use std::collections::HashSet;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use time_humanize::HumanTime;
use unicode_width::UnicodeWidthStr;

use crate::app::{App, AppState, NoticeKind};
use crate::leaderboard::LeaderboardEntry;
use crate::metrics::mismatches;
use crate::session::SessionDuration;
use crate::timer::TickScheduler;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;
const NEWLINE_MARKER: &str = "↵";

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn correct_style() -> Style {
    bold().fg(Color::Green)
}

fn wrong_style() -> Style {
    bold().fg(Color::Red)
}

fn pending_style() -> Style {
    bold().add_modifier(Modifier::DIM)
}

fn cursor_style() -> Style {
    pending_style().add_modifier(Modifier::UNDERLINED | Modifier::REVERSED)
}

impl<S: TickScheduler> Widget for &App<S> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.state == AppState::Leaderboard {
            render_leaderboard(self, area, buf);
            return;
        }

        render_typing(self, area, buf);

        if self.state == AppState::Results {
            render_results(self, area, buf);
        }
    }
}

fn render_typing<S: TickScheduler>(app: &App<S>, area: Rect, buf: &mut Buffer) {
    let session = &app.session;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Length(1), // durations
            Constraint::Length(1), // timer
            Constraint::Length(1), // padding
            Constraint::Min(1),    // snippet
            Constraint::Length(1), // stats
            Constraint::Length(1), // notice
            Constraint::Length(1), // legend
        ])
        .split(area);

    Paragraph::new(Span::styled(
        "keystroke-quest: code typing test",
        bold().fg(Color::Cyan),
    ))
    .alignment(Alignment::Center)
    .render(chunks[0], buf);

    Paragraph::new(duration_bar(session.duration(), session.has_started()))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    let timer_text = if session.has_started() {
        format!("Time left: {}s", session.time_left())
    } else {
        format!("Timer: not started ({}s)", session.time_left())
    };
    Paragraph::new(Span::styled(timer_text, pending_style()))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    render_snippet(session.snippet(), session.input(), chunks[4], buf);

    Paragraph::new(Span::styled(
        format!("{}% acc   {} wpm", session.accuracy(), session.wpm()),
        bold(),
    ))
    .alignment(Alignment::Center)
    .render(chunks[5], buf);

    if let Some(notice) = &app.notice {
        let style = match notice.kind {
            NoticeKind::Info => Style::default().fg(Color::Cyan),
            NoticeKind::Error => Style::default().fg(Color::Yellow),
        };
        Paragraph::new(Span::styled(notice.text.as_str(), style))
            .alignment(Alignment::Center)
            .render(chunks[6], buf);
    }

    let legend = if session.has_finished() {
        "(enter) results / (ctrl+r) new / (ctrl+t) retry / (ctrl+l) leaderboard / (esc)ape"
    } else if session.has_started() {
        "(ctrl+r) new / (ctrl+t) retry / (ctrl+l) leaderboard / (esc)ape"
    } else {
        "(←/→) duration / (ctrl+r) new / (ctrl+l) leaderboard / (esc)ape"
    };
    Paragraph::new(Span::styled(
        legend,
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .render(chunks[7], buf);
}

fn duration_bar(selected: SessionDuration, locked: bool) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, d) in SessionDuration::ALL.into_iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("  "));
        }
        let style = match (d == selected, locked) {
            (true, _) => bold().fg(Color::Black).bg(Color::Cyan),
            (false, true) => pending_style(),
            (false, false) => Style::default().fg(Color::Gray),
        };
        spans.push(Span::styled(format!(" {d} "), style));
    }
    Line::from(spans)
}

/// Snippet text styled against the input, one `Line` per snippet line.
/// Typed characters past the end of the snippet trail the last line.
pub fn snippet_lines(snippet: &str, input: &str) -> Vec<Line<'static>> {
    let typed: Vec<char> = input.chars().collect();
    let wrong: HashSet<usize> = mismatches(snippet, input).into_iter().collect();
    let mut lines = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut len = 0;

    for (idx, expected) in snippet.chars().enumerate() {
        len = idx + 1;
        let style = if wrong.contains(&idx) {
            wrong_style()
        } else if idx < typed.len() {
            correct_style()
        } else if idx == typed.len() {
            cursor_style()
        } else {
            pending_style()
        };

        if expected == '\n' {
            spans.push(Span::styled(NEWLINE_MARKER, style));
            lines.push(Line::from(std::mem::take(&mut spans)));
            continue;
        }

        let shown = if expected == ' ' && wrong.contains(&idx) {
            "·".to_string()
        } else {
            expected.to_string()
        };
        spans.push(Span::styled(shown, style));
    }

    if typed.len() > len {
        let extra: String = typed[len..]
            .iter()
            .map(|c| match c {
                '\n' => NEWLINE_MARKER.to_string(),
                ' ' => "·".to_string(),
                c => c.to_string(),
            })
            .collect();
        spans.push(Span::styled(extra, wrong_style().bg(Color::DarkGray)));
    } else if typed.len() == len {
        spans.push(Span::styled(" ", cursor_style()));
    }

    lines.push(Line::from(spans));
    lines
}

fn render_snippet(snippet: &str, input: &str, area: Rect, buf: &mut Buffer) {
    let widest = snippet.lines().map(|l| l.width()).max().unwrap_or(0);
    let widest = u16::try_from(widest).unwrap_or(u16::MAX).saturating_add(2);
    let left_pad = area.width.saturating_sub(widest) / 2;
    let area = Rect {
        x: area.x + left_pad,
        width: area.width - left_pad,
        ..area
    };

    // keep the cursor's line in view for snippets taller than the area
    let cursor_line = u16::try_from(input.matches('\n').count()).unwrap_or(u16::MAX);
    let scroll = cursor_line.saturating_sub(area.height / 2);

    Paragraph::new(snippet_lines(snippet, input))
        .scroll((scroll, 0))
        .render(area, buf);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn render_results<S: TickScheduler>(app: &App<S>, area: Rect, buf: &mut Buffer) {
    let popup = centered_rect(50, 11, area);
    Clear.render(popup, buf);

    let score = app.last_score().unwrap_or_else(|| app.session.score());
    let saved = if app.score_submitted() {
        Span::styled("saved", correct_style())
    } else {
        Span::styled("(enter) save", Style::default().add_modifier(Modifier::ITALIC))
    };

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(format!("WPM: {}", score.wpm), bold())),
        Line::from(Span::styled(format!("Accuracy: {}%", score.accuracy), bold())),
        Line::from(""),
        Line::from(vec![
            Span::raw("Username: "),
            Span::styled(app.username.clone(), bold().fg(Color::Cyan)),
            Span::styled("_", cursor_style()),
        ]),
        Line::from(""),
        Line::from(saved),
        Line::from(Span::styled(
            "(tab) leaderboard / (esc) close",
            Style::default().add_modifier(Modifier::ITALIC),
        )),
    ];

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Your Results")
                .title_alignment(Alignment::Center),
        )
        .render(popup, buf);
}

/// "2 minutes ago" style age of a leaderboard entry.
pub fn age_label(submitted_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - submitted_at).num_seconds().max(0);
    HumanTime::from_seconds(-secs).to_string()
}

pub fn leaderboard_lines(entries: &[LeaderboardEntry], now: DateTime<Utc>) -> Vec<Line<'static>> {
    if entries.is_empty() {
        return vec![Line::from(Span::styled(
            "No scores yet. Finish a test and save your score!",
            Style::default().fg(Color::Gray),
        ))];
    }

    let name_width = entries
        .iter()
        .map(|e| e.username.width())
        .max()
        .unwrap_or(0);

    entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let rank_style = match i {
                0 => bold().fg(Color::Yellow),
                1 | 2 => bold(),
                _ => Style::default(),
            };
            let pad = " ".repeat(name_width - e.username.width());
            Line::from(vec![
                Span::styled(format!("{:>3}. ", i + 1), rank_style),
                Span::styled(format!("{}{pad}", e.username), rank_style),
                Span::styled(format!("  {:>4} WPM", e.wpm), bold().fg(Color::Green)),
                Span::styled(
                    format!("  {:>3}% acc  {}", e.accuracy, age_label(e.submitted_at, now)),
                    pending_style(),
                ),
            ])
        })
        .collect()
}

fn render_leaderboard<S: TickScheduler>(app: &App<S>, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1), // notice
            Constraint::Length(1), // legend
        ])
        .split(area);

    Paragraph::new(leaderboard_lines(&app.leaderboard(), Utc::now()))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Leaderboard")
                .title_alignment(Alignment::Center),
        )
        .wrap(Wrap { trim: false })
        .render(chunks[0], buf);

    if let Some(notice) = &app.notice {
        Paragraph::new(Span::styled(
            notice.text.as_str(),
            Style::default().fg(Color::Cyan),
        ))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);
    }

    Paragraph::new(Span::styled(
        "(esc) back / (ctrl+r) new test",
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .render(chunks[2], buf);
}
