use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
    Frame,
};

use proctor::app::App;
use proctor::result::CompletionReason;
use proctor::scoring::PASS_THRESHOLD_PERCENT;
use proctor::session::SessionState;

use super::{bold, dim, format_clock};

const OPTION_LABELS: [char; 4] = ['A', 'B', 'C', 'D'];

/// A UI Screen boundary: responsible for rendering one session state
pub trait Screen {
    fn render(&self, app: &App, f: &mut Frame, area: Rect);
}

pub struct InstructionsScreen;

impl Screen for InstructionsScreen {
    fn render(&self, app: &App, f: &mut Frame, area: Rect) {
        let session = &app.session;
        let config = session.config();
        let lines = vec![
            Line::from(Span::styled(
                format!("{} test", session.filter().module),
                bold().fg(Color::Cyan),
            )),
            Line::from(""),
            Line::from(format!(
                "{} questions, {} on the clock.",
                session.len(),
                format_clock(config.budget.as_secs())
            )),
            Line::from(format!(
                "You need {PASS_THRESHOLD_PERCENT}% to pass. Unanswered questions count as wrong."
            )),
            Line::from("When the time runs out your answers are submitted automatically."),
            Line::from(""),
            Line::from(Span::styled(
                "1-4 / a-d answer   ←/→ move   backspace clear   s submit",
                dim(),
            )),
            Line::from(""),
            Line::from(Span::styled("Press Enter to begin, Esc to quit", bold())),
        ];

        let body = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Instructions"));
        f.render_widget(body, area);
    }
}

pub struct QuestionScreen;

impl Screen for QuestionScreen {
    fn render(&self, app: &App, f: &mut Frame, area: Rect) {
        let session = &app.session;
        let index = session.current_index();
        let question = session.current_question();
        let selected = session.ledger().selected(index);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(6),
                Constraint::Length(3),
            ])
            .split(area);

        let remaining = session.time_remaining_secs();
        let budget = session.config().budget.as_secs().max(1);
        let gauge_color = if remaining * 5 < budget { Color::Red } else { Color::Green };
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Time left"))
            .gauge_style(Style::default().fg(gauge_color))
            .label(format_clock(remaining))
            .ratio((remaining as f64 / budget as f64).clamp(0.0, 1.0));
        f.render_widget(gauge, chunks[0]);

        let mut lines = vec![Line::from(Span::styled(question.text.clone(), bold())), Line::from("")];
        for (i, option) in question.options.iter().enumerate() {
            let chosen = selected == Some(i as u8);
            let marker = if chosen { "●" } else { "○" };
            let style = if chosen {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            lines.push(Line::from(Span::styled(
                format!("{marker} {}. {option}", OPTION_LABELS[i]),
                style,
            )));
        }
        let elapsed = session.ledger().elapsed(index).as_secs();
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(
                "{}s on this question (suggested {}s)",
                elapsed, question.allocated_time_seconds
            ),
            dim(),
        )));

        let title = format!("Question {} of {}", index + 1, session.len());
        let body = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(body, chunks[1]);

        let progress: Vec<Span> = (0..session.len())
            .map(|i| {
                let answered = session.ledger().selected(i).is_some();
                let mut style = if answered {
                    Style::default().fg(Color::Green)
                } else {
                    dim()
                };
                if i == index {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                Span::styled(format!(" {} ", i + 1), style)
            })
            .collect();
        let live = session.live_metrics();
        let status = Paragraph::new(Line::from(progress)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} of {} answered", session.len() - live.unanswered_count, session.len())),
        );
        f.render_widget(status, chunks[2]);
    }
}

pub struct ResultsScreen;

impl Screen for ResultsScreen {
    fn render(&self, app: &App, f: &mut Frame, area: Rect) {
        let Ok(result) = app.session.result() else {
            return;
        };

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(7), Constraint::Min(0)])
            .split(area);

        let metrics = &result.performance_metrics;
        let (verdict, verdict_color) = if result.passed {
            ("PASSED", Color::Green)
        } else {
            ("NOT PASSED", Color::Red)
        };
        let reason = match result.timing_details.completion_reason {
            CompletionReason::Submitted => "submitted",
            CompletionReason::Expired => "time expired",
        };
        let summary = vec![
            Line::from(vec![
                Span::styled(format!("{}%  ", result.score_percent), bold()),
                Span::styled(verdict, bold().fg(verdict_color)),
                Span::styled(format!("  ({reason})"), dim()),
            ]),
            Line::from(format!(
                "{} correct   {} incorrect   {} unanswered",
                metrics.correct_count, metrics.incorrect_count, metrics.unanswered_count
            )),
            Line::from(format!(
                "{:.2} min total, {:.1}s per question",
                result.total_time_minutes, metrics.average_time_per_question_seconds
            )),
            Line::from(Span::styled(
                match app.session.saved_id() {
                    Some(id) => format!("saved as {id}"),
                    None => "not saved".to_string(),
                },
                dim(),
            )),
            Line::from(Span::styled("↑/↓ scroll   r retake   q quit", dim())),
        ];
        f.render_widget(
            Paragraph::new(summary).block(Block::default().borders(Borders::ALL).title("Result")),
            chunks[0],
        );

        let mut review = Vec::new();
        for (i, entry) in result.questions.iter().enumerate().skip(app.review_scroll) {
            let (mark, color) = if entry.is_correct {
                ("✓", Color::Green)
            } else {
                ("✗", Color::Red)
            };
            review.push(Line::from(vec![
                Span::styled(format!("{mark} {}. ", i + 1), bold().fg(color)),
                Span::raw(entry.text.clone()),
            ]));
            review.push(Line::from(format!(
                "   your answer: {}   correct: {}   {}s",
                entry.selected_option_text.as_deref().unwrap_or("—"),
                entry.correct_option_text,
                entry.time_spent_seconds
            )));
            if let Some(explanation) = &entry.explanation {
                review.push(Line::from(Span::styled(format!("   {explanation}"), dim())));
            }
        }
        f.render_widget(
            Paragraph::new(review)
                .wrap(Wrap { trim: false })
                .block(Block::default().borders(Borders::ALL).title("Review")),
            chunks[1],
        );
    }
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen(state: SessionState) -> Box<dyn Screen> {
    match state {
        SessionState::NotStarted | SessionState::ShowingInstructions => Box::new(InstructionsScreen),
        SessionState::InProgress => Box::new(QuestionScreen),
        SessionState::Completed => Box::new(ResultsScreen),
    }
}
