//! UI rendering with ratatui.
//!
//! Two-column layout: conversation sidebar on the left, chat column on the
//! right. The chat panel materializes only the rows inside the viewport
//! window, so drawing cost tracks the window size rather than the history.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, List, ListItem, ListState, Paragraph, Scrollbar, ScrollbarOrientation,
    ScrollbarState, Wrap,
};
use ratatui::Frame;

use coral_core::{PlanTier, Role, ViewRow};

use crate::app::{App, Focus};
use crate::markdown::render_markdown;

/// Render the UI.
pub fn render(frame: &mut Frame, app: &mut App) {
    let area = frame.area();

    if let Some(error) = app.fatal_error.clone() {
        render_fatal_error(frame, &error, area);
        return;
    }

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header bar
            Constraint::Min(5),    // Main content
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_header_bar(frame, app, main_layout[0]);

    let content_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(main_layout[1]);

    render_sidebar(frame, app, content_layout[0]);
    render_chat_column(frame, app, content_layout[1]);
    render_status_bar(frame, app, main_layout[2]);
}

/// Color for a plan tier badge.
const fn tier_color(tier: PlanTier) -> Color {
    match tier {
        PlanTier::Free => Color::Gray,
        PlanTier::Plus => Color::Green,
        PlanTier::Team => Color::Cyan,
        PlanTier::Enterprise => Color::Magenta,
    }
}

/// Render the header bar with the product name and API origin.
fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "CORAL";
    let right_text = app.base_url().to_string();

    let padding = (area.width as usize)
        .saturating_sub(title.len())
        .saturating_sub(right_text.len());

    let line = Line::from(vec![
        Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
        Span::styled(right_text, Style::default().fg(Color::Gray)),
    ]);

    let header = Paragraph::new(line).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Render the sidebar: user header plus the conversation list.
fn render_sidebar(frame: &mut Frame, app: &App, area: Rect) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(3)])
        .split(area);

    render_user_header(frame, app, layout[0]);
    render_conversation_list(frame, app, layout[1]);
}

/// Render the user header with name, email and plan badge.
fn render_user_header(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().title(" Account ").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(profile) = app.cache.profile() else {
        frame.render_widget(
            Paragraph::new("Loading…").style(Style::default().fg(Color::DarkGray)),
            inner,
        );
        return;
    };

    let mut first = vec![
        Span::styled(
            profile.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            format!("[{}]", profile.plan.tier),
            Style::default().fg(tier_color(profile.plan.tier)),
        ),
    ];
    if profile.plan.requires_payment {
        first.push(Span::styled(
            " payment required",
            Style::default().fg(Color::Red),
        ));
    }

    let text = Text::from(vec![
        Line::from(first),
        Line::from(Span::styled(
            profile.email.clone(),
            Style::default().fg(Color::Gray),
        )),
    ]);
    frame.render_widget(Paragraph::new(text), inner);
}

/// Render the conversation list panel.
fn render_conversation_list(frame: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus == Focus::Conversations;

    let block = Block::default()
        .title(" Conversations ")
        .borders(Borders::ALL)
        .border_style(if is_focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        });

    let active_id = app.active_conversation.as_deref();
    let items: Vec<ListItem> = app
        .cache
        .conversations()
        .iter()
        .map(|conversation| {
            let mut spans = Vec::new();
            if conversation.is_pinned() {
                spans.push(Span::styled("* ", Style::default().fg(Color::Yellow)));
            }
            let title_style = if Some(conversation.id.as_str()) == active_id {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            spans.push(Span::styled(conversation.title.clone(), title_style));
            if conversation.is_unread() {
                spans.push(Span::styled(" ●", Style::default().fg(Color::Cyan)));
            }
            spans.push(Span::styled(
                format!("  {}", conversation.model),
                Style::default().fg(Color::DarkGray),
            ));
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.selected);

    frame.render_stateful_widget(list, area, &mut state);
}

/// Render the right column containing chat and input as one unit.
fn render_chat_column(frame: &mut Frame, app: &mut App, area: Rect) {
    let is_focused = app.focus == Focus::Chat;

    let title = app.active_conversation().map_or_else(
        || " Chat ".to_string(),
        |c| format!(" {} ({}) ", c.title, c.model),
    );

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if is_focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        });

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let show_paywall = app.cache.plan().is_some_and(coral_core::PlanInfo::needs_upgrade);
    let constraints = if show_paywall {
        vec![
            Constraint::Length(3), // Paywall banner
            Constraint::Min(1),    // Messages
            Constraint::Length(1), // Separator
            Constraint::Length(1), // Input
        ]
    } else {
        vec![
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ]
    };
    let inner_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner_area);

    let mut section = 0;
    if show_paywall {
        render_paywall_banner(frame, app, inner_layout[section]);
        section += 1;
    }
    let messages_area = inner_layout[section];
    let separator_area = inner_layout[section + 1];
    let input_area = inner_layout[section + 2];

    render_messages(frame, app, messages_area);

    let separator = Paragraph::new("─".repeat(separator_area.width as usize))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(separator, separator_area);

    render_input_line(frame, app, input_area, is_focused);
}

/// Render the paywall banner shown while the plan needs an upgrade.
fn render_paywall_banner(frame: &mut Frame, app: &App, area: Rect) {
    let blocks_submission = app
        .cache
        .plan()
        .is_some_and(coral_core::PlanInfo::blocks_submission);
    let message = if blocks_submission {
        "Your subscription requires payment before you can continue."
    } else {
        "You are on the free tier; upgrade to unlock paid features."
    };

    let banner = Paragraph::new(Line::from(vec![
        Span::styled(message, Style::default().fg(Color::White)),
        Span::raw("  "),
        Span::styled("[u]", Style::default().fg(Color::Yellow).bold()),
        Span::raw(" proceed to billing"),
    ]))
    .block(
        Block::default()
            .title(" Payment required ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if blocks_submission {
                Color::Red
            } else {
                Color::Yellow
            })),
    );
    frame.render_widget(banner, area);
}

/// Render the windowed message view.
///
/// Only rows inside [`coral_core::Viewport::visible_range`] are turned into
/// lines; everything outside the window stays unmaterialized.
fn render_messages(frame: &mut Frame, app: &mut App, area: Rect) {
    let row_count = app.history.merged_view().len();
    app.viewport.resize(area.height as usize, row_count);

    if row_count == 0 && !app.is_streaming() {
        let help = if app.loading_messages {
            "Loading messages…"
        } else if app.active_conversation.is_some() {
            "Type a message and press Enter to send"
        } else {
            "Select a conversation to chat"
        };
        let text = Paragraph::new(help)
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        frame.render_widget(text, area);
        return;
    }

    let window = app.viewport.visible_range(row_count);
    let mut lines: Vec<Line> = Vec::new();
    for row in &app.history.merged_view()[window.clone()] {
        push_row_lines(&mut lines, row);
    }

    // Waiting for the first chunk: spinner row below the history.
    if app.is_streaming() && app.history.in_flight().is_none() && window.end == row_count {
        lines.push(Line::from(Span::styled(
            "[Assistant]",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(vec![
            Span::styled(app.spinner_char(), Style::default().fg(Color::Yellow)),
            Span::styled(" thinking…", Style::default().fg(Color::DarkGray)),
        ]));
    }

    // Scroll within the materialized window.
    let skip = app
        .viewport
        .scroll_top()
        .saturating_sub(app.viewport.offset_of(window.start));

    let paragraph = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .scroll((u16::try_from(skip).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, area);

    let total = app.viewport.total_height(row_count);
    if total > area.height as usize {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(total)
            .position(app.viewport.scroll_top())
            .viewport_content_length(area.height as usize);
        frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
    }
}

/// Turn one view row into styled lines.
fn push_row_lines(lines: &mut Vec<Line<'static>>, row: &ViewRow) {
    let (label, label_color) = match row.role() {
        Role::User => ("[You]", Color::Cyan),
        Role::Assistant => ("[Assistant]", Color::Green),
        Role::System => ("[System]", Color::Magenta),
    };
    let mut header = vec![Span::styled(
        label,
        Style::default().fg(label_color).add_modifier(Modifier::BOLD),
    )];
    if let ViewRow::Historical(message) = row {
        header.push(Span::styled(
            format!(" {}", message.created_at.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ));
    }
    lines.push(Line::from(header));

    match row {
        ViewRow::Streaming(text) => {
            // Streaming cursor on the in-flight row.
            lines.extend(render_markdown(&format!("{text}▌")));
        }
        ViewRow::Historical(message) => {
            if message.role == Role::Assistant {
                lines.extend(render_markdown(&message.content));
            } else {
                for text_line in message.content.lines() {
                    lines.push(Line::from(Span::styled(
                        text_line.to_string(),
                        Style::default().fg(Color::White),
                    )));
                }
            }
            if message.is_failed() {
                lines.push(Line::from(Span::styled(
                    "✗ Failed to deliver",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )));
            }
        }
    }
    lines.push(Line::from(""));
}

/// Render the composer input line.
fn render_input_line(frame: &mut Frame, app: &App, area: Rect, is_focused: bool) {
    let enabled = app.composer_enabled();
    let prompt = if is_focused && enabled { "> " } else { "│ " };
    let prompt_style = if is_focused && enabled {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let body = if app.is_streaming() && app.input.is_empty() {
        Span::styled(
            "streaming… (Esc to cancel)",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Span::styled(app.input.clone(), Style::default().fg(Color::White))
    };

    let input_line = Line::from(vec![Span::styled(prompt, prompt_style), body]);
    frame.render_widget(Paragraph::new(input_line), area);

    if is_focused && enabled {
        frame.set_cursor_position((
            area.x + 2 + u16::try_from(app.cursor_position).unwrap_or(0),
            area.y,
        ));
    }
}

/// Render the status bar.
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode_indicator = match app.focus {
        Focus::Chat => Span::styled(" CHAT ", Style::default().fg(Color::Black).bg(Color::Green)),
        Focus::Conversations => Span::styled(
            " LIST ",
            Style::default().fg(Color::Black).bg(Color::Magenta),
        ),
    };

    let status = if let Some(ref error) = app.error_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(" ERROR: ", Style::default().fg(Color::Red).bold()),
            Span::styled(error.clone(), Style::default().fg(Color::Red)),
        ])
    } else if let Some(ref refresh_error) = app.refresh_error {
        Line::from(vec![
            mode_indicator,
            Span::styled(" ⚠ ", Style::default().fg(Color::Yellow).bold()),
            Span::styled(refresh_error.clone(), Style::default().fg(Color::Yellow)),
        ])
    } else if let Some(ref status) = app.status_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(format!(" {status}"), Style::default().fg(Color::Green)),
        ])
    } else if app.focus == Focus::Chat {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            Span::styled("Enter", Style::default().fg(Color::Yellow)),
            Span::raw(":send "),
            Span::styled("Esc", Style::default().fg(Color::Yellow)),
            Span::raw(":cancel "),
            Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
            Span::raw(":scroll "),
            Span::styled("Tab", Style::default().fg(Color::Yellow)),
            Span::raw(":switch"),
        ])
    } else {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
            Span::raw(":select "),
            Span::styled("Enter", Style::default().fg(Color::Yellow)),
            Span::raw(":open "),
            Span::styled("u", Style::default().fg(Color::Yellow)),
            Span::raw(":billing "),
            Span::styled("q", Style::default().fg(Color::Yellow)),
            Span::raw(":quit "),
            Span::styled("Tab", Style::default().fg(Color::Yellow)),
            Span::raw(":switch"),
        ])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

/// Render the page-blocking error screen (fail-closed).
fn render_fatal_error(frame: &mut Frame, error: &str, area: Rect) {
    let text = Text::from(vec![
        Line::from(Span::styled(
            "Failed to load workspace",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            error.to_string(),
            Style::default().fg(Color::White),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Please sign in and ensure your subscription is active.",
            Style::default().fg(Color::Gray),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("[q]", Style::default().fg(Color::Yellow).bold()),
            Span::raw(" quit"),
        ]),
    ]);

    let paragraph = Paragraph::new(text).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, centered_rect(60, 40, area));
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
