use crate::app::{App, Connection, FormField, InputMode, TaskForm};
use crate::filter::{filter_tasks, StatusFilter};
use crate::insights::TaskInsight;
use crate::models::{Priority, Task, TaskStatus};
use chrono::Utc;
use crossterm::event::{self, Event as CEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;

fn centered_rect_absolute(width: u16, height: u16, r: Rect) -> Rect {
    let width = width.min(r.width);
    let height = height.min(r.height);
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length((r.height.saturating_sub(height)) / 2),
                Constraint::Length(height),
                Constraint::Length((r.height.saturating_sub(height) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Length((r.width.saturating_sub(width)) / 2),
                Constraint::Length(width),
                Constraint::Length((r.width.saturating_sub(width) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Pending => Color::Yellow,
        TaskStatus::InProgress => Color::Blue,
        TaskStatus::Done => Color::Green,
    }
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::High => Color::Red,
        Priority::Medium => Color::Yellow,
        Priority::Low => Color::Green,
    }
}

fn bold(text: &'static str) -> Span<'static> {
    Span::styled(text, Style::default().add_modifier(Modifier::BOLD))
}

fn key_hint(key: &'static str, action: &'static str) -> Vec<Span<'static>> {
    vec![
        Span::styled(key, Style::default().fg(Color::Red)),
        Span::raw(action),
    ]
}

fn get_legend(input_mode: &InputMode) -> Line<'static> {
    let hints: Vec<(&'static str, &'static str)> = match input_mode {
        InputMode::Normal => vec![
            (" q ", ": Quit "),
            (" j/k ", ": Move "),
            (" a ", ": Add "),
            (" e ", ": Edit "),
            (" d ", ": Delete "),
            (" s ", ": Advance status "),
            (" f ", ": Filter "),
            (" / ", ": Search "),
            (" i ", ": Insights "),
            (" r ", ": Refresh "),
        ],
        InputMode::Search => vec![(" Enter ", ": Apply "), (" Esc ", ": Clear ")],
        InputMode::Form => vec![
            (" Tab ", ": Next field "),
            (" Space ", ": Change choice "),
            (" Enter ", ": Save "),
            (" Esc ", ": Cancel "),
        ],
        InputMode::ConfirmDelete => vec![(" y ", ": Delete "), (" n ", ": Keep ")],
    };
    Line::from(
        hints
            .into_iter()
            .flat_map(|(key, action)| key_hint(key, action))
            .collect::<Vec<_>>(),
    )
}

fn header(app: &App) -> Paragraph<'static> {
    let counts = app.counts();
    let choices = [
        StatusFilter::All,
        StatusFilter::Only(TaskStatus::Pending),
        StatusFilter::Only(TaskStatus::InProgress),
        StatusFilter::Only(TaskStatus::Done),
    ];
    let mut spans = vec![bold("Task Manager  ")];
    for choice in choices {
        let label = match choice {
            StatusFilter::All => "All".to_string(),
            StatusFilter::Only(status) => status.label().to_string(),
        };
        let text = format!(" {} ({}) ", label, counts.for_filter(choice));
        let style = if choice == app.filter {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default()
        };
        spans.push(Span::styled(text, style));
    }
    Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL))
}

fn search_bar(app: &App) -> Paragraph<'_> {
    let style = match app.input_mode {
        InputMode::Search => Style::default().fg(Color::Green),
        _ => Style::default(),
    };
    let content = if app.search.is_empty() && !matches!(app.input_mode, InputMode::Search) {
        Span::styled("Press / to search tasks...", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw(app.search.as_str())
    };
    Paragraph::new(Line::from(content))
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("Search"))
}

fn task_item(task: &Task) -> ListItem<'_> {
    let mut spans = vec![
        Span::styled(
            format!("{:<12}", task.status.label()),
            Style::default().fg(status_color(task.status)),
        ),
        Span::raw(task.title.as_str()),
    ];
    // No badge when the task has no priority of its own.
    if let Some(priority) = task.extras.priority {
        spans.push(Span::styled(
            format!(" {} ", priority.as_str().to_uppercase()),
            Style::default().fg(priority_color(priority)),
        ));
    }
    if task.is_overdue(Utc::now()) {
        spans.push(Span::styled(" OVERDUE", Style::default().fg(Color::Red)));
    }
    ListItem::new(Line::from(spans))
}

fn task_detail(task: &Task) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = vec![
        Line::from(Span::styled(
            task.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            bold("Status: "),
            Span::styled(
                task.status.label(),
                Style::default().fg(status_color(task.status)),
            ),
        ]),
    ];

    if let Some(priority) = task.extras.priority {
        lines.push(Line::from(vec![
            bold("Priority: "),
            Span::styled(
                priority.as_str().to_uppercase(),
                Style::default().fg(priority_color(priority)),
            ),
        ]));
    }

    if let Some(due) = task.extras.due_date {
        let mut spans = vec![bold("Due: "), Span::raw(due.format("%Y-%m-%d").to_string())];
        if task.is_overdue(Utc::now()) {
            spans.push(Span::styled(" (overdue)", Style::default().fg(Color::Red)));
        }
        lines.push(Line::from(spans));
    }

    if !task.extras.tags.is_empty() {
        let mut spans = vec![bold("Tags: ")];
        for (i, tag) in task.extras.tags.iter().enumerate() {
            if i > 0 {
                spans.push(Span::raw(" "));
            }
            spans.push(Span::styled(
                format!(" {} ", tag),
                Style::default().bg(Color::Yellow).fg(Color::Black),
            ));
        }
        lines.push(Line::from(spans));
    }

    if !task.description.is_empty() {
        lines.push(Line::from(""));
        for text in task.description.lines() {
            lines.push(Line::from(text.to_string()));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        bold("Created: "),
        Span::raw(task.created_at.format("%Y-%m-%d").to_string()),
    ]));
    if task.was_updated() {
        lines.push(Line::from(vec![
            bold("Updated: "),
            Span::raw(task.updated_at.format("%Y-%m-%d").to_string()),
        ]));
    }
    lines
}

fn draw_tasks(f: &mut Frame, app: &mut App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
        .split(area);

    let title = format!("Tasks ({})", app.filter);
    let empty_message = if app.has_active_query() {
        "No tasks found. Try adjusting your search or filter."
    } else {
        "No tasks yet. Press a to create your first task."
    };
    // Field-level borrow so the list state can still be borrowed mutably below.
    let visible = filter_tasks(&app.tasks, app.filter, &app.search);
    let detail = app
        .state
        .selected()
        .and_then(|i| visible.get(i))
        .map(|task| task_detail(task));

    let tasks_widget = if !visible.is_empty() {
        let items: Vec<ListItem> = visible.iter().map(|task| task_item(task)).collect();
        List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ")
    } else {
        List::new(vec![ListItem::new(empty_message)])
            .block(Block::default().borders(Borders::ALL).title(title))
    };
    f.render_stateful_widget(tasks_widget, chunks[0], &mut app.state);

    let detail_block = Block::default().borders(Borders::ALL).title("Task Details");
    let paragraph = match detail {
        Some(lines) => Paragraph::new(lines),
        None => Paragraph::new("Select a task to see its details"),
    };
    f.render_widget(paragraph.block(detail_block).wrap(Wrap { trim: true }), chunks[1]);
}

fn insight_lines(insight: &TaskInsight) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(vec![bold("Total: "), Span::raw(insight.total_tasks.to_string())]),
        Line::from(vec![
            Span::styled("Pending: ", Style::default().fg(Color::Yellow)),
            Span::raw(insight.pending_tasks.to_string()),
            Span::styled("  In progress: ", Style::default().fg(Color::Blue)),
            Span::raw(insight.in_progress_tasks.to_string()),
            Span::styled("  Completed: ", Style::default().fg(Color::Green)),
            Span::raw(insight.completed_tasks.to_string()),
        ]),
        Line::from(vec![
            bold("Most recent: "),
            Span::raw(
                insight
                    .most_recent_task
                    .clone()
                    .unwrap_or_else(|| "No tasks yet".to_string()),
            ),
        ]),
    ];
    if !insight.priority_distribution.is_empty() {
        let mut spans = vec![bold("Priority: ")];
        for (priority, count) in &insight.priority_distribution {
            spans.push(Span::styled(
                format!("{} {}  ", priority, count),
                Style::default().fg(priority_color(*priority)),
            ));
        }
        lines.push(Line::from(spans));
    }
    lines
}

fn draw_insights(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Task Insights");
    let insight = match &app.insights {
        None => {
            f.render_widget(Paragraph::new("Loading insights...").block(block), area);
            return;
        }
        Some(Err(message)) => {
            let text = format!("Error loading insights: {}", message);
            f.render_widget(
                Paragraph::new(text)
                    .style(Style::default().fg(Color::Red))
                    .block(block),
                area,
            );
            return;
        }
        Some(Ok(insight)) => insight,
    };

    let inner = block.inner(area);
    f.render_widget(block, area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
        .split(inner);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(columns[0]);

    f.render_widget(
        Paragraph::new(insight_lines(insight)).wrap(Wrap { trim: true }),
        left[0],
    );
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green))
        .percent(u16::from(insight.completion_rate))
        .label(format!("Completion {}%", insight.completion_rate));
    f.render_widget(gauge, left[1]);

    let months: Vec<Line> = insight
        .months_chronological()
        .into_iter()
        .map(|(month, count)| Line::from(format!("{:<16} {}", month, count)))
        .collect();
    f.render_widget(
        Paragraph::new(months).block(Block::default().borders(Borders::LEFT).title("By month")),
        columns[1],
    );
}

fn form_line(form: &TaskForm, field: FormField, label: &'static str, value: String) -> Line<'static> {
    let style = if form.active == field {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{:<13}", label), style),
        Span::raw(value),
    ])
}

fn draw_form(f: &mut Frame, form: &TaskForm, area: Rect) {
    let popup_width = (area.width / 5 * 3).max(40);
    let popup_area = centered_rect_absolute(popup_width, 12, area);
    let title = if form.editing.is_some() {
        "Edit Task (Enter to save)"
    } else {
        "New Task (Enter to save)"
    };

    let mut lines = vec![
        form_line(form, FormField::Title, "Title", form.title.clone()),
        form_line(form, FormField::Description, "Description", form.description.clone()),
        form_line(form, FormField::Tags, "Tags", form.tags.clone()),
        form_line(form, FormField::DueDate, "Due date", form.due_date.clone()),
        form_line(
            form,
            FormField::Priority,
            "Priority",
            form.priority
                .map(|p| p.to_string())
                .unwrap_or_else(|| "none".to_string()),
        ),
        form_line(form, FormField::Status, "Status", form.status.label().to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "Title accepts !high and #tag shortcuts",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    if let Some(error) = &form.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }

    let popup = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, popup_area);
    f.render_widget(popup, popup_area);
}

fn draw_confirm(f: &mut Frame, app: &App, area: Rect) {
    let title = app
        .selected_task()
        .map(|task| task.title.clone())
        .unwrap_or_default();
    let popup_area = centered_rect_absolute(50, 5, area);
    let popup = Paragraph::new(vec![
        Line::from("Are you sure you want to delete this task?"),
        Line::from(Span::styled(title, Style::default().add_modifier(Modifier::BOLD))),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .title("Delete Task (y/n)")
            .borders(Borders::ALL)
            .style(Style::default().fg(Color::Red)),
    )
    .wrap(Wrap { trim: true });
    f.render_widget(Clear, popup_area);
    f.render_widget(popup, popup_area);
}

pub fn draw(f: &mut Frame, app: &mut App) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(2),
            ]
            .as_ref(),
        )
        .split(size);

    f.render_widget(header(app), chunks[0]);
    f.render_widget(search_bar(app), chunks[1]);

    let body = chunks[2];
    if app.show_insights {
        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(9), Constraint::Min(0)].as_ref())
            .split(body);
        draw_insights(f, app, parts[0]);
        draw_tasks(f, app, parts[1]);
    } else {
        draw_tasks(f, app, body);
    }

    match app.input_mode {
        InputMode::Form => {
            if let Some(form) = &app.form {
                draw_form(f, form, body);
            }
        }
        InputMode::ConfirmDelete => draw_confirm(f, app, body),
        _ => {}
    }

    let status = match &app.status_line {
        Some(message) => Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Cyan),
        )),
        None => Line::from(""),
    };
    let legend = Paragraph::new(vec![status, get_legend(&app.input_mode)])
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });
    f.render_widget(legend, chunks[3]);
}

pub async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    conn: &Connection,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| draw(f, &mut app))?;

        // Handle input
        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(command) = app.handle_input(key) {
                    if app.apply(command, conn).await {
                        return Ok(());
                    }
                }
            }
        }
    }
}
