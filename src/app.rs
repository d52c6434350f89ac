use crate::api::InsightsClient;
use crate::error::{Error, Result};
use crate::filter::{filter_tasks, StatusFilter, TaskCounts};
use crate::insights::{compute_insights, TaskInsight};
use crate::models::{
    parse_due_date, Identity, NewTask, Priority, Task, TaskExtras, TaskPatch, TaskStatus,
};
use crate::parser::{parse_tag_list, parse_task_input, ParsedTask};
use crate::store::TaskStore;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::ListState;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub enum InputMode {
    Normal,
    Search,
    Form,
    ConfirmDelete,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormField {
    Title,
    Description,
    Tags,
    DueDate,
    Priority,
    Status,
}

impl FormField {
    fn next(&self) -> FormField {
        match self {
            FormField::Title => FormField::Description,
            FormField::Description => FormField::Tags,
            FormField::Tags => FormField::DueDate,
            FormField::DueDate => FormField::Priority,
            FormField::Priority => FormField::Status,
            FormField::Status => FormField::Title,
        }
    }

    fn previous(&self) -> FormField {
        match self {
            FormField::Title => FormField::Status,
            FormField::Description => FormField::Title,
            FormField::Tags => FormField::Description,
            FormField::DueDate => FormField::Tags,
            FormField::Priority => FormField::DueDate,
            FormField::Status => FormField::Priority,
        }
    }
}

/// Create/edit form; `editing` is set when it was opened on an existing task.
#[derive(Debug, Clone)]
pub struct TaskForm {
    pub editing: Option<Uuid>,
    original_title: String,
    pub title: String,
    pub description: String,
    pub tags: String,
    pub due_date: String,
    pub priority: Option<Priority>,
    pub status: TaskStatus,
    pub active: FormField,
    pub error: Option<String>,
}

impl TaskForm {
    pub fn blank() -> Self {
        TaskForm {
            editing: None,
            original_title: String::new(),
            title: String::new(),
            description: String::new(),
            tags: String::new(),
            due_date: String::new(),
            priority: None,
            status: TaskStatus::Pending,
            active: FormField::Title,
            error: None,
        }
    }

    pub fn from_task(task: &Task) -> Self {
        TaskForm {
            editing: Some(task.id),
            original_title: task.title.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            tags: task.extras.tags.join(", "),
            due_date: task
                .extras
                .due_date
                .map(|due| due.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            priority: task.extras.priority,
            status: task.status,
            active: FormField::Title,
            error: None,
        }
    }

    fn active_text(&mut self) -> Option<&mut String> {
        match self.active {
            FormField::Title => Some(&mut self.title),
            FormField::Description => Some(&mut self.description),
            FormField::Tags => Some(&mut self.tags),
            FormField::DueDate => Some(&mut self.due_date),
            FormField::Priority | FormField::Status => None,
        }
    }

    pub fn on_choice(&self) -> bool {
        matches!(self.active, FormField::Priority | FormField::Status)
    }

    fn cycle_choice(&mut self) {
        match self.active {
            FormField::Priority => {
                self.priority = match self.priority {
                    None => Some(Priority::Low),
                    Some(Priority::Low) => Some(Priority::Medium),
                    Some(Priority::Medium) => Some(Priority::High),
                    Some(Priority::High) => None,
                }
            }
            FormField::Status => self.status = self.status.next(),
            _ => {}
        }
    }

    /// Title and extras as they would be stored. Quick-add tokens are applied to new
    /// titles only; an untouched title on an existing task is kept verbatim.
    fn fields(&self) -> Result<(String, TaskExtras)> {
        let parsed = if self.editing.is_some() && self.title == self.original_title {
            ParsedTask {
                title: self.title.trim().to_string(),
                priority: None,
                tags: Vec::new(),
            }
        } else {
            parse_task_input(&self.title)
        };
        if parsed.title.is_empty() {
            return Err(Error::Validation("Title is required".to_string()));
        }

        let mut tags = parse_tag_list(&self.tags);
        for tag in parsed.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let due_date = if self.due_date.trim().is_empty() {
            None
        } else {
            Some(parse_due_date(&self.due_date).ok_or_else(|| {
                Error::Validation("Due date must look like YYYY-MM-DD".to_string())
            })?)
        };

        let extras = TaskExtras {
            tags,
            due_date,
            priority: self.priority.or(parsed.priority),
        };
        Ok((parsed.title, extras))
    }

    pub fn to_new_task(&self) -> Result<NewTask> {
        let (title, extras) = self.fields()?;
        Ok(NewTask {
            title,
            description: self.description.trim().to_string(),
            status: self.status,
            extras,
        })
    }

    pub fn to_patch(&self) -> Result<TaskPatch> {
        let (title, extras) = self.fields()?;
        Ok(TaskPatch {
            title: Some(title),
            description: Some(self.description.trim().to_string()),
            status: Some(self.status),
            extras: Some(extras),
        })
    }
}

/// Side effects requested by a key press, run by [`App::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    Create(NewTask),
    Update(Uuid, TaskPatch),
    Delete(Uuid),
    LoadInsights,
    Quit,
}

pub enum InsightsSource {
    Remote(InsightsClient),
    Local,
}

/// Everything the client needs to talk to the store as one signed-in user.
pub struct Connection {
    pub store: Arc<dyn TaskStore>,
    pub identity: Identity,
    pub token: String,
    pub insights: InsightsSource,
}

pub struct App {
    pub tasks: Vec<Task>,
    pub state: ListState,
    pub input_mode: InputMode,
    pub filter: StatusFilter,
    pub search: String,
    pub form: Option<TaskForm>,
    pub show_insights: bool,
    pub insights: Option<std::result::Result<TaskInsight, String>>,
    pub status_line: Option<String>,
}

impl App {
    pub fn new(tasks: Vec<Task>) -> App {
        let mut app = App {
            tasks: Vec::new(),
            state: ListState::default(),
            input_mode: InputMode::Normal,
            filter: StatusFilter::All,
            search: String::new(),
            form: None,
            show_insights: false,
            insights: None,
            status_line: None,
        };
        app.set_tasks(tasks);
        app
    }

    pub fn set_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.clamp_selection();
    }

    /// Tasks passing the current filter and search, in list order.
    pub fn visible(&self) -> Vec<&Task> {
        filter_tasks(&self.tasks, self.filter, &self.search)
    }

    pub fn counts(&self) -> TaskCounts {
        TaskCounts::of(&self.tasks)
    }

    pub fn selected_task(&self) -> Option<&Task> {
        let visible = self.visible();
        self.state.selected().and_then(|i| visible.get(i).copied())
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        if len == 0 {
            self.state.select(None);
        } else {
            let i = self.state.selected().unwrap_or(0).min(len - 1);
            self.state.select(Some(i));
        }
    }

    pub fn next(&mut self) {
        let len = self.visible().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.visible().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn has_active_query(&self) -> bool {
        !self.search.is_empty() || self.filter != StatusFilter::All
    }

    pub fn handle_input(&mut self, key: KeyEvent) -> Option<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Command::Quit);
        }
        match self.input_mode {
            InputMode::Normal => self.handle_normal(key),
            InputMode::Search => {
                self.handle_search(key);
                None
            }
            InputMode::Form => self.handle_form(key),
            InputMode::ConfirmDelete => self.handle_confirm(key),
        }
    }

    fn handle_normal(&mut self, key: KeyEvent) -> Option<Command> {
        self.status_line = None;
        match key.code {
            KeyCode::Char('q') => return Some(Command::Quit),
            KeyCode::Char('j') | KeyCode::Down => self.next(),
            KeyCode::Char('k') | KeyCode::Up => self.previous(),
            KeyCode::Char('r') => return Some(Command::Refresh),
            KeyCode::Char('/') => self.input_mode = InputMode::Search,
            KeyCode::Char('f') => {
                self.filter = self.filter.cycle();
                self.state.select(Some(0));
                self.clamp_selection();
            }
            KeyCode::Char('a') => {
                self.form = Some(TaskForm::blank());
                self.input_mode = InputMode::Form;
            }
            KeyCode::Char('e') | KeyCode::Enter => {
                if let Some(task) = self.selected_task() {
                    self.form = Some(TaskForm::from_task(task));
                    self.input_mode = InputMode::Form;
                }
            }
            KeyCode::Char('d') => {
                if self.selected_task().is_some() {
                    self.input_mode = InputMode::ConfirmDelete;
                }
            }
            KeyCode::Char('s') => {
                if let Some(task) = self.selected_task() {
                    return Some(Command::Update(
                        task.id,
                        TaskPatch::status(task.status.next()),
                    ));
                }
            }
            KeyCode::Char('i') => {
                self.show_insights = !self.show_insights;
                if self.show_insights {
                    return Some(Command::LoadInsights);
                }
            }
            KeyCode::Esc => {
                self.search.clear();
                self.filter = StatusFilter::All;
                self.clamp_selection();
            }
            _ => {}
        }
        None
    }

    fn handle_search(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => self.search.push(c),
            KeyCode::Backspace => {
                self.search.pop();
            }
            KeyCode::Enter => self.input_mode = InputMode::Normal,
            KeyCode::Esc => {
                self.search.clear();
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
        self.state.select(Some(0));
        self.clamp_selection();
    }

    fn handle_form(&mut self, key: KeyEvent) -> Option<Command> {
        let form = self.form.as_mut()?;
        match key.code {
            KeyCode::Esc => {
                self.form = None;
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Tab | KeyCode::Down => form.active = form.active.next(),
            KeyCode::BackTab | KeyCode::Up => form.active = form.active.previous(),
            KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') if form.on_choice() => {
                form.cycle_choice()
            }
            KeyCode::Char(c) => {
                if let Some(text) = form.active_text() {
                    text.push(c);
                }
            }
            KeyCode::Backspace => {
                if let Some(text) = form.active_text() {
                    text.pop();
                }
            }
            KeyCode::Enter => {
                let command = match form.editing {
                    Some(id) => form.to_patch().map(|patch| Command::Update(id, patch)),
                    None => form.to_new_task().map(Command::Create),
                };
                match command {
                    Ok(command) => {
                        form.error = None;
                        return Some(command);
                    }
                    Err(err) => form.error = Some(err.to_string()),
                }
            }
            _ => {}
        }
        None
    }

    fn handle_confirm(&mut self, key: KeyEvent) -> Option<Command> {
        self.input_mode = InputMode::Normal;
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.selected_task().map(|task| Command::Delete(task.id))
            }
            _ => None,
        }
    }

    /// Runs a command against the store. Returns `true` when the app should exit.
    pub async fn apply(&mut self, command: Command, conn: &Connection) -> bool {
        debug!(?command, "Applying command");
        match command {
            Command::Quit => return true,
            Command::Refresh => {
                self.refresh(conn).await;
            }
            Command::Create(draft) => match conn.store.create_task(&draft, &conn.identity).await {
                Ok(task) => {
                    let message = format!("Created \"{}\"", task.title);
                    self.mutation_done(message, conn).await
                }
                Err(err) => self.mutation_failed(err),
            },
            Command::Update(id, patch) => {
                match conn.store.update_task(&conn.identity, id, &patch).await {
                    Ok(task) => {
                        let message = format!("Updated \"{}\"", task.title);
                        self.mutation_done(message, conn).await
                    }
                    Err(err) => self.mutation_failed(err),
                }
            }
            Command::Delete(id) => match conn.store.delete_task(&conn.identity, id).await {
                Ok(()) => self.mutation_done("Task deleted".to_string(), conn).await,
                Err(err) => self.mutation_failed(err),
            },
            Command::LoadInsights => self.load_insights(conn).await,
        }
        false
    }

    pub async fn refresh(&mut self, conn: &Connection) -> bool {
        match conn.store.list_tasks(&conn.identity).await {
            Ok(tasks) => {
                self.set_tasks(tasks);
                true
            }
            Err(err) => {
                warn!(error = %err, "Failed to fetch tasks");
                self.status_line = Some(format!("Error fetching tasks: {}", err));
                false
            }
        }
    }

    async fn mutation_done(&mut self, message: String, conn: &Connection) {
        self.form = None;
        self.input_mode = InputMode::Normal;
        if self.refresh(conn).await {
            self.status_line = Some(message);
        }
        if self.show_insights {
            self.load_insights(conn).await;
        }
    }

    fn mutation_failed(&mut self, err: Error) {
        warn!(error = %err, "Task change failed");
        match self.form.as_mut() {
            Some(form) => form.error = Some(err.to_string()),
            None => self.status_line = Some(format!("Error: {}", err)),
        }
    }

    async fn load_insights(&mut self, conn: &Connection) {
        let result = match &conn.insights {
            InsightsSource::Remote(client) => client.fetch(&conn.token).await,
            InsightsSource::Local => Ok(compute_insights(&self.tasks)),
        };
        self.insights = Some(result.map_err(|err| err.to_string()));
    }
}
