//! Command-line interface.

use crate::api::{AuthClient, InsightsClient, RestTaskStore};
use crate::app::{App, Connection, InsightsSource};
use crate::auth::ProviderGate;
use crate::config::Config;
use crate::error::{AuthFailure, Error, Result};
use crate::filter::{filter_tasks, StatusFilter};
use crate::insights::compute_insights;
use crate::server::{self, AppState};
use crate::session::AuthSession;
use crate::store::TaskStore;
use chrono::Utc;
use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// taskdeck - personal tasks with insights
#[derive(Parser, Debug)]
#[command(name = "taskdeck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true, env = "TASKDECK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve GET /task-insights and the task routes
    Serve {
        /// Address to bind, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "TASKDECK_PASSWORD", hide_env_values = true)]
        password: String,

        /// Create the account first
        #[arg(long)]
        sign_up: bool,
    },

    /// Forget the stored session
    Logout,

    /// Print tasks, optionally filtered
    List {
        /// all, pending, in-progress or done
        #[arg(long, default_value = "all")]
        status: StatusFilter,

        /// Case-insensitive text to look for in title or description
        #[arg(long, short, default_value = "")]
        query: String,
    },

    /// Print task insights as JSON
    Insights,

    /// Interactive task manager (default)
    Tui,
}

impl Cli {
    /// Log filter used when RUST_LOG is not set.
    pub fn default_log_filter(&self) -> &'static str {
        match self.command {
            Some(Commands::Serve { .. }) => "info",
            _ => "off",
        }
    }

    pub async fn run(self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;
        match self.command.unwrap_or(Commands::Tui) {
            Commands::Serve { bind } => serve(&config, bind).await,
            Commands::Login {
                email,
                password,
                sign_up,
            } => login(&config, &email, &password, sign_up).await,
            Commands::Logout => logout(),
            Commands::List { status, query } => list(&config, status, &query).await,
            Commands::Insights => insights(&config).await,
            Commands::Tui => tui(&config).await,
        }
    }
}

fn session_path() -> Result<PathBuf> {
    AuthSession::default_path()
        .ok_or_else(|| Error::InvalidConfig("no user config directory".to_string()))
}

async fn serve(config: &Config, bind: Option<String>) -> Result<()> {
    let url = config.store_url()?;
    let key = config.service_key()?;
    let store = RestTaskStore::new(url, key, &config.store.table);
    let gate = ProviderGate::new(AuthClient::new(url, key));
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    server::run(AppState::new(Arc::new(store), Arc::new(gate)), &bind).await
}

async fn login(config: &Config, email: &str, password: &str, sign_up: bool) -> Result<()> {
    let client = AuthClient::new(config.store_url()?, config.anon_key()?);
    let session = if sign_up {
        match client.sign_up(email, password).await? {
            Some(session) => session,
            None => {
                println!("Account created. Confirm your email, then run `taskdeck login`.");
                return Ok(());
            }
        }
    } else {
        client.sign_in(email, password).await?
    };
    session.save(&session_path()?)?;
    info!(user_id = %session.user_id, "Signed in");
    println!("Signed in as {}", session.email.as_deref().unwrap_or(email));
    Ok(())
}

fn logout() -> Result<()> {
    if AuthSession::clear(&session_path()?)? {
        println!("Signed out");
    } else {
        println!("Not signed in");
    }
    Ok(())
}

/// Loads the stored session, refreshing it when it has expired.
async fn current_session(config: &Config) -> Result<AuthSession> {
    let path = session_path()?;
    let session = AuthSession::load(&path)?;
    if !session.is_expired(Utc::now()) {
        return Ok(session);
    }
    let refresh_token = session
        .refresh_token
        .as_deref()
        .ok_or(Error::Unauthorized(AuthFailure::SessionExpired))?;
    let client = AuthClient::new(config.store_url()?, config.anon_key()?);
    let refreshed = client.refresh(refresh_token).await.map_err(|err| {
        if err.is_unauthorized() {
            Error::Unauthorized(AuthFailure::SessionExpired)
        } else {
            err
        }
    })?;
    refreshed.save(&path)?;
    info!(user_id = %refreshed.user_id, "Refreshed session");
    Ok(refreshed)
}

async fn connect(config: &Config) -> Result<Connection> {
    let session = current_session(config).await?;
    let store = RestTaskStore::new(config.store_url()?, config.anon_key()?, &config.store.table)
        .with_bearer(&session.access_token);
    let insights = match &config.client.insights_url {
        Some(url) => InsightsSource::Remote(InsightsClient::new(url)),
        None => InsightsSource::Local,
    };
    Ok(Connection {
        store: Arc::new(store),
        identity: session.identity(),
        token: session.access_token,
        insights,
    })
}

async fn list(config: &Config, status: StatusFilter, query: &str) -> Result<()> {
    let conn = connect(config).await?;
    let tasks = conn.store.list_tasks(&conn.identity).await?;
    for task in filter_tasks(&tasks, status, query) {
        let priority = task
            .extras
            .priority
            .map(|p| format!(" [{}]", p))
            .unwrap_or_default();
        println!("{:<12} {}{}  {}", task.status, task.title, priority, task.id);
    }
    Ok(())
}

async fn insights(config: &Config) -> Result<()> {
    let conn = connect(config).await?;
    let insight = match &conn.insights {
        InsightsSource::Remote(client) => client.fetch(&conn.token).await?,
        InsightsSource::Local => compute_insights(&conn.store.list_tasks(&conn.identity).await?),
    };
    println!("{}", serde_json::to_string_pretty(&insight)?);
    Ok(())
}

async fn tui(config: &Config) -> Result<()> {
    let conn = connect(config).await?;
    let mut app = App::new(Vec::new());
    app.refresh(&conn).await;

    // Setup terminal UI
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = crate::ui::run_app(&mut terminal, app, &conn).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    #[test]
    fn test_defaults_to_tui() {
        let cli = Cli::try_parse_from(["taskdeck"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.default_log_filter(), "off");
    }

    #[test]
    fn test_list_arguments() {
        let cli =
            Cli::try_parse_from(["taskdeck", "list", "--status", "in-progress", "-q", "report"])
                .unwrap();
        match cli.command {
            Some(Commands::List { status, query }) => {
                assert_eq!(status, StatusFilter::Only(TaskStatus::InProgress));
                assert_eq!(query, "report");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(Cli::try_parse_from(["taskdeck", "list", "--status", "archived"]).is_err());
    }

    #[test]
    fn test_serve_logs_by_default() {
        let cli = Cli::try_parse_from(["taskdeck", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        assert_eq!(cli.default_log_filter(), "info");
    }
}
