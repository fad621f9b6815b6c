//! Startup wiring: data directories, settings, handlers, dispatcher and the
//! restored session.

use crate::config::{self, Settings};
use anyhow::{Context, Result};
use deskpilot_core::SessionState;
use deskpilot_infra::{AuditLogger, SessionStore, SettingsStore};
use deskpilot_tools::handlers::{
    FileHandler, MediaConfig, MediaHandler, SystemHandler, TerminalHandler, WebConfig, WebHandler,
};
use deskpilot_tools::{platform, Dispatcher, HandlerSet, OperationRegistry};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Locations of everything deskpilot writes.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    /// `DESKPILOT_DATA_DIR`, or `./data`.
    pub fn from_env() -> Self {
        let root = std::env::var_os("DESKPILOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        Self { root }
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("settings.yaml")
    }

    pub fn sessions(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.root.join("audit.log")
    }

    pub fn media(&self) -> PathBuf {
        self.root.join("media")
    }

    pub fn initialize(&self) -> Result<()> {
        for dir in [self.root.clone(), self.sessions(), self.media()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Everything a chat or realtime session needs.
pub struct AppContext {
    pub paths: DataPaths,
    pub settings: Settings,
    pub dispatcher: Arc<Dispatcher>,
    pub session: Arc<SessionState>,
    pub session_store: SessionStore,
    /// Transcript entries already on disk.
    pub persisted: usize,
}

impl AppContext {
    pub fn build(paths: DataPaths, settings: Settings, session_id: &str) -> Result<Self> {
        paths.initialize()?;

        let audit = Arc::new(
            AuditLogger::new(paths.audit_log()).context("Failed to open audit log")?,
        );
        let dispatcher = Arc::new(build_dispatcher(&settings, &paths.media(), audit)?);

        let session_store =
            SessionStore::new(paths.sessions()).context("Failed to open session store")?;
        let entries = session_store
            .load(session_id)
            .with_context(|| format!("Failed to load session {session_id}"))?;
        let persisted = entries.len();
        let session = Arc::new(SessionState::restore(
            session_id,
            settings.to_session_config(),
            entries,
        ));
        info!(
            "Session {} restored with {} entries",
            session_id,
            session.len()
        );

        Ok(Self {
            paths,
            settings,
            dispatcher,
            session,
            session_store,
            persisted,
        })
    }

    /// Write transcript entries appended since the last call.
    pub fn persist(&mut self) -> Result<()> {
        self.persisted = self
            .session_store
            .persist_new(&self.session, self.persisted)
            .context("Failed to persist transcript")?;
        Ok(())
    }
}

pub fn build_dispatcher(
    settings: &Settings,
    media_dir: &Path,
    audit: Arc<dyn deskpilot_tools::AuditLogger>,
) -> Result<Dispatcher> {
    let platform = platform::detect();
    info!(
        "Platform {} with features {:?}",
        platform.name(),
        platform.features()
    );

    let media = MediaHandler::new(MediaConfig {
        api_key: settings.api_key.clone(),
        base_url: settings.base_url.clone(),
        output_dir: media_dir.to_path_buf(),
        ..MediaConfig::default()
    })
    .context("Failed to set up media handler")?;
    let web = WebHandler::new(WebConfig::default()).context("Failed to set up web handler")?;

    let handlers = HandlerSet::new()
        .with(Arc::new(SystemHandler::new(platform.clone())))
        .with(Arc::new(FileHandler::new()))
        .with(Arc::new(TerminalHandler::new(platform, settings.command_timeout())))
        .with(Arc::new(web))
        .with(Arc::new(media));

    Ok(Dispatcher::new(
        Arc::new(OperationRegistry::new()),
        handlers,
        audit,
        settings.command_timeout_ms,
    )
    .with_policy(settings.validation_policy))
}

/// Ask for an API key on first run and store it in the settings file.
pub fn ensure_api_key(store: &SettingsStore, settings: &mut Settings) -> Result<()> {
    if settings.api_key.is_some() {
        return Ok(());
    }

    println!("\nNo OpenAI API key configured.");
    print!("Enter OpenAI API key: ");
    io::stdout().flush()?;
    let api_key = rpassword::read_password().context("Failed to read API key")?;
    let api_key = api_key.trim();
    if api_key.is_empty() {
        anyhow::bail!("API key cannot be empty");
    }

    config::persist_value(store, config::OPENAI_API_KEY, api_key)?;
    settings.api_key = Some(api_key.to_string());
    println!("✅ API key saved to {}", store.path().display());
    Ok(())
}
