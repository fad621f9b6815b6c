//! Text-mode chat REPL over one persistent session.

use crate::bootstrap::AppContext;
use crate::config;
use deskpilot_core::Role;
use deskpilot_infra::SettingsStore;
use deskpilot_runtime::Conversation;
use std::io::{self, Write};
use tracing::warn;

/// Keys read once when the provider and dispatcher are built.
const RESTART_ONLY: &[&str] = &[
    config::OPENAI_API_KEY,
    config::OPENAI_BASE_URL,
    config::VALIDATION_POLICY,
    config::COMMAND_TIMEOUT_MS,
];

pub struct ChatRepl {
    conversation: Conversation,
    context: AppContext,
}

impl ChatRepl {
    pub fn new(conversation: Conversation, context: AppContext) -> Self {
        Self {
            conversation,
            context,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("╔══════════════════════════════════════════════════════════════════╗");
        println!("║              Deskpilot Chat                                      ║");
        println!("║  Commands: exit, status, history, set, clear, help               ║");
        println!("╚══════════════════════════════════════════════════════════════════╝");
        println!();

        loop {
            print!("deskpilot> ");
            io::stdout().flush()?;

            let mut input = String::new();
            if io::stdin().read_line(&mut input)? == 0 {
                break;
            }
            if !self.handle(input.trim()).await {
                break;
            }
        }

        Ok(())
    }

    /// Act on one input line. Returns false once the user asks to leave.
    pub async fn handle(&mut self, input: &str) -> bool {
        match input {
            "" => return true,
            "exit" | "quit" => {
                println!("👋 Goodbye!");
                return false;
            }
            "help" => {
                println!("\n📖 Available Commands:");
                println!("  exit, quit  - Exit deskpilot");
                println!("  help        - Show this help message");
                println!("  status      - Show session status");
                println!("  history     - Show the conversation so far");
                println!("  set KEY VAL - Save a setting; model, voice and prompt keys apply now");
                println!("  clear       - Clear screen");
                println!("\n💡 Anything else is sent to the assistant\n");
                return true;
            }
            "status" => {
                self.print_status();
                return true;
            }
            "history" => {
                self.print_history();
                return true;
            }
            "clear" => {
                print!("\x1B[2J\x1B[1;1H");
                return true;
            }
            _ => {}
        }

        if let Some(rest) = input.strip_prefix("set ") {
            if let Err(e) = self.apply_setting(rest) {
                eprintln!("❌ {:#}\n", e);
            }
            return true;
        }

        match self.conversation.send(&self.context.session, input).await {
            Ok(response) => println!("\n{}\n", response),
            Err(e) => eprintln!("❌ Error: {}\n", e),
        }

        if let Err(e) = self.context.persist() {
            warn!("{:#}", e);
        }
        true
    }

    /// Persist `KEY VALUE`. Keys baked into the provider client or the
    /// dispatcher are only saved; the rest swap the live session config.
    fn apply_setting(&mut self, rest: &str) -> anyhow::Result<()> {
        let Some((key, value)) = rest.trim().split_once(char::is_whitespace) else {
            anyhow::bail!("Usage: set KEY VALUE");
        };
        let key = key.to_ascii_uppercase();
        let store = SettingsStore::new(self.context.paths.settings());
        config::persist_value(&store, &key, value)?;
        if RESTART_ONLY.contains(&key.as_str()) {
            println!("💾 {} saved; takes effect on restart\n", key);
            return Ok(());
        }
        self.context.settings.set(&key, value)?;
        self.context
            .session
            .replace_config(self.context.settings.to_session_config());
        println!("✅ {} updated\n", key);
        Ok(())
    }

    fn print_status(&self) {
        let config = self.context.session.config();
        println!("\n📊 Session Status:");
        println!("  Session: {}", self.context.session.id());
        println!("  Model: {}", config.model);
        println!("  Device: {}", config.device_label);
        println!(
            "  Function calling: {}",
            if config.function_calling_enabled { "on" } else { "off" }
        );
        println!(
            "  Validation: {}",
            self.conversation.dispatcher().policy()
        );
        println!("  Transcript entries: {}", self.context.session.len());
        println!();
    }

    fn print_history(&self) {
        println!();
        for entry in self.context.session.snapshot() {
            let label = match entry.role {
                Role::System => "system",
                Role::User => "you",
                Role::Assistant if entry.recorded_tool_call().is_some() => continue,
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            println!(
                "[{}] {}: {}",
                entry.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
                label,
                entry.content
            );
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::DataPaths;
    use crate::config::Settings;
    use deskpilot_providers::OpenAICompatibleProvider;
    use deskpilot_tools::ValidationPolicy;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repl(server: &MockServer, root: &std::path::Path) -> ChatRepl {
        let settings = Settings {
            api_key: Some("sk-test".to_string()),
            base_url: server.uri(),
            function_calling: false,
            ..Settings::default()
        };
        let provider = OpenAICompatibleProvider::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            settings.model.clone(),
        )
        .with_retry(0, Duration::from_millis(1));
        let context = AppContext::build(DataPaths::new(root), settings, "repl-test").unwrap();
        let conversation = Conversation::new(Arc::new(provider), context.dispatcher.clone());
        ChatRepl::new(conversation, context)
    }

    fn reply() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "hi"},
                "finish_reason": "stop"
            }]
        }))
    }

    #[tokio::test]
    async fn test_live_model_change_reaches_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "gpt-4o"})))
            .respond_with(reply())
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut repl = repl(&server, dir.path());

        assert!(repl.handle("set OPENAI_MODEL gpt-4o").await);
        assert!(repl.handle("hello").await);

        assert_eq!(repl.context.session.config().model, "gpt-4o");
        assert_eq!(repl.context.session.len(), 2);
    }

    #[tokio::test]
    async fn test_restart_only_key_is_saved_not_applied() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut repl = repl(&server, dir.path());

        assert!(repl.handle("set VALIDATION_POLICY strict").await);
        assert!(repl.handle("set COMMAND_TIMEOUT_MS 5000").await);

        assert_eq!(repl.context.settings.validation_policy, ValidationPolicy::Permissive);
        assert_eq!(repl.context.settings.command_timeout_ms, 30_000);
        assert_eq!(
            repl.conversation.dispatcher().policy(),
            ValidationPolicy::Permissive
        );

        let store = SettingsStore::new(repl.context.paths.settings());
        let saved = Settings::from_sources(&store.load().unwrap(), |_| None);
        assert_eq!(saved.validation_policy, ValidationPolicy::Strict);
        assert_eq!(saved.command_timeout_ms, 5000);
    }

    #[tokio::test]
    async fn test_exit_ends_loop() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut repl = repl(&server, dir.path());

        assert!(repl.handle("").await);
        assert!(!repl.handle("quit").await);
    }
}
