use anyhow::{bail, Context, Result};
use deskpilot_app::bootstrap::{self, AppContext, DataPaths};
use deskpilot_app::commands;
use deskpilot_app::config::Settings;
use deskpilot_app::repl::ChatRepl;
use deskpilot_infra::SettingsStore;
use deskpilot_providers::OpenAICompatibleProvider;
use deskpilot_runtime::Conversation;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_SESSION: &str = "default";

enum Command {
    Chat,
    Realtime,
    Settings(Vec<String>),
    Operations,
    AuditVerify,
    Help,
}

fn parse_args(args: &[String]) -> Result<(Command, String)> {
    let mut session = DEFAULT_SESSION.to_string();
    let mut rest = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--session" {
            match iter.next() {
                Some(name) if !name.trim().is_empty() => session = name.trim().to_string(),
                _ => bail!("--session requires a name"),
            }
        } else {
            rest.push(arg.clone());
        }
    }

    let command = match rest.first().map(String::as_str) {
        None | Some("chat") => Command::Chat,
        Some("realtime") | Some("voice") => Command::Realtime,
        Some("settings") | Some("config") => Command::Settings(rest[1..].to_vec()),
        Some("operations") => Command::Operations,
        Some("audit") => match rest.get(1).map(String::as_str) {
            Some("verify") => Command::AuditVerify,
            _ => bail!("Usage: deskpilot audit verify"),
        },
        Some("help") | Some("--help") | Some("-h") => Command::Help,
        Some(other) => bail!("Unknown command: {} (try 'deskpilot help')", other),
    };

    Ok((command, session))
}

fn print_usage() {
    println!("Usage: deskpilot [--session NAME] [COMMAND]\n");
    println!("Commands:");
    println!("  chat                   Text conversation (default)");
    println!("  realtime               Voice conversation over the realtime API");
    println!("  settings [show]        Show effective settings");
    println!("  settings set KEY VALUE Persist one setting");
    println!("  settings reset         Delete the settings file");
    println!("  operations             List available operations");
    println!("  audit verify           Check the audit log hash chain");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, session_id) = parse_args(&args)?;

    let paths = DataPaths::from_env();
    let store = SettingsStore::new(paths.settings());

    match command {
        Command::Help => {
            print_usage();
            Ok(())
        }
        Command::Settings(args) => commands::settings::handle(&store, &args),
        Command::Operations => {
            commands::operations::list();
            Ok(())
        }
        Command::AuditVerify => commands::audit::verify(&paths),
        Command::Chat => {
            let context = prepare(paths, &store, &session_id)?;
            run_chat(context).await
        }
        Command::Realtime => {
            let mut context = prepare(paths, &store, &session_id)?;
            commands::realtime::run(&mut context).await
        }
    }
}

fn prepare(paths: DataPaths, store: &SettingsStore, session_id: &str) -> Result<AppContext> {
    paths.initialize()?;
    let mut settings = Settings::load(store).context("Failed to load settings")?;
    bootstrap::ensure_api_key(store, &mut settings)?;
    AppContext::build(paths, settings, session_id)
}

async fn run_chat(context: AppContext) -> Result<()> {
    let settings = &context.settings;
    let provider = OpenAICompatibleProvider::new(
        settings.base_url.clone(),
        settings.api_key.clone(),
        settings.model.clone(),
    );
    println!("🤖 {} via {}", provider.model(), settings.base_url);

    let conversation = Conversation::new(Arc::new(provider), context.dispatcher.clone());
    ChatRepl::new(conversation, context).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_command_is_chat() {
        let (command, session) = parse_args(&[]).unwrap();
        assert!(matches!(command, Command::Chat));
        assert_eq!(session, DEFAULT_SESSION);
    }

    #[test]
    fn test_session_flag_anywhere() {
        let (command, session) = parse_args(&args(&["realtime", "--session", "kitchen"])).unwrap();
        assert!(matches!(command, Command::Realtime));
        assert_eq!(session, "kitchen");

        assert!(parse_args(&args(&["--session"])).is_err());
    }

    #[test]
    fn test_settings_subcommand_keeps_arguments() {
        let (command, _) = parse_args(&args(&["settings", "set", "VOICE", "sage"])).unwrap();
        match command {
            Command::Settings(rest) => assert_eq!(rest, args(&["set", "VOICE", "sage"])),
            _ => panic!("expected settings"),
        }
        assert!(parse_args(&args(&["audit"])).is_err());
        assert!(parse_args(&args(&["dance"])).is_err());
    }
}
