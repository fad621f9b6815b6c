use crate::config::{self, Settings};
use anyhow::{bail, Context, Result};
use deskpilot_infra::SettingsStore;

pub fn handle(store: &SettingsStore, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        None | Some("show") => show(store),
        Some("set") => {
            if args.len() < 3 {
                bail!("Usage: deskpilot settings set KEY VALUE");
            }
            let key = &args[1];
            let value = args[2..].join(" ");
            config::persist_value(store, key, &value)
                .with_context(|| format!("Failed to set {}", key))?;
            println!("✅ {} saved", key.to_uppercase());
            Ok(())
        }
        Some("reset") => {
            store.reset().context("Failed to reset settings")?;
            println!("✅ Settings reset");
            println!("Run deskpilot again to set up a new API key");
            Ok(())
        }
        Some(other) => bail!("Unknown settings command: {}", other),
    }
}

fn show(store: &SettingsStore) -> Result<()> {
    let settings = Settings::load(store).context("Failed to load settings")?;
    println!("\n⚙️  Settings ({})", store.path().display());
    for (key, value) in settings.display_values() {
        println!("  {:<22} {}", key, value);
    }
    println!();
    Ok(())
}
