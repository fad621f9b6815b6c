use crate::bootstrap::DataPaths;
use anyhow::{Context, Result};
use deskpilot_infra::AuditLogger;

/// Re-check the hash chain of the audit log.
pub fn verify(paths: &DataPaths) -> Result<()> {
    let path = paths.audit_log();
    if !path.exists() {
        println!("No audit log at {}", path.display());
        return Ok(());
    }

    let logger = AuditLogger::new(&path).context("Failed to open audit log")?;
    let count = logger
        .verify_integrity()
        .with_context(|| format!("Audit log {} failed verification", path.display()))?;
    println!("✅ Audit chain intact ({} entries)", count);
    Ok(())
}
