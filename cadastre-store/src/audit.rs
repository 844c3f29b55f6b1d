//! Append-only audit trail.
//!
//! One JSON line per mutating operation, recorded after the state change
//! commits. The log is never rewritten; forensic reconstruction reads it
//! start to end.

use cadastre_core::{Result, StoreConfig};
use chrono::Utc;
use serde_json::{Value, json};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Identity of the caller of a mutating operation, recorded in every
/// audit line. CLI and internal callers use [`RequestContext::system`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: String,
    pub user_agent: String,
}

impl RequestContext {
    /// Context for non-request callers (CLI, maintenance).
    pub fn system() -> Self {
        Self::default()
    }

    /// Context carrying a caller's network identity.
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Append-only JSONL audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            path: config.audit_log_file(),
        }
    }

    /// Append one record: `{ts, action, payload, ip, ua}`.
    pub async fn record(&self, action: &str, payload: Value, ctx: &RequestContext) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let record = json!({
            "ts": Utc::now().to_rfc3339(),
            "action": action,
            "payload": payload,
            "ip": ctx.ip,
            "ua": ctx.user_agent,
        });
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        Ok(())
    }

    /// Read every record, oldest first. Intended for tooling and tests.
    pub async fn read_all(&self) -> Result<Vec<Value>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }
}
