use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// What happened to one executor input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEvent {
    Placed,
    Skipped,
    Failed,
    Closed,
}

/// One line of the export log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub at: DateTime<Utc>,
    pub event: AuditEvent,
    pub wallet: String,
    pub market_id: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_trade_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub dry_run: bool,
}

impl AuditRecord {
    pub fn new(event: AuditEvent, wallet: &str, market_id: &str, outcome: &str, dry_run: bool) -> Self {
        Self {
            at: Utc::now(),
            event,
            wallet: wallet.to_string(),
            market_id: market_id.to_string(),
            outcome: outcome.to_string(),
            copy_trade_id: None,
            size: None,
            price: None,
            realized_pnl: None,
            reason: None,
            dry_run,
        }
    }

    pub fn with_trade(mut self, id: Uuid, size: Decimal, price: Decimal) -> Self {
        self.copy_trade_id = Some(id);
        self.size = Some(size);
        self.price = Some(price);
        self
    }

    pub fn with_pnl(mut self, pnl: Decimal) -> Self {
        self.realized_pnl = Some(pnl);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Append-only JSON-lines mirror of copy-trade outcomes for dashboards.
/// Derived data: the database stays authoritative.
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Append one record. Failures are logged, never returned.
    pub async fn append(&self, record: &AuditRecord) {
        if let Err(e) = self.try_append(record).await {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to append audit record"
            );
        }
    }

    async fn try_append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_writes_one_json_object_per_line() {
        let path = std::env::temp_dir()
            .join(format!("whalecopy-audit-{}", Uuid::new_v4()))
            .join("log.jsonl");
        let log = AuditLog::new(&path);

        log.append(
            &AuditRecord::new(AuditEvent::Skipped, "0xabc", "M", "Yes", true)
                .with_reason("slippage cap exceeded"),
        )
        .await;
        log.append(
            &AuditRecord::new(AuditEvent::Placed, "0xabc", "M", "Yes", true)
                .with_trade(Uuid::new_v4(), Decimal::from(10), Decimal::new(40, 2)),
        )
        .await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "skipped");
        assert_eq!(lines[0]["reason"], "slippage cap exceeded");
        assert!(lines[0].get("size").is_none());
        assert_eq!(lines[1]["event"], "placed");

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}
