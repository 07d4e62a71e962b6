//! SQLite persistence for orchestrator statistics.
//!
//! Persists periodic snapshots so an operator can inspect a deployment
//! without attaching to it:
//! - Aggregated orchestrator stats
//! - Per-strategy scores, allocation and last execution

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::orchestrator::{OrchestratorStats, StrategyPerformance};

/// Per-strategy row of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedStrategy {
    pub name: String,
    pub performance_score: Decimal,
    pub risk_score: Decimal,
    pub win_rate: Decimal,
    pub total_trades: u64,
    pub successful_trades: u64,
    pub total_profit: Decimal,
    pub capital_allocated: Decimal,
    pub last_execution_time: Option<DateTime<Utc>>,
}

/// One stored snapshot.
#[derive(Debug, Clone)]
pub struct PersistedSnapshot {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub stats: OrchestratorStats,
    pub strategies: Vec<PersistedStrategy>,
}

/// SQLite-based snapshot store.
pub struct PersistenceManager {
    conn: Connection,
    /// Snapshots kept after each write; unbounded when `None`
    retention: Option<u64>,
}

impl PersistenceManager {
    /// Open (or create) the database and initialise the schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        let manager = Self {
            conn,
            retention: None,
        };
        manager.init_schema()?;

        info!("Persistence manager initialized at {:?}", db_path.as_ref());
        Ok(manager)
    }

    /// Keep only the newest `keep` snapshots after each write.
    pub fn with_retention(mut self, keep: u64) -> Self {
        self.retention = Some(keep);
        self
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS stats_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                total_capital TEXT NOT NULL,
                allocated_capital TEXT NOT NULL,
                available_capital TEXT NOT NULL,
                total_profit TEXT NOT NULL,
                total_trades INTEGER NOT NULL,
                active_trades INTEGER NOT NULL,
                best_strategy TEXT,
                worst_strategy TEXT,
                overall_win_rate TEXT NOT NULL,
                risk_adjusted_return TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_stats_timestamp ON stats_snapshots(timestamp);

            CREATE TABLE IF NOT EXISTS strategy_snapshots (
                snapshot_id INTEGER NOT NULL REFERENCES stats_snapshots(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                performance_score TEXT NOT NULL,
                risk_score TEXT NOT NULL,
                win_rate TEXT NOT NULL,
                total_trades INTEGER NOT NULL,
                successful_trades INTEGER NOT NULL,
                total_profit TEXT NOT NULL,
                capital_allocated TEXT NOT NULL,
                last_execution TEXT,
                PRIMARY KEY (snapshot_id, name)
            );
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Store a snapshot, apply retention, and return its id.
    pub fn record_snapshot(
        &self,
        timestamp: DateTime<Utc>,
        stats: &OrchestratorStats,
        performance: &BTreeMap<String, StrategyPerformance>,
    ) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO stats_snapshots (timestamp, total_capital, allocated_capital,
                                         available_capital, total_profit, total_trades,
                                         active_trades, best_strategy, worst_strategy,
                                         overall_win_rate, risk_adjusted_return)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                timestamp.to_rfc3339(),
                stats.total_capital.to_string(),
                stats.allocated_capital.to_string(),
                stats.available_capital.to_string(),
                stats.total_profit.to_string(),
                stats.total_trades,
                stats.active_trades,
                stats.best_performing_strategy,
                stats.worst_performing_strategy,
                stats.overall_win_rate.to_string(),
                stats.risk_adjusted_return.to_string(),
            ],
        )?;
        let snapshot_id = tx.last_insert_rowid();

        for (name, p) in performance {
            tx.execute(
                r#"
                INSERT INTO strategy_snapshots (snapshot_id, name, performance_score, risk_score,
                                                win_rate, total_trades, successful_trades,
                                                total_profit, capital_allocated, last_execution)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    snapshot_id,
                    name,
                    p.metrics.performance_score.to_string(),
                    p.metrics.risk_score.to_string(),
                    p.metrics.win_rate.to_string(),
                    p.metrics.total_trades,
                    p.metrics.successful_trades,
                    p.metrics.total_profit.to_string(),
                    p.capital_allocated.to_string(),
                    p.last_execution_time.map(|t| t.to_rfc3339()),
                ],
            )?;
        }

        tx.commit()?;
        debug!(snapshot_id, strategies = performance.len(), "Stats snapshot recorded");

        if let Some(keep) = self.retention {
            self.prune(keep)?;
        }
        Ok(snapshot_id)
    }

    /// Most recent snapshot, if any.
    pub fn latest_snapshot(&self) -> Result<Option<PersistedSnapshot>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, timestamp, total_capital, allocated_capital, available_capital,
                       total_profit, total_trades, active_trades, best_strategy, worst_strategy,
                       overall_win_rate, risk_adjusted_return
                FROM stats_snapshots ORDER BY id DESC LIMIT 1
                "#,
                [],
                |row| {
                    let id: i64 = row.get(0)?;
                    let timestamp: String = row.get(1)?;
                    let stats = OrchestratorStats {
                        total_capital: decimal(&row.get::<_, String>(2)?),
                        allocated_capital: decimal(&row.get::<_, String>(3)?),
                        available_capital: decimal(&row.get::<_, String>(4)?),
                        total_profit: decimal(&row.get::<_, String>(5)?),
                        total_trades: row.get(6)?,
                        active_trades: row.get(7)?,
                        best_performing_strategy: row.get(8)?,
                        worst_performing_strategy: row.get(9)?,
                        overall_win_rate: decimal(&row.get::<_, String>(10)?),
                        risk_adjusted_return: decimal(&row.get::<_, String>(11)?),
                    };
                    Ok((id, timestamp, stats))
                },
            )
            .optional()?;

        let Some((id, timestamp, stats)) = row else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, performance_score, risk_score, win_rate, total_trades,
                   successful_trades, total_profit, capital_allocated, last_execution
            FROM strategy_snapshots WHERE snapshot_id = ?1 ORDER BY name
            "#,
        )?;

        let strategies = stmt
            .query_map([id], |row| {
                Ok(PersistedStrategy {
                    name: row.get(0)?,
                    performance_score: decimal(&row.get::<_, String>(1)?),
                    risk_score: decimal(&row.get::<_, String>(2)?),
                    win_rate: decimal(&row.get::<_, String>(3)?),
                    total_trades: row.get(4)?,
                    successful_trades: row.get(5)?,
                    total_profit: decimal(&row.get::<_, String>(6)?),
                    capital_allocated: decimal(&row.get::<_, String>(7)?),
                    last_execution_time: row
                        .get::<_, Option<String>>(8)?
                        .as_deref()
                        .and_then(timestamp_opt),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(Some(PersistedSnapshot {
            id,
            timestamp: timestamp_opt(&timestamp).unwrap_or_else(Utc::now),
            stats,
            strategies,
        }))
    }

    pub fn snapshot_count(&self) -> Result<u64> {
        let count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM stats_snapshots", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete all but the newest `keep` snapshots. Returns the number removed.
    pub fn prune(&self, keep: u64) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let cutoff = "SELECT id FROM stats_snapshots ORDER BY id DESC LIMIT -1 OFFSET ?1";

        tx.execute(
            &format!("DELETE FROM strategy_snapshots WHERE snapshot_id IN ({cutoff})"),
            [keep],
        )?;
        let removed = tx.execute(
            &format!("DELETE FROM stats_snapshots WHERE id IN ({cutoff})"),
            [keep],
        )?;
        tx.commit()?;

        if removed > 0 {
            debug!(removed, keep, "Old snapshots pruned");
        }
        Ok(removed)
    }
}

fn decimal(text: &str) -> Decimal {
    Decimal::from_str(text).unwrap_or_default()
}

fn timestamp_opt(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
