use crate::error::{AppError, Result};
use crate::models::Candle;
use log::{debug, info};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Database handler for the append-only candle store.
///
/// Rows are keyed by open_time; the primary key is the uniqueness guard that
/// makes `insert_candle_if_absent` a single idempotent operation. Nothing in
/// this module updates or deletes a candle row.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::new(manager)
            .map_err(|e| AppError::DatabaseError(format!("Failed to create connection pool: {}", e)))?;

        info!("Database initialized at {}", db_path.display());
        Ok(Self { pool })
    }

    fn get_connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::DatabaseError(format!("Failed to get connection: {}", e)))
    }

    /// Table name for a symbol and interval, e.g. btc_1h for BTCUSDT/1h.
    fn table_name(symbol: &str, interval: &str) -> String {
        let symbol_lower = symbol.to_lowercase().replace("usdt", "");
        let interval_lower = interval.to_lowercase();

        // Symbols starting with a digit get a "k_" prefix
        if symbol_lower.chars().next().unwrap_or('a').is_ascii_digit() {
            format!("k_{symbol_lower}_{interval_lower}")
        } else {
            format!("{symbol_lower}_{interval_lower}")
        }
    }

    fn table_exists(&self, table_name: &str) -> Result<bool> {
        let conn = self.get_connection()?;
        let exists: bool = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?",
                params![table_name],
                |row| row.get::<_, i64>(0).map(|count| count > 0),
            )
            .unwrap_or(false);
        Ok(exists)
    }

    /// Ensure the candle table exists for a specific symbol and interval.
    pub fn ensure_symbol_table(&self, symbol: &str, interval: &str) -> Result<()> {
        let conn = self.get_connection()?;
        let table_name = Self::table_name(symbol, interval);

        let create_table_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                open_time INTEGER PRIMARY KEY,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                close_time INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            table_name
        );

        conn.execute(&create_table_sql, [])
            .map_err(|e| AppError::DatabaseError(format!("Failed to create table {}: {}", table_name, e)))?;

        Ok(())
    }

    /// Insert a candle unless its open_time is already present.
    ///
    /// Returns whether a row was written. The presence check and the write
    /// are one guarded statement, so repeated invocations converge on the
    /// same store state.
    pub fn insert_candle_if_absent(&self, symbol: &str, interval: &str, candle: &Candle) -> Result<bool> {
        let conn = self.get_connection()?;
        let table_name = Self::table_name(symbol, interval);

        let insert_sql = format!(
            "INSERT OR IGNORE INTO {} (
                open_time, open, high, low, close, volume, close_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            table_name
        );

        let changed = conn
            .execute(
                &insert_sql,
                params![
                    candle.open_time,
                    candle.open,
                    candle.high,
                    candle.low,
                    candle.close,
                    candle.volume,
                    candle.close_time,
                ],
            )
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to insert candle into {}: {}", table_name, e))
            })?;

        debug!(
            "insert_candle_if_absent {} open_time={} inserted={}",
            table_name,
            candle.open_time,
            changed > 0
        );
        Ok(changed > 0)
    }

    /// Read the last `n` candles with open_time strictly before
    /// `end_exclusive`, returned ascending.
    pub fn get_candles_before(
        &self,
        symbol: &str,
        interval: &str,
        n: usize,
        end_exclusive: i64,
    ) -> Result<Vec<Candle>> {
        let table_name = Self::table_name(symbol, interval);
        if n == 0 || !self.table_exists(&table_name)? {
            return Ok(Vec::new());
        }

        let conn = self.get_connection()?;
        let query = format!(
            "SELECT open_time, open, high, low, close, volume, close_time
             FROM {} WHERE open_time < ? ORDER BY open_time DESC LIMIT ?",
            table_name
        );

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![end_exclusive, n as i64], Self::row_to_candle)?;

        let mut candles = rows.collect::<std::result::Result<Vec<Candle>, _>>()?;
        candles.reverse();
        Ok(candles)
    }

    /// Read a single candle by its open_time.
    pub fn get_candle_by_time(&self, symbol: &str, interval: &str, open_time: i64) -> Result<Option<Candle>> {
        let table_name = Self::table_name(symbol, interval);
        if !self.table_exists(&table_name)? {
            return Ok(None);
        }

        let conn = self.get_connection()?;
        let query = format!(
            "SELECT open_time, open, high, low, close, volume, close_time
             FROM {} WHERE open_time = ?",
            table_name
        );

        let candle = conn
            .query_row(&query, params![open_time], Self::row_to_candle)
            .optional()?;
        Ok(candle)
    }

    /// Get the latest stored open_time for a symbol and interval.
    pub fn get_latest_open_time(&self, symbol: &str, interval: &str) -> Result<Option<i64>> {
        let table_name = Self::table_name(symbol, interval);
        if !self.table_exists(&table_name)? {
            return Ok(None);
        }

        let conn = self.get_connection()?;
        let query = format!("SELECT MAX(open_time) FROM {}", table_name);
        let result: Option<i64> = conn
            .query_row(&query, [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(result)
    }

    /// Coverage stats: (min open_time, max open_time, row count).
    ///
    /// Returns None while the table is empty or missing.
    pub fn coverage(&self, symbol: &str, interval: &str) -> Result<Option<(i64, i64, i64)>> {
        let table_name = Self::table_name(symbol, interval);
        if !self.table_exists(&table_name)? {
            return Ok(None);
        }

        let conn = self.get_connection()?;
        let query = format!("SELECT MIN(open_time), MAX(open_time), COUNT(*) FROM {}", table_name);
        let row: (Option<i64>, Option<i64>, i64) = conn.query_row(&query, [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        match row {
            (Some(min), Some(max), count) => Ok(Some((min, max, count))),
            _ => Ok(None),
        }
    }

    fn row_to_candle(row: &rusqlite::Row<'_>) -> rusqlite::Result<Candle> {
        Ok(Candle {
            open_time: row.get(0)?,
            open: row.get(1)?,
            high: row.get(2)?,
            low: row.get(3)?,
            close: row.get(4)?,
            volume: row.get(5)?,
            close_time: row.get(6)?,
        })
    }
}
