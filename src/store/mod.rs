//! Transactional persistence of match scores.
//!
//! Scores land in a SQLite table `bozorth3(probe TEXT, gallery TEXT,
//! score NUMERIC)`. Each probe group is written inside its own transaction
//! and committed before the next group starts, so a crash loses at most the
//! group in flight.

use crate::matcher::MatchResult;
use crate::trace::{trace_event, trace_span};
use crate::util::{FpMatchError, FpMatchResult};
use diesel::connection::{AnsiTransactionManager, SimpleConnection, TransactionManager};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::SqliteConnection;
use std::path::Path;

/// Schema statement, safe to run against an existing store.
pub const CREATE_TABLE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS bozorth3 (probe TEXT, gallery TEXT, score NUMERIC)";

/// Insert statement taking `(probe, gallery, score)`.
pub const INSERT_SQL: &str = "INSERT INTO bozorth3 (probe, gallery, score) VALUES (?, ?, ?)";

#[derive(QueryableByName)]
struct ScoreRow {
    #[diesel(sql_type = Text)]
    probe: String,
    #[diesel(sql_type = Text)]
    gallery: String,
    #[diesel(sql_type = BigInt)]
    score: i64,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    n: i64,
}

/// Relational store for match results, owned by the driving thread.
pub struct ResultStore {
    conn: SqliteConnection,
}

impl ResultStore {
    /// Opens (or creates) a store file and ensures the schema exists.
    pub fn open(path: &Path) -> FpMatchResult<Self> {
        let url = path
            .to_str()
            .ok_or(FpMatchError::InvalidInput("database path is not valid UTF-8"))?;
        Self::establish(url)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> FpMatchResult<Self> {
        Self::establish(":memory:")
    }

    fn establish(url: &str) -> FpMatchResult<Self> {
        let mut conn = SqliteConnection::establish(url)?;
        conn.batch_execute(CREATE_TABLE_SQL)?;
        Ok(Self { conn })
    }

    /// Starts a transaction for one probe group.
    ///
    /// Dropping the returned guard without committing rolls the group back.
    pub fn begin_group(&mut self) -> FpMatchResult<GroupTransaction<'_>> {
        AnsiTransactionManager::begin_transaction(&mut self.conn)?;
        Ok(GroupTransaction {
            conn: &mut self.conn,
            open: true,
            rows: 0,
        })
    }

    /// Inserts one group of results and commits it.
    pub fn insert_group(&mut self, results: &[MatchResult]) -> FpMatchResult<usize> {
        let _span = trace_span!("persist", rows = results.len()).entered();
        let mut tx = self.begin_group()?;
        for result in results {
            tx.insert(result)?;
        }
        let rows = tx.commit()?;
        trace_event!("group_committed", rows = rows);
        Ok(rows)
    }

    /// Number of persisted rows.
    pub fn count(&mut self) -> FpMatchResult<i64> {
        let row: CountRow =
            diesel::sql_query("SELECT COUNT(*) AS n FROM bozorth3").get_result(&mut self.conn)?;
        Ok(row.n)
    }

    /// Every persisted result in insertion order.
    pub fn results(&mut self) -> FpMatchResult<Vec<MatchResult>> {
        let rows: Vec<ScoreRow> =
            diesel::sql_query("SELECT probe, gallery, score FROM bozorth3 ORDER BY rowid")
                .load(&mut self.conn)?;
        Ok(rows
            .into_iter()
            .map(|row| MatchResult {
                probe_id: row.probe,
                gallery_id: row.gallery,
                score: row.score,
            })
            .collect())
    }
}

/// Open transaction covering one probe group.
pub struct GroupTransaction<'a> {
    conn: &'a mut SqliteConnection,
    open: bool,
    rows: usize,
}

impl GroupTransaction<'_> {
    /// Inserts one result into the pending group.
    pub fn insert(&mut self, result: &MatchResult) -> FpMatchResult<()> {
        diesel::sql_query(INSERT_SQL)
            .bind::<Text, _>(result.probe_id.as_str())
            .bind::<Text, _>(result.gallery_id.as_str())
            .bind::<BigInt, _>(result.score)
            .execute(&mut *self.conn)?;
        self.rows += 1;
        Ok(())
    }

    /// Commits the group and returns the number of rows written.
    pub fn commit(mut self) -> FpMatchResult<usize> {
        AnsiTransactionManager::commit_transaction(&mut *self.conn)?;
        self.open = false;
        Ok(self.rows)
    }
}

impl Drop for GroupTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            // nothing to report from a destructor; an unclosed transaction
            // is also discarded by SQLite when the connection closes
            let _ = AnsiTransactionManager::rollback_transaction(&mut *self.conn);
        }
    }
}
