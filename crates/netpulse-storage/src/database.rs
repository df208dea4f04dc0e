// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes: the
//! single writer plus SQL transactions is the serialization point that
//! makes claim/submit/extend atomic with respect to each other.

use netpulse_core::NetpulseError;

/// Handle to the SQLite database.
///
/// Cloning is cheap; all clones share the single writer connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` with WAL mode and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, NetpulseError> {
        Self::open_with(path, true).await
    }

    /// Open with an explicit WAL mode choice.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, NetpulseError> {
        let conn = tokio_rusqlite::Connection::open(path.to_string())
            .await
            .map_err(|e| map_tr_err(e.into()))?;

        conn.call(move |conn| {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;

            crate::migrations::run_migrations(conn)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        tracing::debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection for `call()` access.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Close the database, flushing the WAL.
    pub async fn close(self) -> Result<(), NetpulseError> {
        self.conn.close().await.map_err(map_tr_err)
    }
}

/// Map a tokio-rusqlite error into the storage error variant.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> NetpulseError {
    NetpulseError::Storage {
        source: Box::new(e),
    }
}
