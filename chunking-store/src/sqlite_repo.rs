use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chunk_model::{ChunkId, ChunkRecord};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::vec_index::encode_vector;
use crate::{vector_ext, ChunkPrimaryStore, ChunkVectors, IndexedChunk, ReplaceReport, StoreError, StoreOptions, VectorMode, VectorSpace};

/// Column list read by [`record_from_row`], qualified by the `c` alias.
pub(crate) const CHUNK_COLUMNS: &str =
    "c.id, c.source_type, c.source_path, c.section, c.content, c.line_start, c.line_end, c.keywords, c.updated_at";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        chunk_id: ChunkId(row.get(0)?),
        source_type: row.get(1)?,
        source_path: row.get(2)?,
        section: row.get(3)?,
        content: row.get(4)?,
        line_start: row.get(5)?,
        line_end: row.get(6)?,
        keywords: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// SQLite-backed primary store. FTS5 text search lives in `fts5_index`,
/// KNN search in `vec_index`.
///
/// Chunks, their FTS rows and their vector rows are only ever changed together
/// inside one transaction.
pub struct SqliteRepo {
    conn: Connection,
    dimension: usize,
    vec_version: Option<String>,
}

impl SqliteRepo {
    /// Open a file-backed repository at `path` and initialize schema if absent.
    pub fn open<P: AsRef<Path>>(path: P, opts: &StoreOptions) -> Result<Self, StoreError> {
        prepare_vector_mode(&opts.vector);
        let conn = Connection::open(path)?;
        Self::from_connection(conn, opts)
    }

    /// Open an in-memory repository and initialize schema.
    pub fn open_in_memory(opts: &StoreOptions) -> Result<Self, StoreError> {
        prepare_vector_mode(&opts.vector);
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, opts)
    }

    fn from_connection(conn: Connection, opts: &StoreOptions) -> Result<Self, StoreError> {
        if opts.dimension == 0 {
            return Err(StoreError::InvalidChunk("vector dimension must be greater than zero".into()));
        }
        let vec_version = match &opts.vector {
            VectorMode::Disabled => None,
            VectorMode::Auto => vector_ext::vec_version(&conn),
            VectorMode::Dynamic(path) => {
                vector_ext::load_dynamic(&conn, path)?;
                vector_ext::vec_version(&conn)
            }
        };
        if vec_version.is_none() && opts.vector != VectorMode::Disabled {
            tracing::warn!("vec0 module unavailable; vector search disabled");
        }
        tracing::debug!(vec_version = ?vec_version, dimension = opts.dimension, "opened chunk store");
        let repo = Self { conn, dimension: opts.dimension, vec_version };
        repo.init()?;
        Ok(repo)
    }

    pub(crate) fn conn(&self) -> &Connection { &self.conn }

    pub fn vector_available(&self) -> bool { self.vec_version.is_some() }

    pub fn vec_version(&self) -> Option<&str> { self.vec_version.as_deref() }

    pub fn dimension(&self) -> usize { self.dimension }

    fn init(&self) -> rusqlite::Result<()> {
        // Concurrent writers wait instead of failing with SQLITE_BUSY
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        // Pragmas for durability and concurrency
        self.conn.pragma_update(None, "journal_mode", &"WAL")?;
        self.conn.pragma_update(None, "synchronous", &"FULL")?;

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                source_type TEXT NOT NULL,
                source_path TEXT NOT NULL,
                section TEXT NOT NULL,
                content TEXT NOT NULL,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                keywords TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_id ON chunks(id);
            CREATE INDEX IF NOT EXISTS idx_chunks_source_path ON chunks(source_path);
            CREATE INDEX IF NOT EXISTS idx_chunks_source_type ON chunks(source_type);

            -- FTS5 virtual table linked to chunks via content= and rowid
            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                keywords,
                content='chunks',
                content_rowid='rowid',
                tokenize = 'unicode61'
            );

            -- Triggers to keep FTS index consistent
            CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, keywords) VALUES (new.rowid, new.keywords);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, keywords) VALUES ('delete', old.rowid, old.keywords);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE OF keywords ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, keywords) VALUES ('delete', old.rowid, old.keywords);
                INSERT INTO chunks_fts(rowid, keywords) VALUES (new.rowid, new.keywords);
            END;
            "#,
        )?;

        if self.vector_available() {
            for space in VectorSpace::ALL {
                self.conn.execute_batch(&format!(
                    "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING vec0(embedding float[{}] distance_metric=cosine);",
                    space.table(),
                    self.dimension
                ))?;
            }
        }
        Ok(())
    }

    /// Insert or overwrite one chunk (matched by id) and its vectors.
    pub fn upsert_chunk(&mut self, chunk: &IndexedChunk) -> Result<(), StoreError> {
        let vector_enabled = self.vector_available();
        let dimension = self.dimension;
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        write_chunk(&tx, chunk, vector_enabled, dimension)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete every chunk attributed to `source_path`, then write `chunks`, in a
    /// single transaction. Readers see either the old set or the new set.
    pub fn replace_chunks_for_path(
        &mut self,
        source_path: &str,
        chunks: &[IndexedChunk],
    ) -> Result<ReplaceReport, StoreError> {
        if let Some(stray) = chunks.iter().find(|c| c.record.source_path != source_path) {
            return Err(StoreError::InvalidChunk(format!(
                "chunk {} belongs to `{}`, not `{source_path}`",
                stray.record.chunk_id, stray.record.source_path
            )));
        }
        let vector_enabled = self.vector_available();
        let dimension = self.dimension;
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stale_deleted = delete_path_tx(&tx, source_path, vector_enabled)?;
        let mut written = 0usize;
        for chunk in chunks {
            write_chunk(&tx, chunk, vector_enabled, dimension)?;
            written += 1;
        }
        tx.commit()?;
        Ok(ReplaceReport { stale_deleted, written })
    }

    /// Remove all chunks (and their FTS and vector rows) for `source_path`.
    pub fn delete_chunks_for_path(&mut self, source_path: &str) -> Result<usize, StoreError> {
        let vector_enabled = self.vector_available();
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let n = delete_path_tx(&tx, source_path, vector_enabled)?;
        tx.commit()?;
        Ok(n)
    }

    /// Remove specific chunks by id.
    pub fn delete_chunks_for_ids(&mut self, ids: &[ChunkId]) -> Result<usize, StoreError> {
        if ids.is_empty() { return Ok(0); }
        let vector_enabled = self.vector_available();
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let placeholders = placeholders(ids.len());
        let params: Vec<&str> = ids.iter().map(|c| c.as_str()).collect();
        let rowids = select_rowids(&tx, &format!("SELECT rowid FROM chunks WHERE id IN {placeholders}"), &params)?;
        if vector_enabled {
            delete_vectors_tx(&tx, &rowids)?;
        }
        let n = tx.execute(
            &format!("DELETE FROM chunks WHERE id IN {placeholders}"),
            rusqlite::params_from_iter(params.iter()),
        )?;
        tx.commit()?;
        Ok(n)
    }

    pub fn get_chunk_by_id(&self, id: &ChunkId) -> Result<Option<ChunkRecord>, StoreError> {
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.id = ?1");
        Ok(self.conn.query_row(&sql, [id.as_str()], record_from_row).optional()?)
    }

    /// Chunks of one source path in line order.
    pub fn chunks_for_path(&self, source_path: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.source_path = ?1 ORDER BY c.line_start, c.rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([source_path], record_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn count_chunks(&self) -> Result<i64, StoreError> {
        Ok(self.conn.query_row("SELECT count(*) FROM chunks", [], |r| r.get(0))?)
    }

    pub fn count_by_source_type(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT source_type, count(*) FROM chunks GROUP BY source_type")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        let mut out = BTreeMap::new();
        for r in rows {
            let (k, v) = r?;
            out.insert(k, v);
        }
        Ok(out)
    }

    /// Number of vector rows in one space; 0 when vectors are unavailable.
    pub fn count_vectors(&self, space: VectorSpace) -> Result<i64, StoreError> {
        if !self.vector_available() { return Ok(0); }
        let sql = format!("SELECT count(*) FROM {}", space.table());
        Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
    }

    /// Distinct indexed source paths starting with `prefix`, sorted.
    pub fn indexed_paths(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT source_path FROM chunks WHERE substr(source_path, 1, length(?1)) = ?1 ORDER BY source_path",
        )?;
        let rows = stmt.query_map([prefix], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

impl ChunkPrimaryStore for SqliteRepo {
    fn upsert_chunks(&mut self, chunks: Vec<IndexedChunk>) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let vector_enabled = self.vector_available();
        let dimension = self.dimension;
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for chunk in &chunks {
            write_chunk(&tx, chunk, vector_enabled, dimension)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_by_ids(&mut self, ids: &[ChunkId]) -> Result<usize, StoreError> {
        self.delete_chunks_for_ids(ids)
    }
}

fn prepare_vector_mode(mode: &VectorMode) {
    if *mode == VectorMode::Auto {
        vector_ext::register_bundled();
    }
}

fn placeholders(n: usize) -> String {
    let mut s = String::from("(");
    for i in 0..n { if i > 0 { s.push(','); } s.push('?'); }
    s.push(')');
    s
}

fn select_rowids(tx: &Transaction<'_>, sql: &str, params: &[&str]) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = tx.prepare(sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |r| r.get::<_, i64>(0))?;
    rows.collect()
}

fn delete_vectors_tx(tx: &Transaction<'_>, rowids: &[i64]) -> rusqlite::Result<()> {
    if rowids.is_empty() { return Ok(()); }
    for space in VectorSpace::ALL {
        let mut stmt = tx.prepare_cached(&format!("DELETE FROM {} WHERE rowid = ?1", space.table()))?;
        for rowid in rowids {
            stmt.execute([rowid])?;
        }
    }
    Ok(())
}

fn delete_path_tx(tx: &Transaction<'_>, source_path: &str, vector_enabled: bool) -> rusqlite::Result<usize> {
    if vector_enabled {
        let rowids = select_rowids(tx, "SELECT rowid FROM chunks WHERE source_path = ?", &[source_path])?;
        delete_vectors_tx(tx, &rowids)?;
    }
    tx.execute("DELETE FROM chunks WHERE source_path = ?1", [source_path])
}

fn write_chunk(tx: &Transaction<'_>, chunk: &IndexedChunk, vector_enabled: bool, dimension: usize) -> Result<(), StoreError> {
    let rec = &chunk.record;
    rec.validate_soft().map_err(StoreError::InvalidChunk)?;
    if let Some(v) = &chunk.vectors {
        check_dimension(v, dimension)?;
    }

    tx.execute(
        r#"
        INSERT INTO chunks (
            id, source_type, source_path, section, content,
            line_start, line_end, keywords, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            source_type=excluded.source_type,
            source_path=excluded.source_path,
            section=excluded.section,
            content=excluded.content,
            line_start=excluded.line_start,
            line_end=excluded.line_end,
            keywords=excluded.keywords,
            updated_at=excluded.updated_at
        ;
        "#,
        params![
            rec.chunk_id.as_str(),
            rec.source_type,
            rec.source_path,
            rec.section,
            rec.content,
            rec.line_start,
            rec.line_end,
            rec.keywords,
            rec.updated_at,
        ],
    )?;

    if !vector_enabled {
        return Ok(());
    }
    let rowid: i64 = tx.query_row("SELECT rowid FROM chunks WHERE id = ?1", [rec.chunk_id.as_str()], |r| r.get(0))?;
    // vec0 has no upsert; clear then insert.
    delete_vectors_tx(tx, &[rowid])?;
    if let Some(v) = &chunk.vectors {
        for space in VectorSpace::ALL {
            tx.execute(
                &format!("INSERT INTO {}(rowid, embedding) VALUES (?1, ?2)", space.table()),
                params![rowid, encode_vector(v.get(space))],
            )?;
        }
    }
    Ok(())
}

fn check_dimension(v: &ChunkVectors, dimension: usize) -> Result<(), StoreError> {
    for space in VectorSpace::ALL {
        let actual = v.get(space).len();
        if actual != dimension {
            return Err(StoreError::Dimension { expected: dimension, actual });
        }
    }
    Ok(())
}
