//! rollcall-store — SQLite-backed embedding store.
//!
//! Embeddings are stored as little-endian `f32` blobs keyed by a UUID,
//! with the owning identity and a millisecond creation timestamp.

use chrono::{DateTime, Utc};
use rollcall_core::{
    Embedding, EmbeddingId, EmbeddingRecord, EmbeddingStore, Identity, StoreError,
    StoredEmbedding,
};
use rusqlite::{params, Connection, Row, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS face_embeddings (
    id          TEXT PRIMARY KEY NOT NULL,
    identity    TEXT NOT NULL,
    vector      BLOB NOT NULL,
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS face_embeddings_identity
    ON face_embeddings (identity, created_at);
";

#[derive(Error, Debug)]
pub enum SqliteStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid database value: {0}")]
    InvalidDbValue(String),
    #[error("connection lock poisoned")]
    Poisoned,
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::InvalidDbValue(msg) => StoreError::Corrupt(msg),
            SqliteStoreError::Poisoned => StoreError::Poisoned,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

type Result<T> = std::result::Result<T, SqliteStoreError>;

/// Embedding store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened embedding store");
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SqliteStoreError::Poisoned)
    }

    fn select_identity(&self, identity: &Identity) -> Result<Vec<StoredEmbedding>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, identity, vector, created_at FROM face_embeddings
             WHERE identity = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![identity.as_str()], raw_row)?;
        let stored = rows
            .map(|row| decode_stored(row?))
            .collect::<Result<Vec<_>>>()?;
        Ok(stored)
    }

    fn select_records(&self) -> Result<Vec<EmbeddingRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, identity, created_at FROM face_embeddings ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let records = rows
            .map(|row| {
                let (id, identity, created_at) = row?;
                decode_record(&id, &identity, created_at)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    fn insert(
        &self,
        identity: &Identity,
        embedding: &Embedding,
        created_at: DateTime<Utc>,
    ) -> Result<EmbeddingId> {
        let id = Uuid::new_v4();
        self.conn()?.execute(
            "INSERT INTO face_embeddings (id, identity, vector, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                identity.as_str(),
                encode_vector(&embedding.values),
                created_at.timestamp_millis()
            ],
        )?;
        Ok(id)
    }

    fn delete(&self, id: EmbeddingId) -> Result<bool> {
        let removed = self.conn()?.execute(
            "DELETE FROM face_embeddings WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(removed > 0)
    }

    fn delete_identity(&self, identity: &Identity) -> Result<Vec<EmbeddingRecord>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = {
            let mut stmt = tx.prepare(
                "SELECT id, identity, created_at FROM face_embeddings
                 WHERE identity = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![identity.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            rows.map(|row| {
                let (id, identity, created_at) = row?;
                decode_record(&id, &identity, created_at)
            })
            .collect::<Result<Vec<_>>>()?
        };
        tx.execute(
            "DELETE FROM face_embeddings WHERE identity = ?1",
            params![identity.as_str()],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    fn commit_enrollment(
        &self,
        identity: &Identity,
        embedding: &Embedding,
        created_at: DateTime<Utc>,
        prune: &[EmbeddingId],
    ) -> Result<EmbeddingId> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO face_embeddings (id, identity, vector, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                identity.as_str(),
                encode_vector(&embedding.values),
                created_at.timestamp_millis()
            ],
        )?;
        delete_ids(&tx, prune)?;
        tx.commit()?;
        Ok(id)
    }
}

fn delete_ids(tx: &Transaction<'_>, ids: &[EmbeddingId]) -> Result<()> {
    let mut stmt = tx.prepare("DELETE FROM face_embeddings WHERE id = ?1")?;
    for id in ids {
        stmt.execute(params![id.to_string()])?;
    }
    Ok(())
}

type RawRow = (String, String, Vec<u8>, i64);

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_stored((id, identity, vector, created_at): RawRow) -> Result<StoredEmbedding> {
    let record = decode_record(&id, &identity, created_at)?;
    Ok(StoredEmbedding {
        id: record.id,
        identity: record.identity,
        embedding: Embedding::new(decode_vector(&vector)?),
        created_at: record.created_at,
    })
}

fn decode_record(id: &str, identity: &str, created_at: i64) -> Result<EmbeddingRecord> {
    let id = Uuid::parse_str(id)
        .map_err(|e| SqliteStoreError::InvalidDbValue(format!("embedding id {id:?}: {e}")))?;
    let identity = Identity::parse(identity)
        .map_err(|e| SqliteStoreError::InvalidDbValue(format!("identity: {e}")))?;
    let created_at = DateTime::from_timestamp_millis(created_at).ok_or_else(|| {
        SqliteStoreError::InvalidDbValue(format!("created_at out of range: {created_at}"))
    })?;
    Ok(EmbeddingRecord {
        id,
        identity,
        created_at,
    })
}

fn encode_vector(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(SqliteStoreError::InvalidDbValue(format!(
            "vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

impl EmbeddingStore for SqliteStore {
    fn get_embeddings(
        &self,
        identity: &Identity,
    ) -> std::result::Result<Vec<StoredEmbedding>, StoreError> {
        Ok(self.select_identity(identity)?)
    }

    fn insert_embedding(
        &self,
        identity: &Identity,
        embedding: &Embedding,
        created_at: DateTime<Utc>,
    ) -> std::result::Result<EmbeddingId, StoreError> {
        Ok(self.insert(identity, embedding, created_at)?)
    }

    fn delete_embedding(&self, id: EmbeddingId) -> std::result::Result<bool, StoreError> {
        Ok(self.delete(id)?)
    }

    fn delete_all_embeddings(
        &self,
        identity: &Identity,
    ) -> std::result::Result<Vec<EmbeddingRecord>, StoreError> {
        Ok(self.delete_identity(identity)?)
    }

    fn all_embeddings(&self) -> std::result::Result<Vec<EmbeddingRecord>, StoreError> {
        Ok(self.select_records()?)
    }

    fn apply_enrollment(
        &self,
        identity: &Identity,
        embedding: &Embedding,
        created_at: DateTime<Utc>,
        prune: &[EmbeddingId],
    ) -> std::result::Result<EmbeddingId, StoreError> {
        Ok(self.commit_enrollment(identity, embedding, created_at, prune)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn s(key: &str) -> Identity {
        Identity::parse(key).unwrap()
    }

    #[test]
    fn test_vector_blob_roundtrip() {
        let values = vec![0.25f32, -1.5, 3.0e-7, f32::MAX];
        assert_eq!(decode_vector(&encode_vector(&values)).unwrap(), values);
    }

    #[test]
    fn test_vector_blob_bad_length() {
        assert!(matches!(
            decode_vector(&[0, 1, 2]),
            Err(SqliteStoreError::InvalidDbValue(_))
        ));
    }

    #[test]
    fn test_insert_and_get_ordered_by_age() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let newer = store
            .insert_embedding(&s("S1"), &Embedding::new(vec![1.0, 2.0]), now)
            .unwrap();
        let older = store
            .insert_embedding(&s("S1"), &Embedding::new(vec![3.0, 4.0]), now - Duration::days(2))
            .unwrap();
        store
            .insert_embedding(&s("S2"), &Embedding::new(vec![5.0, 6.0]), now)
            .unwrap();

        let got = store.get_embeddings(&s("S1")).unwrap();
        assert_eq!(got.iter().map(|e| e.id).collect::<Vec<_>>(), vec![older, newer]);
        assert_eq!(got[1].embedding.values, vec![1.0, 2.0]);
        assert_eq!(got[1].created_at.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_roster_lookup_keeps_unenrolled_members() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_embedding(&s("S1"), &Embedding::new(vec![1.0]), Utc::now())
            .unwrap();
        let roster = store.get_roster_embeddings(&[s("S1"), s("S2")]).unwrap();
        assert_eq!(roster[&s("S1")].len(), 1);
        assert!(roster[&s("S2")].is_empty());
    }

    #[test]
    fn test_delete_single_and_all() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let a = store.insert_embedding(&s("S1"), &Embedding::new(vec![1.0]), now).unwrap();
        store.insert_embedding(&s("S1"), &Embedding::new(vec![2.0]), now).unwrap();
        store.insert_embedding(&s("S2"), &Embedding::new(vec![3.0]), now).unwrap();

        assert!(store.delete_embedding(a).unwrap());
        assert!(!store.delete_embedding(a).unwrap());

        let removed = store.delete_all_embeddings(&s("S1")).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].identity, s("S1"));

        let all = store.all_embeddings().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].identity, s("S2"));
    }

    #[test]
    fn test_apply_enrollment_inserts_and_prunes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let outlier = store.insert_embedding(&s("S1"), &Embedding::new(vec![9.0]), now).unwrap();
        let kept = store.insert_embedding(&s("S1"), &Embedding::new(vec![1.0]), now).unwrap();

        let new_id = store
            .apply_enrollment(&s("S1"), &Embedding::new(vec![1.1]), now, &[outlier])
            .unwrap();

        let ids: Vec<EmbeddingId> = store
            .get_embeddings(&s("S1"))
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&kept));
        assert!(ids.contains(&new_id));
    }

    #[test]
    fn test_failed_enrollment_commit_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let outlier = store.insert_embedding(&s("S1"), &Embedding::new(vec![9.0]), now).unwrap();
        let kept = store.insert_embedding(&s("S1"), &Embedding::new(vec![1.0]), now).unwrap();
        // The insert succeeds, then the prune aborts.
        store
            .conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER block_delete BEFORE DELETE ON face_embeddings
                 BEGIN SELECT RAISE(ABORT, 'deletes disabled'); END;",
            )
            .unwrap();

        let result = store.apply_enrollment(&s("S1"), &Embedding::new(vec![1.1]), now, &[outlier]);
        assert!(matches!(result, Err(StoreError::Backend(_))));

        let mut ids: Vec<EmbeddingId> = store
            .get_embeddings(&s("S1"))
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        ids.sort();
        let mut expected = vec![outlier, kept];
        expected.sort();
        assert_eq!(ids, expected);
        assert_eq!(store.all_embeddings().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_identity_row_surfaces_as_corrupt() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO face_embeddings (id, identity, vector, created_at)
                 VALUES (?1, 'bad key!', x'0000803f', 0)",
                params![Uuid::new_v4().to_string()],
            )
            .unwrap();
        assert!(matches!(store.all_embeddings(), Err(StoreError::Corrupt(_))));
    }
}
