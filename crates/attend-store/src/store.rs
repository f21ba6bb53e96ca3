use attend_core::{
    DescriptorError, FaceDescriptor, GalleryError, GallerySource, IdentityId, StoredDescriptor,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS students (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    roll_number TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS face_encodings (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    encoding   TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_face_encodings_student ON face_encodings(student_id);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("student not found: {0}")]
    StudentNotFound(String),
    #[error("student id or roll number already enrolled: {0}")]
    Conflict(String),
    #[error("cannot encode descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("invalid timestamp in database: {0}")]
    InvalidTimestamp(String),
}

/// An enrolled student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    pub id: IdentityId,
    pub name: String,
    pub roll_number: String,
    pub created_at: DateTime<Utc>,
}

/// What [`Store::enroll`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrolled {
    /// The student as stored, which may predate this enrollment.
    pub student: Student,
    /// Whether the student row was created by this enrollment.
    pub created: bool,
    /// Encodings added.
    pub stored: usize,
}

/// SQLite-backed enrollment store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        tracing::info!(path = %path.display(), "opened enrollment store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", 1)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    pub fn add_student(
        &self,
        id: &IdentityId,
        name: &str,
        roll_number: &str,
    ) -> Result<Student, StoreError> {
        let student = insert_student(&self.conn, id, name, roll_number)?;
        tracing::info!(student = %id, roll_number, "student enrolled");
        Ok(student)
    }

    pub fn student(&self, id: &IdentityId) -> Result<Option<Student>, StoreError> {
        fetch_student(&self.conn, id)
    }

    /// All students, ordered by roll number.
    pub fn students(&self) -> Result<Vec<Student>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, roll_number, created_at FROM students ORDER BY roll_number",
        )?;
        let rows = stmt.query_map([], decode_student_row)?;

        let mut students = Vec::new();
        for row in rows {
            students.push(row??);
        }
        Ok(students)
    }

    /// Remove a student together with all of their encodings.
    /// Returns `false` if the student did not exist.
    pub fn remove_student(&self, id: &IdentityId) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM students WHERE id = ?1", params![id.as_str()])?;
        if removed > 0 {
            tracing::info!(student = %id, "student removed");
        }
        Ok(removed > 0)
    }

    /// Persist one descriptor for an existing student. Returns the row id.
    pub fn add_encoding(
        &self,
        student_id: &IdentityId,
        descriptor: &FaceDescriptor,
    ) -> Result<i64, StoreError> {
        if self.student(student_id)?.is_none() {
            return Err(StoreError::StudentNotFound(student_id.to_string()));
        }
        insert_encoding(&self.conn, student_id, &descriptor.to_json()?)
    }

    /// Create the student if needed and store `descriptors` for them, all in
    /// one transaction. An existing student keeps their stored name and roll
    /// number.
    pub fn enroll(
        &mut self,
        id: &IdentityId,
        name: &str,
        roll_number: &str,
        descriptors: &[FaceDescriptor],
    ) -> Result<Enrolled, StoreError> {
        let encodings = descriptors
            .iter()
            .map(FaceDescriptor::to_json)
            .collect::<Result<Vec<_>, _>>()?;

        let tx = self.conn.transaction()?;
        let (student, created) = match fetch_student(&tx, id)? {
            Some(existing) => (existing, false),
            None => (insert_student(&tx, id, name, roll_number)?, true),
        };
        for encoding in &encodings {
            insert_encoding(&tx, id, encoding)?;
        }
        tx.commit()?;

        tracing::info!(
            student = %id,
            created,
            encodings = encodings.len(),
            "enrollment committed"
        );
        Ok(Enrolled {
            student,
            created,
            stored: encodings.len(),
        })
    }

    pub fn encoding_count(&self, student_id: &IdentityId) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM face_encodings WHERE student_id = ?1",
            params![student_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn encodings(&self) -> Result<Vec<StoredDescriptor>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id, encoding FROM face_encodings ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredDescriptor {
                identity: IdentityId::new(row.get::<_, String>(0)?),
                encoding: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl GallerySource for Store {
    fn load_entries(&self) -> Result<Vec<StoredDescriptor>, GalleryError> {
        self.encodings().map_err(GalleryError::unavailable)
    }
}

fn insert_student(
    conn: &Connection,
    id: &IdentityId,
    name: &str,
    roll_number: &str,
) -> Result<Student, StoreError> {
    let created_at = now();
    conn.execute(
        "INSERT INTO students (id, name, roll_number, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id.as_str(), name, roll_number, format_timestamp(&created_at)],
    )
    .map_err(|e| match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => {
            StoreError::Conflict(format!("id={id}, roll_number={roll_number}"))
        }
        _ => StoreError::Sqlite(e),
    })?;

    Ok(Student {
        id: id.clone(),
        name: name.to_string(),
        roll_number: roll_number.to_string(),
        created_at,
    })
}

fn fetch_student(conn: &Connection, id: &IdentityId) -> Result<Option<Student>, StoreError> {
    conn.query_row(
        "SELECT id, name, roll_number, created_at FROM students WHERE id = ?1",
        params![id.as_str()],
        decode_student_row,
    )
    .optional()?
    .transpose()
}

fn insert_encoding(
    conn: &Connection,
    student_id: &IdentityId,
    encoding: &str,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO face_encodings (student_id, encoding, created_at) VALUES (?1, ?2, ?3)",
        params![student_id.as_str(), encoding, format_timestamp(&now())],
    )?;
    let row_id = conn.last_insert_rowid();
    tracing::debug!(student = %student_id, row_id, "encoding stored");
    Ok(row_id)
}

fn decode_student_row(row: &Row<'_>) -> rusqlite::Result<Result<Student, StoreError>> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let roll_number: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    Ok(parse_timestamp(&created_at).map(|created_at| Student {
        id: IdentityId::new(id),
        name,
        roll_number,
        created_at,
    }))
}

fn now() -> DateTime<Utc> {
    // Second precision so a stored timestamp reads back equal.
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidTimestamp(format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attend_core::Gallery;

    fn id(s: &str) -> IdentityId {
        IdentityId::from(s)
    }

    fn descriptor(values: &[f64]) -> FaceDescriptor {
        FaceDescriptor::new(values.to_vec()).unwrap()
    }

    #[test]
    fn test_add_and_fetch_student() {
        let store = Store::open_in_memory().unwrap();
        let added = store.add_student(&id("s-1"), "Asha", "R001").unwrap();
        let fetched = store.student(&id("s-1")).unwrap().unwrap();
        assert_eq!(added, fetched);
        assert!(store.student(&id("s-2")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_roll_number_conflicts() {
        let store = Store::open_in_memory().unwrap();
        store.add_student(&id("s-1"), "Asha", "R001").unwrap();
        let err = store.add_student(&id("s-2"), "Ben", "R001").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let err = store.add_student(&id("s-1"), "Asha again", "R002").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_students_ordered_by_roll() {
        let store = Store::open_in_memory().unwrap();
        store.add_student(&id("c"), "Cara", "R003").unwrap();
        store.add_student(&id("a"), "Asha", "R001").unwrap();
        store.add_student(&id("b"), "Ben", "R002").unwrap();
        let rolls: Vec<String> =
            store.students().unwrap().into_iter().map(|s| s.roll_number).collect();
        assert_eq!(rolls, vec!["R001", "R002", "R003"]);
    }

    #[test]
    fn test_encoding_requires_student() {
        let store = Store::open_in_memory().unwrap();
        let err = store.add_encoding(&id("ghost"), &descriptor(&[0.1])).unwrap_err();
        assert!(matches!(err, StoreError::StudentNotFound(_)));
    }

    #[test]
    fn test_remove_cascades_to_encodings() {
        let store = Store::open_in_memory().unwrap();
        store.add_student(&id("s-1"), "Asha", "R001").unwrap();
        store.add_encoding(&id("s-1"), &descriptor(&[0.1, 0.2])).unwrap();
        store.add_encoding(&id("s-1"), &descriptor(&[0.3, 0.4])).unwrap();
        assert_eq!(store.encoding_count(&id("s-1")).unwrap(), 2);

        assert!(store.remove_student(&id("s-1")).unwrap());
        assert!(!store.remove_student(&id("s-1")).unwrap());
        assert_eq!(store.encoding_count(&id("s-1")).unwrap(), 0);
        assert!(store.load_entries().unwrap().is_empty());
    }

    #[test]
    fn test_gallery_entries_in_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        store.add_student(&id("a"), "Asha", "R001").unwrap();
        store.add_student(&id("b"), "Ben", "R002").unwrap();
        store.add_encoding(&id("b"), &descriptor(&[1.0, 0.0])).unwrap();
        store.add_encoding(&id("a"), &descriptor(&[0.0, 1.0])).unwrap();
        store.add_encoding(&id("b"), &descriptor(&[0.5, 0.5])).unwrap();

        let identities: Vec<String> = store
            .load_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.identity.as_str().to_string())
            .collect();
        assert_eq!(identities, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_stored_descriptor_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.add_student(&id("a"), "Asha", "R001").unwrap();
        let original = descriptor(&[0.123456789012345, -0.987654321098765, 1e-12]);
        store.add_encoding(&id("a"), &original).unwrap();

        let load = Gallery::load(&store, None).unwrap();
        assert!(load.rejected.is_empty());
        for (a, b) in load.gallery.descriptors()[0].values().iter().zip(original.values()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_corrupt_row_is_rejected_not_fatal() {
        let store = Store::open_in_memory().unwrap();
        store.add_student(&id("a"), "Asha", "R001").unwrap();
        store.add_student(&id("b"), "Ben", "R002").unwrap();
        store.add_encoding(&id("a"), &descriptor(&[0.1, 0.2])).unwrap();
        insert_encoding(&store.conn, &id("b"), "[0.1, oops").unwrap();

        let load = Gallery::load(&store, None).unwrap();
        assert_eq!(load.gallery.len(), 1);
        assert_eq!(load.rejected.len(), 1);
        assert_eq!(load.rejected[0].identity.as_str(), "b");
    }

    #[test]
    fn test_enroll_creates_student_with_encodings() {
        let mut store = Store::open_in_memory().unwrap();
        let descriptors = [descriptor(&[0.1, 0.2]), descriptor(&[0.3, 0.4])];
        let enrolled = store.enroll(&id("a"), "Asha", "R001", &descriptors).unwrap();

        assert!(enrolled.created);
        assert_eq!(enrolled.stored, 2);
        assert_eq!(enrolled.student.name, "Asha");
        assert_eq!(store.encoding_count(&id("a")).unwrap(), 2);
    }

    #[test]
    fn test_enroll_existing_student_keeps_details() {
        let mut store = Store::open_in_memory().unwrap();
        store.add_student(&id("a"), "Asha", "R001").unwrap();
        let enrolled = store
            .enroll(&id("a"), "Someone Else", "R999", &[descriptor(&[0.5, 0.5])])
            .unwrap();

        assert!(!enrolled.created);
        assert_eq!(enrolled.student.roll_number, "R001");
        assert_eq!(store.encoding_count(&id("a")).unwrap(), 1);
    }

    #[test]
    fn test_failed_enroll_leaves_nothing_behind() {
        let mut store = Store::open_in_memory().unwrap();
        // The second encoding insert of any enrollment fails.
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER one_encoding BEFORE INSERT ON face_encodings
                 WHEN (SELECT COUNT(*) FROM face_encodings WHERE student_id = NEW.student_id) >= 1
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let descriptors = [descriptor(&[0.1, 0.2]), descriptor(&[0.3, 0.4])];
        assert!(store.enroll(&id("a"), "Asha", "R001", &descriptors).is_err());
        assert!(store.student(&id("a")).unwrap().is_none());
        assert_eq!(store.encoding_count(&id("a")).unwrap(), 0);
    }

    #[test]
    fn test_enroll_roll_conflict_writes_nothing() {
        let mut store = Store::open_in_memory().unwrap();
        store.add_student(&id("a"), "Asha", "R001").unwrap();
        let err = store
            .enroll(&id("b"), "Ben", "R001", &[descriptor(&[0.1, 0.2])])
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.encoding_count(&id("b")).unwrap(), 0);
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("attend.db");
        {
            let store = Store::open(&path).unwrap();
            store.add_student(&id("a"), "Asha", "R001").unwrap();
            store.add_encoding(&id("a"), &descriptor(&[0.25, 0.75])).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.students().unwrap().len(), 1);
        assert_eq!(store.encoding_count(&id("a")).unwrap(), 1);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = now();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
        assert!(matches!(parse_timestamp("yesterday"), Err(StoreError::InvalidTimestamp(_))));
    }
}
