//! SQLite-backed document store
//!
//! The local store the CLI runs against. Partitions are rows in `users`;
//! notes and schedules hang off them by `owner_id`.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

use super::schema::{init_schema, needs_init};
use super::{DocumentStore, NoteQuery, StoreError, StoreResult};
use crate::config::Config;
use crate::models::{
    ImageAttachment, Note, NoteContent, NoteId, NoteKind, Provenance, ShareToken, Sharing,
    SoapSections, User, UserId,
};
use crate::shifts::{Shift, ShiftDraft, ShiftId, ShiftType};

const NOTE_COLUMNS: &str = "owner_id, id, title, body, note_type, subjective, objective, \
     assessment, plan, display_date, shared, share_token, shared_at, copied_from, \
     original_share_token, created_at, updated_at";

const SHIFT_COLUMNS: &str =
    "owner_id, id, date, start_time, end_time, location, notes, shift_type, created_at, updated_at";

const TIME_FORMAT: &str = "%H:%M";

/// SQLite document store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `config.sqlite_path()`
    pub fn open(config: &Config) -> StoreResult<Self> {
        let path = config.sqlite_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            debug!("Initializing schema at {:?}", path);
            init_schema(&conn)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database lock poisoned".to_string()))
    }

    /// Number of notes across all partitions
    pub fn note_count(&self) -> StoreResult<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?)
    }

    /// Number of shifts across all partitions
    pub fn shift_count(&self) -> StoreResult<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))?)
    }
}

// ==================== Row Mapping ====================

struct NoteRow {
    owner_id: String,
    id: String,
    title: String,
    body: String,
    note_type: String,
    subjective: Option<String>,
    objective: Option<String>,
    assessment: Option<String>,
    plan: Option<String>,
    display_date: String,
    shared: bool,
    share_token: Option<String>,
    shared_at: Option<i64>,
    copied_from: Option<String>,
    original_share_token: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl NoteRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner_id: row.get(0)?,
            id: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            note_type: row.get(4)?,
            subjective: row.get(5)?,
            objective: row.get(6)?,
            assessment: row.get(7)?,
            plan: row.get(8)?,
            display_date: row.get(9)?,
            shared: row.get(10)?,
            share_token: row.get(11)?,
            shared_at: row.get(12)?,
            copied_from: row.get(13)?,
            original_share_token: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }
}

struct ShiftRow {
    owner_id: String,
    id: String,
    date: String,
    start_time: String,
    end_time: String,
    location: String,
    notes: String,
    shift_type: String,
    created_at: i64,
    updated_at: i64,
}

impl ShiftRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner_id: row.get(0)?,
            id: row.get(1)?,
            date: row.get(2)?,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
            location: row.get(5)?,
            notes: row.get(6)?,
            shift_type: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(id: &str, ms: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::InvalidRecord {
            id: id.to_string(),
            details: format!("timestamp out of range: {}", ms),
        })
}

fn hydrate_note(conn: &Connection, row: NoteRow) -> StoreResult<Note> {
    let kind = NoteKind::parse(&row.note_type).ok_or_else(|| StoreError::InvalidRecord {
        id: row.id.clone(),
        details: format!("unknown note type '{}'", row.note_type),
    })?;

    let soap = match kind {
        NoteKind::Soap => Some(SoapSections {
            subjective: row.subjective.unwrap_or_default(),
            objective: row.objective.unwrap_or_default(),
            assessment: row.assessment.unwrap_or_default(),
            plan: row.plan.unwrap_or_default(),
        }),
        NoteKind::Normal => None,
    };

    let shared_at = row
        .shared_at
        .map(|ms| from_millis(&row.id, ms))
        .transpose()?;

    let mut stmt = conn.prepare(
        "SELECT tag FROM note_tags WHERE owner_id = ?1 AND note_id = ?2 ORDER BY position",
    )?;
    let tags = stmt
        .query_map(params![row.owner_id, row.id], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let mut stmt = conn.prepare(
        "SELECT data_url FROM note_images WHERE owner_id = ?1 AND note_id = ?2 ORDER BY position",
    )?;
    let images = stmt
        .query_map(params![row.owner_id, row.id], |r| r.get::<_, String>(0))?
        .map(|r| r.map(ImageAttachment::from_data_url))
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let provenance = row.copied_from.map(|copied_from| Provenance {
        copied_from,
        original_share_token: row.original_share_token.map(ShareToken::new),
    });

    Ok(Note {
        created_at: from_millis(&row.id, row.created_at)?,
        updated_at: from_millis(&row.id, row.updated_at)?,
        id: NoteId::new(row.id),
        owner: UserId::new(row.owner_id),
        content: NoteContent {
            title: row.title,
            body: row.body,
            kind,
            soap,
            images,
            tags,
            date: row.display_date,
            sharing: Sharing::from_stored(row.shared, row.share_token, shared_at),
            provenance,
        },
    })
}

fn hydrate_shift(row: ShiftRow) -> StoreResult<Shift> {
    let invalid = |details: String| StoreError::InvalidRecord {
        id: row.id.clone(),
        details,
    };
    let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
        .map_err(|e| invalid(format!("bad date '{}': {}", row.date, e)))?;
    let start_time = NaiveTime::parse_from_str(&row.start_time, TIME_FORMAT)
        .map_err(|e| invalid(format!("bad start time '{}': {}", row.start_time, e)))?;
    let end_time = NaiveTime::parse_from_str(&row.end_time, TIME_FORMAT)
        .map_err(|e| invalid(format!("bad end time '{}': {}", row.end_time, e)))?;
    let kind = ShiftType::parse(&row.shift_type)
        .ok_or_else(|| invalid(format!("unknown shift type '{}'", row.shift_type)))?;

    Ok(Shift {
        created_at: from_millis(&row.id, row.created_at)?,
        updated_at: from_millis(&row.id, row.updated_at)?,
        id: ShiftId::new(row.id),
        user_id: UserId::new(row.owner_id),
        draft: ShiftDraft {
            date,
            start_time,
            end_time,
            location: row.location,
            notes: row.notes,
            kind,
        },
    })
}

fn select_note(conn: &Connection, owner: &UserId, id: &NoteId) -> StoreResult<Option<Note>> {
    let sql = format!(
        "SELECT {} FROM notes WHERE owner_id = ?1 AND id = ?2",
        NOTE_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![owner.as_str(), id.as_str()], NoteRow::from_row)
        .optional()?;
    row.map(|r| hydrate_note(conn, r)).transpose()
}

fn select_shift(conn: &Connection, owner: &UserId, id: &ShiftId) -> StoreResult<Option<Shift>> {
    let sql = format!(
        "SELECT {} FROM schedules WHERE owner_id = ?1 AND id = ?2",
        SHIFT_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![owner.as_str(), id.as_str()], ShiftRow::from_row)
        .optional()?;
    row.map(hydrate_shift).transpose()
}

/// Make sure a partition row exists before writing into it
fn touch_partition(tx: &Transaction<'_>, owner: &UserId) -> StoreResult<()> {
    tx.execute(
        "INSERT OR IGNORE INTO users (id, display_name, created_at) VALUES (?1, ?1, ?2)",
        params![owner.as_str(), millis(Utc::now())],
    )?;
    Ok(())
}

/// Write tags and images for a note, replacing any existing rows
fn write_children(
    tx: &Transaction<'_>,
    owner: &UserId,
    id: &NoteId,
    content: &NoteContent,
) -> StoreResult<()> {
    tx.execute(
        "DELETE FROM note_tags WHERE owner_id = ?1 AND note_id = ?2",
        params![owner.as_str(), id.as_str()],
    )?;
    tx.execute(
        "DELETE FROM note_images WHERE owner_id = ?1 AND note_id = ?2",
        params![owner.as_str(), id.as_str()],
    )?;

    for (position, tag) in content.tags.iter().enumerate() {
        tx.execute(
            "INSERT INTO note_tags (owner_id, note_id, position, tag) VALUES (?1, ?2, ?3, ?4)",
            params![owner.as_str(), id.as_str(), position as i64, tag],
        )?;
    }
    for (position, image) in content.images.iter().enumerate() {
        tx.execute(
            "INSERT INTO note_images (owner_id, note_id, position, data_url) VALUES (?1, ?2, ?3, ?4)",
            params![owner.as_str(), id.as_str(), position as i64, image.data_url()],
        )?;
    }
    Ok(())
}

fn soap_field<'a>(
    content: &'a NoteContent,
    pick: fn(&SoapSections) -> &String,
) -> Option<&'a str> {
    match (content.kind, content.soap.as_ref()) {
        (NoteKind::Soap, Some(soap)) => Some(pick(soap).as_str()),
        (NoteKind::Soap, None) => Some(""),
        (NoteKind::Normal, _) => None,
    }
}

fn missing_note(id: &NoteId) -> StoreError {
    StoreError::MissingDocument {
        collection: "notes",
        id: id.to_string(),
    }
}

fn missing_shift(id: &ShiftId) -> StoreError {
    StoreError::MissingDocument {
        collection: "schedules",
        id: id.to_string(),
    }
}

impl DocumentStore for SqliteStore {
    async fn ensure_partition(&self, user: &User) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, display_name, email, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, email = excluded.email",
            params![
                user.id.as_str(),
                user.display_name,
                user.email,
                millis(Utc::now())
            ],
        )?;
        Ok(())
    }

    async fn partitions(&self) -> StoreResult<Vec<UserId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM users ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(UserId::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    async fn list_notes(&self, owner: &UserId) -> StoreResult<Vec<Note>> {
        self.query_notes(owner, &NoteQuery::default()).await
    }

    async fn get_note(&self, owner: &UserId, id: &NoteId) -> StoreResult<Option<Note>> {
        let conn = self.conn()?;
        select_note(&conn, owner, id)
    }

    async fn query_notes(&self, owner: &UserId, query: &NoteQuery) -> StoreResult<Vec<Note>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM notes
             WHERE owner_id = ?1
               AND (?2 IS NULL OR share_token = ?2)
               AND (?3 IS NULL OR shared = ?3)
               AND (?4 IS NULL OR note_type = ?4)
             ORDER BY created_at DESC, rowid DESC",
            NOTE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    owner.as_str(),
                    query.share_token,
                    query.shared,
                    query.kind.map(|k| k.as_str())
                ],
                NoteRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut notes = Vec::new();
        for row in rows {
            let note = hydrate_note(&conn, row)?;
            // Rows with a flag but no usable token decode as private
            if query.matches(&note) {
                notes.push(note);
            }
            if query.limit.is_some_and(|limit| notes.len() >= limit) {
                break;
            }
        }
        Ok(notes)
    }

    async fn create_note(&self, owner: &UserId, content: &NoteContent) -> StoreResult<Note> {
        let mut conn = self.conn()?;
        let id = NoteId::generate();
        let now = millis(Utc::now());
        let tx = conn.transaction()?;
        touch_partition(&tx, owner)?;

        let provenance = content.provenance.as_ref();
        tx.execute(
            &format!(
                "INSERT INTO notes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
                NOTE_COLUMNS
            ),
            params![
                owner.as_str(),
                id.as_str(),
                content.title,
                content.body,
                content.kind.as_str(),
                soap_field(content, |s| &s.subjective),
                soap_field(content, |s| &s.objective),
                soap_field(content, |s| &s.assessment),
                soap_field(content, |s| &s.plan),
                content.date,
                content.sharing.is_shared(),
                content.sharing.token().map(|t| t.as_str()),
                content.sharing.shared_at().map(millis),
                provenance.map(|p| p.copied_from.as_str()),
                provenance
                    .and_then(|p| p.original_share_token.as_ref())
                    .map(|t| t.as_str()),
                now,
            ],
        )?;
        write_children(&tx, owner, &id, content)?;

        let note = select_note(&tx, owner, &id)?.ok_or_else(|| missing_note(&id))?;
        tx.commit()?;
        Ok(note)
    }

    async fn update_note(
        &self,
        owner: &UserId,
        id: &NoteId,
        content: &NoteContent,
    ) -> StoreResult<Note> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let provenance = content.provenance.as_ref();
        let changed = tx.execute(
            "UPDATE notes SET title = ?3, body = ?4, note_type = ?5, subjective = ?6,
                 objective = ?7, assessment = ?8, plan = ?9, display_date = ?10,
                 shared = ?11, share_token = ?12, shared_at = ?13, copied_from = ?14,
                 original_share_token = ?15, updated_at = ?16
             WHERE owner_id = ?1 AND id = ?2",
            params![
                owner.as_str(),
                id.as_str(),
                content.title,
                content.body,
                content.kind.as_str(),
                soap_field(content, |s| &s.subjective),
                soap_field(content, |s| &s.objective),
                soap_field(content, |s| &s.assessment),
                soap_field(content, |s| &s.plan),
                content.date,
                content.sharing.is_shared(),
                content.sharing.token().map(|t| t.as_str()),
                content.sharing.shared_at().map(millis),
                provenance.map(|p| p.copied_from.as_str()),
                provenance
                    .and_then(|p| p.original_share_token.as_ref())
                    .map(|t| t.as_str()),
                millis(Utc::now()),
            ],
        )?;
        if changed == 0 {
            return Err(missing_note(id));
        }
        write_children(&tx, owner, id, content)?;

        let note = select_note(&tx, owner, id)?.ok_or_else(|| missing_note(id))?;
        tx.commit()?;
        Ok(note)
    }

    async fn set_sharing(
        &self,
        owner: &UserId,
        id: &NoteId,
        sharing: &Sharing,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notes SET shared = ?3, share_token = ?4, shared_at = ?5, updated_at = ?6
             WHERE owner_id = ?1 AND id = ?2",
            params![
                owner.as_str(),
                id.as_str(),
                sharing.is_shared(),
                sharing.token().map(|t| t.as_str()),
                sharing.shared_at().map(millis),
                millis(Utc::now()),
            ],
        )?;
        if changed == 0 {
            return Err(missing_note(id));
        }
        Ok(())
    }

    async fn delete_note(&self, owner: &UserId, id: &NoteId) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM notes WHERE owner_id = ?1 AND id = ?2",
            params![owner.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    async fn list_shifts(&self, owner: &UserId) -> StoreResult<Vec<Shift>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM schedules WHERE owner_id = ?1 ORDER BY date, start_time",
            SHIFT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![owner.as_str()], ShiftRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(hydrate_shift).collect()
    }

    async fn create_shift(&self, owner: &UserId, draft: &ShiftDraft) -> StoreResult<Shift> {
        let mut conn = self.conn()?;
        let id = ShiftId::generate();
        let now = millis(Utc::now());
        let tx = conn.transaction()?;
        touch_partition(&tx, owner)?;

        tx.execute(
            &format!(
                "INSERT INTO schedules ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                SHIFT_COLUMNS
            ),
            params![
                owner.as_str(),
                id.as_str(),
                draft.date.format("%Y-%m-%d").to_string(),
                draft.start_time.format(TIME_FORMAT).to_string(),
                draft.end_time.format(TIME_FORMAT).to_string(),
                draft.location,
                draft.notes,
                draft.kind.as_str(),
                now,
            ],
        )?;

        let shift = select_shift(&tx, owner, &id)?.ok_or_else(|| missing_shift(&id))?;
        tx.commit()?;
        Ok(shift)
    }

    async fn update_shift(
        &self,
        owner: &UserId,
        id: &ShiftId,
        draft: &ShiftDraft,
    ) -> StoreResult<Shift> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE schedules SET date = ?3, start_time = ?4, end_time = ?5, location = ?6,
                 notes = ?7, shift_type = ?8, updated_at = ?9
             WHERE owner_id = ?1 AND id = ?2",
            params![
                owner.as_str(),
                id.as_str(),
                draft.date.format("%Y-%m-%d").to_string(),
                draft.start_time.format(TIME_FORMAT).to_string(),
                draft.end_time.format(TIME_FORMAT).to_string(),
                draft.location,
                draft.notes,
                draft.kind.as_str(),
                millis(Utc::now()),
            ],
        )?;
        if changed == 0 {
            return Err(missing_shift(id));
        }
        select_shift(&conn, owner, id)?.ok_or_else(|| missing_shift(id))
    }

    async fn delete_shift(&self, owner: &UserId, id: &ShiftId) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM schedules WHERE owner_id = ?1 AND id = ?2",
            params![owner.as_str(), id.as_str()],
        )?;
        Ok(())
    }
}
