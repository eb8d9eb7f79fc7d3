//! In-memory document store
//!
//! Behaves like the hosted document database for tests and demos, and can
//! inject the failures the sharing flow has to survive: an unreachable
//! store, rejected writes, a single failing partition, a partition scan
//! that never settles, and a write held open until released.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::Notify;

use super::{DocumentStore, NoteQuery, StoreError, StoreResult};
use crate::models::{Note, NoteContent, NoteId, Sharing, User, UserId};
use crate::shifts::{Shift, ShiftDraft, ShiftId};

#[derive(Debug, Default)]
struct Partition {
    user: Option<User>,
    notes: Vec<Note>,
    shifts: Vec<Shift>,
}

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    reject_writes: bool,
    failing_partitions: HashSet<UserId>,
    stall_scan: bool,
}

/// Handle on a write that is being held open
#[derive(Debug, Clone)]
pub struct WriteGate {
    notify: Arc<Notify>,
}

impl WriteGate {
    /// Let the held write proceed
    pub fn release(&self) {
        self.notify.notify_one();
    }
}

/// In-memory partitioned store
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: Mutex<BTreeMap<UserId, Partition>>,
    faults: Mutex<Faults>,
    next_write_gate: Mutex<Option<Arc<Notify>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a note exactly as given, bypassing id/timestamp assignment
    pub fn seed_note(&self, note: Note) -> StoreResult<()> {
        let mut partitions = self.lock_partitions()?;
        partitions
            .entry(note.owner.clone())
            .or_default()
            .notes
            .push(note);
        Ok(())
    }

    /// Number of writes that reached the store
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of notes currently stored for `owner`
    pub fn note_count(&self, owner: &UserId) -> usize {
        self.lock_partitions()
            .map(|p| p.get(owner).map_or(0, |part| part.notes.len()))
            .unwrap_or(0)
    }

    /// Make every operation fail as unreachable
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.offline = offline;
        }
    }

    /// Make every write fail as rejected
    pub fn reject_writes(&self, reject: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.reject_writes = reject;
        }
    }

    /// Make reads of one partition fail
    pub fn fail_partition(&self, owner: &UserId) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_partitions.insert(owner.clone());
        }
    }

    /// Make `partitions()` never complete
    pub fn stall_partition_scan(&self, stall: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.stall_scan = stall;
        }
    }

    /// Hold the next write open until the returned gate is released
    pub fn hold_next_write(&self) -> WriteGate {
        let notify = Arc::new(Notify::new());
        if let Ok(mut gate) = self.next_write_gate.lock() {
            *gate = Some(notify.clone());
        }
        WriteGate { notify }
    }

    fn lock_partitions(&self) -> StoreResult<MutexGuard<'_, BTreeMap<UserId, Partition>>> {
        self.partitions
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn check_read(&self, owner: Option<&UserId>) -> StoreResult<()> {
        let faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Unavailable("fault state poisoned".to_string()))?;
        if faults.offline {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        if let Some(owner) = owner {
            if faults.failing_partitions.contains(owner) {
                return Err(StoreError::Unavailable(format!(
                    "partition '{}' is unreadable",
                    owner
                )));
            }
        }
        Ok(())
    }

    /// Wait on a held gate, then check write faults and count the write
    async fn begin_write(&self) -> StoreResult<()> {
        let gate = self.next_write_gate.lock().ok().and_then(|mut g| g.take());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        {
            let faults = self
                .faults
                .lock()
                .map_err(|_| StoreError::Unavailable("fault state poisoned".to_string()))?;
            if faults.offline {
                return Err(StoreError::Unavailable("store is offline".to_string()));
            }
            if faults.reject_writes {
                return Err(StoreError::WriteRejected("writes are disabled".to_string()));
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn newest_first(notes: &[Note]) -> Vec<Note> {
    let mut sorted: Vec<Note> = notes.iter().rev().cloned().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted
}

impl DocumentStore for MemoryStore {
    async fn ensure_partition(&self, user: &User) -> StoreResult<()> {
        self.check_read(None)?;
        let mut partitions = self.lock_partitions()?;
        partitions.entry(user.id.clone()).or_default().user = Some(user.clone());
        Ok(())
    }

    async fn partitions(&self) -> StoreResult<Vec<UserId>> {
        let stall = self.faults.lock().map(|f| f.stall_scan).unwrap_or(false);
        if stall {
            std::future::pending::<()>().await;
        }
        self.check_read(None)?;
        Ok(self.lock_partitions()?.keys().cloned().collect())
    }

    async fn list_notes(&self, owner: &UserId) -> StoreResult<Vec<Note>> {
        self.check_read(Some(owner))?;
        let partitions = self.lock_partitions()?;
        Ok(partitions
            .get(owner)
            .map(|p| newest_first(&p.notes))
            .unwrap_or_default())
    }

    async fn get_note(&self, owner: &UserId, id: &NoteId) -> StoreResult<Option<Note>> {
        self.check_read(Some(owner))?;
        let partitions = self.lock_partitions()?;
        Ok(partitions
            .get(owner)
            .and_then(|p| p.notes.iter().find(|n| &n.id == id).cloned()))
    }

    async fn query_notes(&self, owner: &UserId, query: &NoteQuery) -> StoreResult<Vec<Note>> {
        let matching = self
            .list_notes(owner)
            .await?
            .into_iter()
            .filter(|n| query.matches(n));
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn create_note(&self, owner: &UserId, content: &NoteContent) -> StoreResult<Note> {
        self.begin_write().await?;
        let now = Utc::now();
        let note = Note {
            id: NoteId::generate(),
            owner: owner.clone(),
            content: content.clone(),
            created_at: now,
            updated_at: now,
        };
        let mut partitions = self.lock_partitions()?;
        partitions
            .entry(owner.clone())
            .or_default()
            .notes
            .push(note.clone());
        Ok(note)
    }

    async fn update_note(
        &self,
        owner: &UserId,
        id: &NoteId,
        content: &NoteContent,
    ) -> StoreResult<Note> {
        self.begin_write().await?;
        let mut partitions = self.lock_partitions()?;
        let note = partitions
            .get_mut(owner)
            .and_then(|p| p.notes.iter_mut().find(|n| &n.id == id))
            .ok_or_else(|| StoreError::MissingDocument {
                collection: "notes",
                id: id.to_string(),
            })?;
        note.content = content.clone();
        note.updated_at = Utc::now();
        Ok(note.clone())
    }

    async fn set_sharing(
        &self,
        owner: &UserId,
        id: &NoteId,
        sharing: &Sharing,
    ) -> StoreResult<()> {
        self.begin_write().await?;
        let mut partitions = self.lock_partitions()?;
        let note = partitions
            .get_mut(owner)
            .and_then(|p| p.notes.iter_mut().find(|n| &n.id == id))
            .ok_or_else(|| StoreError::MissingDocument {
                collection: "notes",
                id: id.to_string(),
            })?;
        note.content.sharing = sharing.clone();
        note.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_note(&self, owner: &UserId, id: &NoteId) -> StoreResult<()> {
        self.begin_write().await?;
        let mut partitions = self.lock_partitions()?;
        if let Some(p) = partitions.get_mut(owner) {
            p.notes.retain(|n| &n.id != id);
        }
        Ok(())
    }

    async fn list_shifts(&self, owner: &UserId) -> StoreResult<Vec<Shift>> {
        self.check_read(Some(owner))?;
        let partitions = self.lock_partitions()?;
        let mut shifts = partitions
            .get(owner)
            .map(|p| p.shifts.clone())
            .unwrap_or_default();
        shifts.sort_by_key(|s| (s.draft.date, s.draft.start_time));
        Ok(shifts)
    }

    async fn create_shift(&self, owner: &UserId, draft: &ShiftDraft) -> StoreResult<Shift> {
        self.begin_write().await?;
        let now = Utc::now();
        let shift = Shift {
            id: ShiftId::generate(),
            user_id: owner.clone(),
            draft: draft.clone(),
            created_at: now,
            updated_at: now,
        };
        let mut partitions = self.lock_partitions()?;
        partitions
            .entry(owner.clone())
            .or_default()
            .shifts
            .push(shift.clone());
        Ok(shift)
    }

    async fn update_shift(
        &self,
        owner: &UserId,
        id: &ShiftId,
        draft: &ShiftDraft,
    ) -> StoreResult<Shift> {
        self.begin_write().await?;
        let mut partitions = self.lock_partitions()?;
        let shift = partitions
            .get_mut(owner)
            .and_then(|p| p.shifts.iter_mut().find(|s| &s.id == id))
            .ok_or_else(|| StoreError::MissingDocument {
                collection: "schedules",
                id: id.to_string(),
            })?;
        shift.draft = draft.clone();
        shift.updated_at = Utc::now();
        Ok(shift.clone())
    }

    async fn delete_shift(&self, owner: &UserId, id: &ShiftId) -> StoreResult<()> {
        self.begin_write().await?;
        let mut partitions = self.lock_partitions()?;
        if let Some(p) = partitions.get_mut(owner) {
            p.shifts.retain(|s| &s.id != id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShareToken;

    fn alice() -> User {
        User::new("alice", "Alice")
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_timestamps() {
        let store = MemoryStore::new();
        let owner = alice().id;
        let note = store
            .create_note(&owner, &NoteContent::new("Rounds"))
            .await
            .unwrap();

        assert!(!note.id.as_str().is_empty());
        assert_eq!(note.created_at, note.updated_at);
        assert_eq!(note.owner, owner);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_list_notes_newest_first() {
        let store = MemoryStore::new();
        let owner = alice().id;
        store.create_note(&owner, &NoteContent::new("first")).await.unwrap();
        store.create_note(&owner, &NoteContent::new("second")).await.unwrap();

        let notes = store.list_notes(&owner).await.unwrap();
        assert_eq!(notes[0].content.title, "second");
        assert_eq!(notes[1].content.title, "first");
    }

    #[tokio::test]
    async fn test_ids_only_unique_per_partition() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for owner in ["alice", "bob"] {
            store
                .seed_note(Note {
                    id: NoteId::from("same"),
                    owner: UserId::from(owner),
                    content: NoteContent::new(owner),
                    created_at: now,
                    updated_at: now,
                })
                .unwrap();
        }

        let a = store
            .get_note(&UserId::from("alice"), &NoteId::from("same"))
            .await
            .unwrap()
            .unwrap();
        let b = store
            .get_note(&UserId::from("bob"), &NoteId::from("same"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.content.title, "alice");
        assert_eq!(b.content.title, "bob");
    }

    #[tokio::test]
    async fn test_query_respects_limit() {
        let store = MemoryStore::new();
        let owner = alice().id;
        let mut content = NoteContent::new("shared");
        content.sharing = Sharing::Shared {
            token: ShareToken::new("share_1_dup"),
            shared_at: Utc::now(),
        };
        store.create_note(&owner, &content).await.unwrap();
        store.create_note(&owner, &content).await.unwrap();

        let hits = store
            .query_notes(&owner, &NoteQuery::by_share_token("share_1_dup"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_note() {
        let store = MemoryStore::new();
        let err = store
            .update_note(&alice().id, &NoteId::from("nope"), &NoteContent::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingDocument { .. }));
    }

    #[tokio::test]
    async fn test_failing_partition_only_affects_reads_of_that_partition() {
        let store = MemoryStore::new();
        store.ensure_partition(&alice()).await.unwrap();
        store.ensure_partition(&User::new("bob", "Bob")).await.unwrap();
        store.fail_partition(&UserId::from("alice"));

        assert!(store.list_notes(&UserId::from("alice")).await.is_err());
        assert!(store.list_notes(&UserId::from("bob")).await.is_ok());
        assert_eq!(store.partitions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_offline_and_rejected_writes() {
        let store = MemoryStore::new();
        let owner = alice().id;

        store.reject_writes(true);
        let err = store
            .create_note(&owner, &NoteContent::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteRejected(_)));

        store.reject_writes(false);
        store.set_offline(true);
        assert!(matches!(
            store.partitions().await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_held_write_waits_for_release() {
        let store = MemoryStore::new();
        let owner = alice().id;
        let gate = store.hold_next_write();

        let content = NoteContent::new("held");
        let (created, ()) = tokio::join!(store.create_note(&owner, &content), async {
            tokio::task::yield_now().await;
            assert_eq!(store.note_count(&owner), 0);
            gate.release();
        });

        assert!(created.is_ok());
        assert_eq!(store.note_count(&owner), 1);
    }

    #[tokio::test]
    async fn test_shifts_sorted_by_date() {
        use crate::shifts::ShiftType;
        use chrono::NaiveDate;

        let store = MemoryStore::new();
        let owner = alice().id;
        let later = ShiftDraft::preset(
            NaiveDate::from_ymd_opt(2025, 4, 3).unwrap(),
            ShiftType::Night,
            "MICU",
        );
        let earlier = ShiftDraft::preset(
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            ShiftType::Morning,
            "ER",
        );
        store.create_shift(&owner, &later).await.unwrap();
        store.create_shift(&owner, &earlier).await.unwrap();

        let shifts = store.list_shifts(&owner).await.unwrap();
        assert_eq!(shifts[0].draft.location, "ER");
        assert_eq!(shifts[1].draft.location, "MICU");
    }
}
