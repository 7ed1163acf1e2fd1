//! `SQLite`-backed profile storage.

use crate::profile::{Profile, Turn};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

/// `SQLite` profile store.
///
/// Holds profile rows including the retained transcript (JSON column) and
/// the condensed history text.
pub struct ProfileStore {
    conn: Mutex<Connection>,
}

impl ProfileStore {
    /// Create a new profile store at the given database path.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and the console channel.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                id                        TEXT PRIMARY KEY,
                user_id                   TEXT NOT NULL,
                name                      TEXT NOT NULL,
                system_prompt             TEXT NOT NULL DEFAULT '',
                model                     TEXT NOT NULL,
                assistant_id              TEXT,
                thread_id                 TEXT,
                structured_output         INTEGER NOT NULL DEFAULT 0,
                idle_timeout_ms           INTEGER NOT NULL,
                retention                 INTEGER NOT NULL DEFAULT 0,
                retention_size            INTEGER NOT NULL DEFAULT 0,
                retention_data            TEXT NOT NULL DEFAULT '[]',
                condensed_retention_data  TEXT NOT NULL DEFAULT '',
                selected                  INTEGER NOT NULL DEFAULT 0,
                updated_at                INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_profiles_user ON profiles(user_id);
            CREATE INDEX IF NOT EXISTS idx_profiles_selected ON profiles(user_id, selected);",
        )?;
        Ok(())
    }

    fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
        let retention_json: String = row.get("retention_data")?;
        let retention_data: Vec<Turn> = serde_json::from_str(&retention_json).unwrap_or_default();

        Ok(Profile {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            system_prompt: row.get("system_prompt")?,
            model: row.get("model")?,
            assistant_id: row.get("assistant_id")?,
            thread_id: row.get("thread_id")?,
            structured_output: row.get::<_, i64>("structured_output")? != 0,
            idle_timeout_ms: row.get::<_, i64>("idle_timeout_ms")? as u64,
            retention: row.get::<_, i64>("retention")? != 0,
            retention_size: row.get::<_, i64>("retention_size")? as usize,
            retention_data,
            condensed_retention_data: row.get("condensed_retention_data")?,
            selected: row.get::<_, i64>("selected")? != 0,
        })
    }

    /// Get the user's currently selected profile, if any.
    pub fn get_selected_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM profiles WHERE user_id = ?1 AND selected = 1 LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![user_id], Self::row_to_profile)?;
        Ok(rows.next().transpose()?)
    }

    /// Get a profile by id.
    pub fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM profiles WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], Self::row_to_profile)?;
        Ok(rows.next().transpose()?)
    }

    /// List all profiles belonging to a user, ordered by name.
    pub fn list_profiles(&self, user_id: &str) -> Result<Vec<Profile>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT * FROM profiles WHERE user_id = ?1 ORDER BY name ASC")?;
        let rows = stmt.query_map(params![user_id], Self::row_to_profile)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }

    /// Insert a new profile.
    ///
    /// When the profile is marked selected, siblings are deselected in the
    /// same transaction so the single-selection invariant holds.
    pub fn insert_profile(&self, profile: &Profile) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if profile.selected {
            tx.execute(
                "UPDATE profiles SET selected = 0 WHERE user_id = ?1",
                params![profile.user_id],
            )?;
        }

        let retention_json = serde_json::to_string(&profile.retention_data)?;
        tx.execute(
            "INSERT INTO profiles (
                id, user_id, name, system_prompt, model, assistant_id, thread_id,
                structured_output, idle_timeout_ms, retention, retention_size,
                retention_data, condensed_retention_data, selected, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                profile.id,
                profile.user_id,
                profile.name,
                profile.system_prompt,
                profile.model,
                profile.assistant_id,
                profile.thread_id,
                profile.structured_output as i64,
                profile.idle_timeout_ms as i64,
                profile.retention as i64,
                profile.retention_size as i64,
                retention_json,
                profile.condensed_retention_data,
                profile.selected as i64,
                Utc::now().timestamp(),
            ],
        )?;

        tx.commit()?;
        tracing::debug!(profile_id = %profile.id, user_id = %profile.user_id, selected = profile.selected, "Profile inserted");
        Ok(())
    }

    /// Update an existing profile in place.
    pub fn update_profile(&self, profile: &Profile) -> Result<()> {
        let conn = self.lock()?;
        let retention_json = serde_json::to_string(&profile.retention_data)?;
        let affected = conn.execute(
            "UPDATE profiles SET
                name = ?2, system_prompt = ?3, model = ?4, assistant_id = ?5,
                thread_id = ?6, structured_output = ?7, idle_timeout_ms = ?8,
                retention = ?9, retention_size = ?10, retention_data = ?11,
                condensed_retention_data = ?12, updated_at = ?13
             WHERE id = ?1",
            params![
                profile.id,
                profile.name,
                profile.system_prompt,
                profile.model,
                profile.assistant_id,
                profile.thread_id,
                profile.structured_output as i64,
                profile.idle_timeout_ms as i64,
                profile.retention as i64,
                profile.retention_size as i64,
                retention_json,
                profile.condensed_retention_data,
                Utc::now().timestamp(),
            ],
        )?;

        if affected == 0 {
            anyhow::bail!("profile not found: {}", profile.id);
        }
        tracing::debug!(profile_id = %profile.id, "Profile updated");
        Ok(())
    }

    /// Delete a profile by id.
    pub fn delete_profile(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;
        if affected > 0 {
            tracing::debug!(profile_id = %id, "Profile deleted");
        }
        Ok(affected > 0)
    }

    /// Mark one profile selected and deselect all of the user's others.
    ///
    /// The flip is a single transaction: the invariant that at most one
    /// profile per user is selected holds at every commit point.
    pub fn select_profile(&self, user_id: &str, id: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE profiles SET selected = 0 WHERE user_id = ?1",
            params![user_id],
        )?;
        let affected = tx.execute(
            "UPDATE profiles SET selected = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if affected == 0 {
            anyhow::bail!("profile not found for user {user_id}: {id}");
        }

        tx.commit()?;
        tracing::debug!(profile_id = %id, user_id = %user_id, "Profile selected");
        Ok(())
    }

    /// Store the raw retained transcript for a profile.
    pub fn save_retention(&self, id: &str, turns: &[Turn]) -> Result<()> {
        let conn = self.lock()?;
        let retention_json = serde_json::to_string(turns)?;
        conn.execute(
            "UPDATE profiles SET retention_data = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, retention_json, Utc::now().timestamp()],
        )?;
        tracing::debug!(profile_id = %id, turns = turns.len(), "Retention turns saved");
        Ok(())
    }

    /// Store the condensed history text for a profile.
    pub fn save_condensed(&self, id: &str, summary: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE profiles SET condensed_retention_data = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, summary, Utc::now().timestamp()],
        )?;
        tracing::debug!(profile_id = %id, chars = summary.len(), "Condensed retention saved");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("lock error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Role;
    use tempfile::TempDir;

    fn make_profile(id: &str, user_id: &str, selected: bool) -> Profile {
        Profile {
            id: id.into(),
            user_id: user_id.into(),
            name: format!("Profile {id}"),
            system_prompt: "You are helpful.".into(),
            model: "gpt-4o".into(),
            assistant_id: None,
            thread_id: None,
            structured_output: false,
            idle_timeout_ms: 60_000,
            retention: true,
            retention_size: 5,
            retention_data: vec![],
            condensed_retention_data: String::new(),
            selected,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = ProfileStore::in_memory().unwrap();
        store.insert_profile(&make_profile("p1", "u1", true)).unwrap();

        let profile = store.get_profile("p1").unwrap().unwrap();
        assert_eq!(profile.user_id, "u1");
        assert_eq!(profile.model, "gpt-4o");
        assert!(profile.selected);

        assert!(store.get_profile("missing").unwrap().is_none());
    }

    #[test]
    fn test_selection_is_mutually_exclusive() {
        let store = ProfileStore::in_memory().unwrap();
        store.insert_profile(&make_profile("p1", "u1", true)).unwrap();
        store.insert_profile(&make_profile("p2", "u1", false)).unwrap();

        store.select_profile("u1", "p2").unwrap();

        assert!(!store.get_profile("p1").unwrap().unwrap().selected);
        assert!(store.get_profile("p2").unwrap().unwrap().selected);

        let selected = store.get_selected_profile("u1").unwrap().unwrap();
        assert_eq!(selected.id, "p2");
    }

    #[test]
    fn test_insert_selected_deselects_siblings() {
        let store = ProfileStore::in_memory().unwrap();
        store.insert_profile(&make_profile("p1", "u1", true)).unwrap();
        store.insert_profile(&make_profile("p2", "u1", true)).unwrap();

        let profiles = store.list_profiles("u1").unwrap();
        let selected: Vec<_> = profiles.iter().filter(|p| p.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "p2");
    }

    #[test]
    fn test_selection_is_per_user() {
        let store = ProfileStore::in_memory().unwrap();
        store.insert_profile(&make_profile("p1", "u1", true)).unwrap();
        store.insert_profile(&make_profile("p2", "u2", true)).unwrap();

        assert!(store.get_profile("p1").unwrap().unwrap().selected);
        assert!(store.get_profile("p2").unwrap().unwrap().selected);
    }

    #[test]
    fn test_select_missing_profile_fails() {
        let store = ProfileStore::in_memory().unwrap();
        store.insert_profile(&make_profile("p1", "u1", true)).unwrap();

        assert!(store.select_profile("u1", "nope").is_err());
        // The transaction rolled back: the prior selection survives
        let selected = store.get_selected_profile("u1").unwrap().unwrap();
        assert_eq!(selected.id, "p1");
    }

    #[test]
    fn test_retention_roundtrip() {
        let store = ProfileStore::in_memory().unwrap();
        store.insert_profile(&make_profile("p1", "u1", true)).unwrap();

        let turns = vec![
            Turn::new(Role::User, "hello"),
            Turn::new(Role::Assistant, "hi there"),
        ];
        store.save_retention("p1", &turns).unwrap();

        let profile = store.get_profile("p1").unwrap().unwrap();
        assert_eq!(profile.retention_data, turns);
    }

    #[test]
    fn test_save_condensed() {
        let store = ProfileStore::in_memory().unwrap();
        store.insert_profile(&make_profile("p1", "u1", true)).unwrap();

        store.save_condensed("p1", "the user likes rust").unwrap();

        let profile = store.get_profile("p1").unwrap().unwrap();
        assert_eq!(profile.condensed_retention_data, "the user likes rust");
    }

    #[test]
    fn test_delete_profile() {
        let store = ProfileStore::in_memory().unwrap();
        store.insert_profile(&make_profile("p1", "u1", true)).unwrap();

        assert!(store.delete_profile("p1").unwrap());
        assert!(!store.delete_profile("p1").unwrap());
        assert!(store.get_profile("p1").unwrap().is_none());
    }

    #[test]
    fn test_update_profile() {
        let store = ProfileStore::in_memory().unwrap();
        store.insert_profile(&make_profile("p1", "u1", true)).unwrap();

        let mut profile = store.get_profile("p1").unwrap().unwrap();
        profile.model = "gpt-4o-mini".into();
        profile.retention_size = 20;
        store.update_profile(&profile).unwrap();

        let reloaded = store.get_profile("p1").unwrap().unwrap();
        assert_eq!(reloaded.model, "gpt-4o-mini");
        assert_eq!(reloaded.retention_size, 20);
    }

    #[test]
    fn test_update_missing_profile_fails() {
        let store = ProfileStore::in_memory().unwrap();
        let profile = make_profile("ghost", "u1", false);
        assert!(store.update_profile(&profile).is_err());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("profiles.db");

        {
            let store = ProfileStore::new(&db_path).unwrap();
            store.insert_profile(&make_profile("p1", "u1", true)).unwrap();
        }
        {
            let store = ProfileStore::new(&db_path).unwrap();
            let profile = store.get_selected_profile("u1").unwrap().unwrap();
            assert_eq!(profile.id, "p1");
        }
    }
}
