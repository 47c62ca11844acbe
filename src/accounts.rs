// 👤 Account Store - user credentials + aggregator access handles
// Used upstream of detection to authorize a caller; the engine never sees it.

use anyhow::{Context, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub friendly_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Opaque aggregator credential; None until the user links a bank
    pub access_handle: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user does not exist")]
    UnknownUser,

    #[error("incorrect password provided")]
    IncorrectPassword,

    #[error("username is already taken")]
    UsernameTaken,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

// ============================================================================
// STORE TRAIT
// ============================================================================

pub trait AccountStore {
    fn has_user(&self, username: &str) -> Result<bool>;

    fn get_user(&self, username: &str) -> Result<Option<UserRecord>>;

    fn create_user(&self, user: &UserRecord) -> Result<()>;

    fn set_access_handle(&self, username: &str, access_handle: &str) -> Result<()>;
}

// ============================================================================
// PASSWORD HASHING
// ============================================================================

/// Argon2id with a random salt, stored as a PHC string (`$argon2id$v=19$...`)
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// False for a wrong password or a stored value that is not a PHC string
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Look up a user and check their password
pub fn authenticate<S: AccountStore + ?Sized>(
    store: &S,
    username: &str,
    password: &str,
) -> Result<UserRecord, AuthError> {
    let user = store.get_user(username)?.ok_or(AuthError::UnknownUser)?;

    if !verify_password(password, &user.password_hash) {
        return Err(AuthError::IncorrectPassword);
    }

    Ok(user)
}

/// Create a user with a freshly hashed password
pub fn register_user<S: AccountStore + ?Sized>(
    store: &S,
    username: &str,
    password: &str,
    friendly_name: &str,
) -> Result<UserRecord, AuthError> {
    if store.has_user(username)? {
        return Err(AuthError::UsernameTaken);
    }

    let user = UserRecord {
        username: username.to_string(),
        friendly_name: friendly_name.to_string(),
        password_hash: hash_password(password)?,
        access_handle: None,
    };
    store.create_user(&user)?;

    Ok(user)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteAccountStore {
    conn: Connection,
}

impl SqliteAccountStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(Self { conn })
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            friendly_name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            access_handle TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    Ok(())
}

impl AccountStore for SqliteAccountStore {
    fn has_user(&self, username: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn get_user(&self, username: &str) -> Result<Option<UserRecord>> {
        let user = self
            .conn
            .query_row(
                "SELECT username, friendly_name, password_hash, access_handle
                 FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRecord {
                        username: row.get(0)?,
                        friendly_name: row.get(1)?,
                        password_hash: row.get(2)?,
                        access_handle: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user")?;
        Ok(user)
    }

    fn create_user(&self, user: &UserRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (username, friendly_name, password_hash, access_handle)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user.username, user.friendly_name, user.password_hash, user.access_handle],
            )
            .with_context(|| format!("Failed to insert user {}", user.username))?;
        Ok(())
    }

    fn set_access_handle(&self, username: &str, access_handle: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE users SET access_handle = ?1 WHERE username = ?2",
            params![access_handle, username],
        )?;
        anyhow::ensure!(updated == 1, "No user named {}", username);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("hunter2").unwrap();

        assert!(stored.starts_with("$argon2id$"));
        assert!(!stored.contains("hunter2"));
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
        assert!(!verify_password("hunter2", "garbage"));
        assert!(!verify_password("hunter2", "sha256$salt$abc"));
    }

    #[test]
    fn test_same_password_different_salt() {
        let first = hash_password("pw").unwrap();
        let second = hash_password("pw").unwrap();

        assert_ne!(first, second);
        assert!(verify_password("pw", &first));
        assert!(verify_password("pw", &second));
    }

    #[test]
    fn test_register_and_authenticate() {
        let store = SqliteAccountStore::open_in_memory().unwrap();
        register_user(&store, "ana", "pw", "Ana").unwrap();

        assert!(store.has_user("ana").unwrap());
        let user = authenticate(&store, "ana", "pw").unwrap();
        assert_eq!(user.friendly_name, "Ana");
        assert_eq!(user.access_handle, None);
    }

    #[test]
    fn test_authenticate_failures() {
        let store = SqliteAccountStore::open_in_memory().unwrap();
        register_user(&store, "ana", "pw", "Ana").unwrap();

        assert!(matches!(authenticate(&store, "bob", "pw"), Err(AuthError::UnknownUser)));
        assert!(matches!(authenticate(&store, "ana", "nope"), Err(AuthError::IncorrectPassword)));
    }

    #[test]
    fn test_duplicate_username() {
        let store = SqliteAccountStore::open_in_memory().unwrap();
        register_user(&store, "ana", "pw", "Ana").unwrap();

        assert!(matches!(
            register_user(&store, "ana", "other", "Ana 2"),
            Err(AuthError::UsernameTaken)
        ));
    }

    #[test]
    fn test_set_access_handle() {
        let store = SqliteAccountStore::open_in_memory().unwrap();
        register_user(&store, "ana", "pw", "Ana").unwrap();

        store.set_access_handle("ana", "https://u:p@bridge.example/simplefin").unwrap();
        let user = store.get_user("ana").unwrap().unwrap();
        assert_eq!(user.access_handle.as_deref(), Some("https://u:p@bridge.example/simplefin"));

        assert!(store.set_access_handle("nobody", "x").is_err());
        assert!(store.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = UserRecord {
            username: "ana".to_string(),
            friendly_name: "Ana".to_string(),
            password_hash: hash_password("pw").unwrap(),
            access_handle: None,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());
    }

    #[test]
    fn test_store_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.db");

        {
            let store = SqliteAccountStore::open(&path).unwrap();
            register_user(&store, "ana", "pw", "Ana").unwrap();
        }

        let store = SqliteAccountStore::open(&path).unwrap();
        assert!(authenticate(&store, "ana", "pw").is_ok());
    }
}
