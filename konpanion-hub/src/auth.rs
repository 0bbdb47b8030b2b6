/**
 * AUTH - Login local minimal par cookie de session
 *
 * RÔLE :
 * - UserDb : allow-list chargée depuis users.json (mots de passe hashés SHA-256
 *   au chargement), compte admin/admin toujours présent
 * - SessionStore : table en mémoire token opaque (UUID v4) → utilisateur
 * - Helpers cookie pour le transport WebSocket et les routes protégées
 *
 * Les consommateurs n'utilisent que `principal(token)` : « ce token
 * correspond-il à un utilisateur authentifié ? ». Sessions volatiles.
 */

use crate::error::HubError;
use axum::http::{header, HeaderMap};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

pub const COOKIE_NAME: &str = "konpanion_session";
const SESSION_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 7;
const DEFAULT_USER: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";

fn sha256_hex(s: &str) -> String {
    hex::encode(Sha256::digest(s.as_bytes()))
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    username: Option<String>,
    password: Option<String>,
}

/// username -> hash sha256 du mot de passe
#[derive(Debug, Clone)]
pub struct UserDb {
    users: HashMap<String, String>,
}

impl Default for UserDb {
    fn default() -> Self {
        let mut users = HashMap::new();
        users.insert(DEFAULT_USER.to_string(), sha256_hex(DEFAULT_PASSWORD));
        Self { users }
    }
}

impl UserDb {
    /// Charge `{"users": [{"username", "password"}]}` ; fichier absent = admin seul
    pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("[auth] no users file at {}, default account only", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_json(&content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let file: UsersFile = serde_json::from_str(content)?;
        let mut db = Self::default();
        for entry in file.users {
            // entrées incomplètes ignorées
            if let (Some(username), Some(password)) = (entry.username, entry.password) {
                db.users.insert(username, sha256_hex(&password));
            }
        }
        Ok(db)
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|hash| *hash == sha256_hex(password))
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ouvre une session, retourne le token à poser en cookie
    pub fn create(&mut self, username: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(token.clone(), username.to_string());
        token
    }

    /// Utilisateur authentifié derrière ce token, s'il existe
    pub fn principal(&self, token: Option<&str>) -> Option<String> {
        token.and_then(|t| self.sessions.get(t)).cloned()
    }

    pub fn revoke(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }
}

/// Extrait notre cookie de session du header `Cookie`
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == COOKIE_NAME)
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        COOKIE_NAME, token, SESSION_MAX_AGE_SECS
    )
}

pub fn clear_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", COOKIE_NAME)
}

/// Principal de la requête ou 401
pub fn require_principal(sessions: &crate::state::Shared<SessionStore>, headers: &HeaderMap) -> Result<String, HubError> {
    let token = session_token(headers);
    sessions
        .lock()
        .principal(token.as_deref())
        .ok_or(HubError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_default_admin_account() {
        let db = UserDb::default();
        assert!(db.verify("admin", "admin"));
        assert!(!db.verify("admin", "wrong"));
        assert!(!db.verify("ghost", "admin"));
    }

    #[test]
    fn test_users_file_adds_accounts() {
        let db = UserDb::from_json(
            r#"{"users": [{"username": "ajzal", "password": "qwerty"}, {"username": "incomplete"}]}"#,
        )
        .unwrap();
        assert!(db.verify("ajzal", "qwerty"));
        assert!(db.contains("admin"));
        assert!(!db.contains("incomplete"));
        assert_eq!(db.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_users_file_defaults() {
        let db = UserDb::load("/nonexistent/users.json").await.unwrap();
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut sessions = SessionStore::new();
        let token = sessions.create("admin");
        assert_eq!(sessions.principal(Some(&token)).as_deref(), Some("admin"));
        assert_eq!(sessions.principal(Some("forged")), None);
        assert_eq!(sessions.principal(None), None);

        assert!(sessions.revoke(&token));
        assert_eq!(sessions.principal(Some(&token)), None);
    }

    #[test]
    fn test_session_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; konpanion_session=abc123; other=1"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));

        let empty = HeaderMap::new();
        assert_eq!(session_token(&empty), None);
    }

    #[test]
    fn test_cookie_strings() {
        assert!(session_cookie("tok").starts_with("konpanion_session=tok;"));
        assert!(clear_cookie().contains("Max-Age=0"));
    }
}
