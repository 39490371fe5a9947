use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEntry {
    pub otp: String,
    /// Epoch seconds after which the code no longer authenticates.
    pub expire: i64,
    #[serde(default)]
    pub used: bool,
}

/// One-time login codes persisted as a small JSON map keyed by user id.
#[derive(Clone)]
pub struct CodeStore {
    path: PathBuf,
}

impl CodeStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Lenient load: a missing or corrupt store reads as empty.
    pub fn load(&self) -> HashMap<String, CodeEntry> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).unwrap_or_default(),
            _ => HashMap::new(),
        }
    }

    fn save(&self, store: &HashMap<String, CodeEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename keeps the store file whole even if we crash
        // mid-save.
        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, store)?;
        file.flush()?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Single-use code check: a successful match marks the entry used and
    /// persists before the user id is returned.
    pub fn authenticate(&self, code: &str, now: DateTime<Utc>) -> Option<String> {
        let code = code.trim();
        if code.is_empty() {
            return None;
        }
        let mut store = self.load();
        let user = store.iter().find_map(|(user, entry)| {
            (!entry.used && entry.otp == code && now.timestamp() < entry.expire)
                .then(|| user.clone())
        })?;
        if let Some(entry) = store.get_mut(&user) {
            entry.used = true;
        }
        if self.save(&store).is_err() {
            return None;
        }
        Some(user)
    }

    /// Mints a fresh 6-digit code for `user`, replacing any earlier one.
    pub fn issue(&self, user: &str, ttl: Duration, now: DateTime<Utc>) -> Result<String> {
        let mut store = self.load();
        let otp = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        store.insert(
            user.to_string(),
            CodeEntry {
                otp: otp.clone(),
                expire: now.timestamp() + ttl.as_secs() as i64,
                used: false,
            },
        );
        self.save(&store)?;
        Ok(otp)
    }
}

/// Gate for the ingest and heartbeat endpoints.
pub fn require_api_key(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false)
}

/// Session cookie value: `<user>.<hex sha256(secret || user)>`.
pub fn sign_session(secret: &str, user: &str) -> String {
    format!("{}.{}", user, session_mac(secret, user))
}

pub fn verify_session(secret: &str, cookie: &str) -> Option<String> {
    let (user, mac) = cookie.rsplit_once('.')?;
    (mac == session_mac(secret, user)).then(|| user.to_string())
}

fn session_mac(secret: &str, user: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b".");
    hasher.update(user.as_bytes());
    hex::encode(hasher.finalize())
}
