//! Cached combined verdicts, keyed by the caller's session cookie.
//!
//! Flow Overview:
//! - `/register` writes a record only after both authorities said yes.
//! - `/auth` trusts a record until it is older than the configured TTL.
//!
//! The stored value is version tagged JSON. Anything that does not decode
//! into the current schema is treated as "no session", which forces a full
//! re-verification instead of failing the request.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{debug, warn};

pub const SESSION_COOKIE_NAME: &str = "authgate_session";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("stored session is corrupt: {0}")]
    Corrupt(String),
    #[error("refusing to persist an incomplete session record")]
    Incomplete,
    #[error("session backend failure: {0}")]
    Backend(String),
    #[error("failed to generate session handle")]
    Entropy(#[from] rand::Error),
}

/// Opaque identifier of one caller's session, carried in a cookie.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Create a fresh, unguessable handle.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn generate() -> Result<Self, SessionError> {
        let mut bytes = [0u8; 32];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self(Base64UrlUnpadded::encode_string(&bytes)))
    }

    /// Read the handle from the `Cookie` header, if any.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| {
                let mut parts = pair.trim().splitn(2, '=');
                let key = parts.next()?.trim();
                let value = parts.next()?.trim();
                (key == SESSION_COOKIE_NAME && !value.is_empty()).then(|| Self(value.to_string()))
            })
            .next()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Set-Cookie` value for this handle.
    ///
    /// # Errors
    /// Returns an error if the handle contains characters not allowed in a header.
    pub fn cookie(&self, ttl: Duration, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.0,
            ttl.as_secs()
        );
        if secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

/// The caller's durable auth state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub valid: bool,
    pub subject: String,
    pub issued_at: u64,
}

impl SessionRecord {
    /// A record for a caller both authorities accepted.
    #[must_use]
    pub fn verified(subject: impl Into<String>) -> Self {
        Self {
            valid: true,
            subject: subject.into(),
            issued_at: unix_now(),
        }
    }

    /// Whether the record may stand in for a full check.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.valid && !self.subject.is_empty()
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        unix_now().saturating_sub(self.issued_at) < ttl.as_secs()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "version")]
enum StoredSession {
    #[serde(rename = "1")]
    V1 {
        valid: bool,
        subject: String,
        issued_at: u64,
    },
}

/// Serialize a record into its stored form.
///
/// # Errors
/// Returns `SessionError::Backend` if serialization fails.
pub fn encode(record: &SessionRecord) -> Result<String, SessionError> {
    let stored = StoredSession::V1 {
        valid: record.valid,
        subject: record.subject.clone(),
        issued_at: record.issued_at,
    };
    serde_json::to_string(&stored).map_err(|err| SessionError::Backend(err.to_string()))
}

/// Decode a stored value.
///
/// # Errors
/// Returns `SessionError::Corrupt` for malformed JSON, unknown schema versions,
/// or a record claiming validity without a subject.
pub fn decode(raw: &str) -> Result<SessionRecord, SessionError> {
    let stored: StoredSession =
        serde_json::from_str(raw).map_err(|err| SessionError::Corrupt(err.to_string()))?;

    match stored {
        StoredSession::V1 {
            valid,
            subject,
            issued_at,
        } => {
            if valid && subject.is_empty() {
                return Err(SessionError::Corrupt(
                    "valid record without subject".to_string(),
                ));
            }
            Ok(SessionRecord {
                valid,
                subject,
                issued_at,
            })
        }
    }
}

/// Storage capability behind the session adapter. Implementations only move
/// opaque strings around; they never interpret them.
pub trait SessionStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backend cannot be read.
    fn get(&self, handle: &SessionHandle) -> Result<Option<String>, SessionError>;

    /// Store `value`, replacing any previous one. Must be durable when it returns.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn set(
        &self,
        handle: &SessionHandle,
        value: String,
        ttl: Duration,
    ) -> Result<(), SessionError>;

    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn remove(&self, handle: &SessionHandle) -> Result<(), SessionError>;
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process session store with per-entry expiry.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<HashMap<SessionHandle, MemoryEntry>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    ///
    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, SessionError> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries.values().filter(|entry| entry.expires_at > now).count())
    }

    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, SessionError> {
        self.len().map(|len| len == 0)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SessionHandle, MemoryEntry>>, SessionError> {
        self.inner
            .lock()
            .map_err(|_| SessionError::Backend("session store lock poisoned".to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, handle: &SessionHandle) -> Result<Option<String>, SessionError> {
        let mut entries = self.lock()?;
        if let Some(entry) = entries.get(handle) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
        }
        entries.remove(handle);
        Ok(None)
    }

    fn set(
        &self,
        handle: &SessionHandle,
        value: String,
        ttl: Duration,
    ) -> Result<(), SessionError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| SessionError::Backend(format!("session ttl out of range: {ttl:?}")))?;

        let mut entries = self.lock()?;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(handle.clone(), MemoryEntry { value, expires_at });
        Ok(())
    }

    fn remove(&self, handle: &SessionHandle) -> Result<(), SessionError> {
        self.lock()?.remove(handle);
        Ok(())
    }
}

/// Reads and writes `SessionRecord`s through a `SessionStore`.
#[derive(Clone)]
pub struct SessionAdapter {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl SessionAdapter {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Load the caller's record. Missing, corrupt, expired, or unreadable
    /// records are all reported as absent.
    #[must_use]
    pub fn load(&self, handle: &SessionHandle) -> Option<SessionRecord> {
        let raw = match self.store.get(handle) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("Failed to read session: {err}");
                return None;
            }
        };

        let record = match decode(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!("Discarding session: {err}");
                self.discard(handle);
                return None;
            }
        };

        if !record.is_fresh(self.ttl) {
            debug!("Session record expired");
            return None;
        }

        Some(record)
    }

    /// Drop whatever is stored under `handle`. Failures are logged only.
    pub fn discard(&self, handle: &SessionHandle) {
        if let Err(err) = self.store.remove(handle) {
            warn!("Failed to discard session: {err}");
        }
    }

    /// Persist a fully verified record. Returns once the store has it.
    ///
    /// # Errors
    /// Returns `SessionError::Incomplete` for a record that is not valid, or
    /// a backend error if the store rejects the write.
    pub fn save(&self, handle: &SessionHandle, record: &SessionRecord) -> Result<(), SessionError> {
        if !record.is_complete() {
            return Err(SessionError::Incomplete);
        }
        self.store.set(handle, encode(record)?, self.ttl)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const TTL: Duration = Duration::from_secs(60);

    fn adapter() -> (MemorySessionStore, SessionAdapter) {
        let store = MemorySessionStore::new();
        let adapter = SessionAdapter::new(Arc::new(store.clone()), TTL);
        (store, adapter)
    }

    fn handle() -> SessionHandle {
        SessionHandle("handle".to_string())
    }

    #[test]
    fn generated_handles_are_url_safe_and_unique() -> Result<()> {
        let first = SessionHandle::generate()?;
        let second = SessionHandle::generate()?;
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 43);
        assert!(first
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        Ok(())
    }

    #[test]
    fn handle_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("_oauth2_proxy=abc; authgate_session=xyz; other=1"),
        );
        assert_eq!(
            SessionHandle::from_headers(&headers),
            Some(SessionHandle("xyz".to_string()))
        );
    }

    #[test]
    fn handle_missing_or_empty_cookie() {
        assert_eq!(SessionHandle::from_headers(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("authgate_session="));
        assert_eq!(SessionHandle::from_headers(&headers), None);
    }

    #[test]
    fn cookie_marks_secure_only_for_https() -> Result<()> {
        let plain = handle().cookie(TTL, false)?;
        assert_eq!(
            plain.to_str()?,
            "authgate_session=handle; Path=/; HttpOnly; SameSite=Lax; Max-Age=60"
        );
        let secure = handle().cookie(TTL, true)?;
        assert!(secure.to_str()?.ends_with("; Secure"));
        Ok(())
    }

    #[test]
    fn save_then_load() -> Result<()> {
        let (_, adapter) = adapter();
        let record = SessionRecord::verified("T3stUs3r");
        adapter.save(&handle(), &record)?;
        assert_eq!(adapter.load(&handle()), Some(record));
        Ok(())
    }

    #[test]
    fn save_overwrites_previous_record() -> Result<()> {
        let (_, adapter) = adapter();
        adapter.save(&handle(), &SessionRecord::verified("first"))?;
        adapter.save(&handle(), &SessionRecord::verified("second"))?;
        assert_eq!(
            adapter.load(&handle()).map(|record| record.subject),
            Some("second".to_string())
        );
        Ok(())
    }

    #[test]
    fn save_rejects_incomplete_records() -> Result<()> {
        let (store, adapter) = adapter();
        let invalid = SessionRecord {
            valid: false,
            subject: "T3stUs3r".to_string(),
            issued_at: unix_now(),
        };
        let anonymous = SessionRecord::verified("");

        assert!(matches!(
            adapter.save(&handle(), &invalid),
            Err(SessionError::Incomplete)
        ));
        assert!(matches!(
            adapter.save(&handle(), &anonymous),
            Err(SessionError::Incomplete)
        ));
        assert!(store.is_empty()?);
        Ok(())
    }

    #[test]
    fn missing_record_is_absent() {
        let (_, adapter) = adapter();
        assert_eq!(adapter.load(&handle()), None);
    }

    #[test]
    fn corrupt_record_is_absent_and_discarded() -> Result<()> {
        let (store, adapter) = adapter();
        store.set(&handle(), "not json".to_string(), TTL)?;
        assert_eq!(adapter.load(&handle()), None);
        assert!(store.get(&handle())?.is_none());
        Ok(())
    }

    #[test]
    fn unknown_schema_version_is_corrupt() {
        let raw = r#"{"version":"2","valid":true,"subject":"u","issued_at":0}"#;
        assert!(matches!(decode(raw), Err(SessionError::Corrupt(_))));
    }

    #[test]
    fn wrong_shape_is_corrupt() {
        let raw = r#"{"version":"1","valid":"yes","subject":"u","issued_at":0}"#;
        assert!(matches!(decode(raw), Err(SessionError::Corrupt(_))));
    }

    #[test]
    fn valid_record_without_subject_is_corrupt() {
        let raw = r#"{"version":"1","valid":true,"subject":"","issued_at":0}"#;
        assert!(matches!(decode(raw), Err(SessionError::Corrupt(_))));
    }

    #[test]
    fn stored_form_is_version_tagged() -> Result<()> {
        let raw = encode(&SessionRecord {
            valid: true,
            subject: "u".to_string(),
            issued_at: 7,
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(value["version"], "1");
        assert_eq!(value["subject"], "u");
        assert_eq!(value["issued_at"].as_u64(), Some(7));
        Ok(())
    }

    #[test]
    fn stale_record_is_absent() -> Result<()> {
        let (store, adapter) = adapter();
        let stale = SessionRecord {
            valid: true,
            subject: "T3stUs3r".to_string(),
            issued_at: unix_now().saturating_sub(TTL.as_secs() + 1),
        };
        store.set(&handle(), encode(&stale)?, TTL)?;
        assert_eq!(adapter.load(&handle()), None);
        Ok(())
    }

    #[test]
    fn memory_store_expires_entries() -> Result<()> {
        let store = MemorySessionStore::new();
        store.set(&handle(), "value".to_string(), Duration::ZERO)?;
        assert!(store.get(&handle())?.is_none());
        assert_eq!(store.len()?, 0);
        Ok(())
    }

    #[test]
    fn out_of_range_ttl_is_an_error_and_store_stays_usable() -> Result<()> {
        let store = MemorySessionStore::new();
        let huge = SessionAdapter::new(Arc::new(store.clone()), Duration::from_secs(u64::MAX));

        let err = huge.save(&handle(), &SessionRecord::verified("T3stUs3r"));
        assert!(matches!(err, Err(SessionError::Backend(_))));

        let adapter = SessionAdapter::new(Arc::new(store.clone()), TTL);
        let record = SessionRecord::verified("T3stUs3r");
        adapter.save(&handle(), &record)?;
        assert_eq!(adapter.load(&handle()), Some(record));
        assert_eq!(store.len()?, 1);
        Ok(())
    }
}
