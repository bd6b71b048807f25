//! Session registry: session id -> live broker connection.
//!
//! Backends are registered by tag with a constructor; `create` builds a
//! fresh, unauthenticated connection and stores it under a random id.
//! Sessions idle for longer than the registry's TTL are expired.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::Broker;
use crate::error::BrokerError;

/// A connection shared between the registry and its callers. The mutex
/// serializes calls on one session.
pub type SharedBroker = Arc<Mutex<Box<dyn Broker>>>;

type Constructor = Box<dyn Fn() -> Result<Box<dyn Broker>, BrokerError> + Send + Sync>;

/// Backend tag -> constructor.
#[derive(Default)]
pub struct BackendRegistry {
    constructors: FxHashMap<String, Constructor>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<Box<dyn Broker>, BrokerError> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
    }

    pub fn with<F>(mut self, kind: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Broker>, BrokerError> + Send + Sync + 'static,
    {
        self.register(kind, constructor);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered tags, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn create(&self, kind: &str) -> Result<Box<dyn Broker>, BrokerError> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| BrokerError::UnknownBackend(kind.to_string()))?;
        constructor()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Opaque session identifier (random UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(SessionId)
            .map_err(|_| BrokerError::SessionNotFound(s.to_string()))
    }
}

struct Entry {
    broker: SharedBroker,
    kind: &'static str,
    last_access: Mutex<Instant>,
}

impl Entry {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.saturating_duration_since(*self.last_access.lock()) > ttl)
    }
}

/// Concurrency-safe map of live sessions.
pub struct SessionRegistry {
    backends: BackendRegistry,
    sessions: RwLock<FxHashMap<SessionId, Entry>>,
    idle_ttl: Option<Duration>,
}

impl SessionRegistry {
    /// A registry whose sessions never expire.
    pub fn new(backends: BackendRegistry) -> Self {
        Self {
            backends,
            sessions: RwLock::new(FxHashMap::default()),
            idle_ttl: None,
        }
    }

    /// Expire sessions not used for `ttl`.
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Create an unauthenticated connection of `kind` and return its id.
    pub fn create(&self, kind: &str) -> Result<SessionId, BrokerError> {
        // Built outside the lock; only complete entries are ever inserted
        let broker = self.backends.create(kind)?;
        let entry = Entry {
            kind: broker.kind(),
            broker: Arc::new(Mutex::new(broker)),
            last_access: Mutex::new(Instant::now()),
        };

        let mut sessions = self.sessions.write();
        let mut id = SessionId::generate();
        while sessions.contains_key(&id) {
            id = SessionId::generate();
        }
        sessions.insert(id, entry);
        info!("created {kind} session {id}");
        Ok(id)
    }

    /// Look up a live session and mark it used.
    pub fn get(&self, id: &SessionId) -> Result<SharedBroker, BrokerError> {
        let now = Instant::now();
        {
            let sessions = self.sessions.read();
            match sessions.get(id) {
                None => return Err(BrokerError::SessionNotFound(id.to_string())),
                Some(entry) if !entry.is_expired(self.idle_ttl, now) => {
                    *entry.last_access.lock() = now;
                    return Ok(Arc::clone(&entry.broker));
                }
                Some(_) => {}
            }
        }
        // Expired: drop it (unless it was touched in between)
        let mut sessions = self.sessions.write();
        if sessions
            .get(id)
            .is_some_and(|e| e.is_expired(self.idle_ttl, now))
        {
            sessions.remove(id);
            debug!("session {id} expired");
        }
        Err(BrokerError::SessionNotFound(id.to_string()))
    }

    /// Look up a session by its textual id.
    pub fn get_str(&self, id: &str) -> Result<SharedBroker, BrokerError> {
        self.get(&id.parse()?)
    }

    /// Backend tag of a live session.
    pub fn kind(&self, id: &SessionId) -> Option<&'static str> {
        self.sessions.read().get(id).map(|e| e.kind)
    }

    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Drop all expired sessions; returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        if self.idle_ttl.is_none() {
            return 0;
        }
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, e| !e.is_expired(self.idle_ttl, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("evicted {evicted} idle sessions");
        }
        evicted
    }

    /// Number of stored sessions, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::mock::MockBroker;
    use crate::types::HandshakePhase;

    fn registry() -> SessionRegistry {
        let backends = BackendRegistry::new()
            .with("mock", || Ok(Box::new(MockBroker::builder().build()) as Box<dyn Broker>));
        SessionRegistry::new(backends)
    }

    #[test]
    fn create_and_get() {
        let reg = registry();
        let id = reg.create("mock").unwrap();
        let broker = reg.get(&id).unwrap();
        assert_eq!(broker.lock().kind(), "mock");
        assert_eq!(
            broker.lock().handshake_phase(),
            HandshakePhase::Unauthenticated
        );
        assert_eq!(reg.kind(&id), Some("mock"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unknown_backend() {
        let reg = registry();
        let err = reg.create("schwab").unwrap_err();
        assert!(matches!(err, BrokerError::UnknownBackend(ref k) if k == "schwab"));
        assert!(reg.is_empty());
    }

    #[test]
    fn constructor_failure_inserts_nothing() {
        let backends = BackendRegistry::new().with("broken", || {
            Err(BrokerError::BackendQuery("no client".into()))
        });
        let reg = SessionRegistry::new(backends);
        assert!(reg.create("broken").is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn unknown_and_malformed_ids() {
        let reg = registry();
        reg.create("mock").unwrap();
        let stranger = SessionId::generate();
        assert!(matches!(
            reg.get(&stranger),
            Err(BrokerError::SessionNotFound(_))
        ));
        assert!(matches!(
            reg.get_str("not-a-uuid"),
            Err(BrokerError::SessionNotFound(_))
        ));
    }

    #[test]
    fn textual_ids_round_trip() {
        let reg = registry();
        let id = reg.create("mock").unwrap();
        let text = id.to_string();
        assert_eq!(text.parse::<SessionId>().unwrap(), id);
        assert!(reg.get_str(&text).is_ok());
    }

    #[test]
    fn sessions_are_independent() {
        let reg = registry();
        let a = reg.create("mock").unwrap();
        let b = reg.create("mock").unwrap();
        assert_ne!(a, b);

        let url = reg
            .get(&a)
            .unwrap()
            .lock()
            .begin_handshake(crate::ConsumerCredentials::new("k", "s"))
            .unwrap();
        assert!(!url.is_empty());
        assert_eq!(
            reg.get(&a).unwrap().lock().handshake_phase(),
            HandshakePhase::RequestTokenObtained
        );
        assert_eq!(
            reg.get(&b).unwrap().lock().handshake_phase(),
            HandshakePhase::Unauthenticated
        );
    }

    #[test]
    fn remove_session() {
        let reg = registry();
        let id = reg.create("mock").unwrap();
        assert!(reg.remove(&id));
        assert!(!reg.remove(&id));
        assert!(reg.get(&id).is_err());
    }

    #[test]
    fn idle_sessions_expire() {
        let reg = registry().with_idle_ttl(Duration::from_millis(20));
        let stale = reg.create("mock").unwrap();
        thread::sleep(Duration::from_millis(40));
        let fresh = reg.create("mock").unwrap();

        assert_eq!(reg.evict_expired(), 1);
        assert!(matches!(reg.get(&stale), Err(BrokerError::SessionNotFound(_))));
        assert!(reg.get(&fresh).is_ok());
    }

    #[test]
    fn expired_lookup_removes_entry() {
        let reg = registry().with_idle_ttl(Duration::from_millis(20));
        let id = reg.create("mock").unwrap();
        thread::sleep(Duration::from_millis(40));
        assert!(reg.get(&id).is_err());
        assert!(reg.is_empty());
    }

    #[test]
    fn no_ttl_never_evicts() {
        let reg = registry();
        reg.create("mock").unwrap();
        assert_eq!(reg.evict_expired(), 0);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn concurrent_creates_and_lookups() {
        let reg = Arc::new(registry());
        let stranger = SessionId::generate();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    let mut ids = Vec::new();
                    for _ in 0..50 {
                        let id = reg.create("mock").unwrap();
                        assert!(reg.get(&id).is_ok());
                        assert!(matches!(
                            reg.get(&stranger),
                            Err(BrokerError::SessionNotFound(_))
                        ));
                        ids.push(id);
                    }
                    ids
                })
            })
            .collect();

        let mut all: Vec<SessionId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort_by_key(|id| id.to_string());
        all.dedup();
        assert_eq!(all.len(), total);
        assert_eq!(reg.len(), 400);
    }
}
