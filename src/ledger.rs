//! Session and file-access ledger.
//!
//! Tracks which client sessions exist, which handles each session holds, and
//! which sessions read or write each path. Enforces single-writer exclusion
//! per path across sessions. The ledger is pure in-memory state: it never
//! touches storage, and it is lost on restart.
//!
//! [`AccessLedger`] is the state machine itself. [`SharedLedger`] puts it
//! behind one mutex so every operation is linearizable with respect to every
//! other, and optionally runs an idle-session reaper.
//!
//! A handle table only grows. Releasing a descriptor clears its slot in place,
//! so a descriptor number is never handed out twice within a session.

use crate::config::{LedgerConfig, WriterPolicy};
use crate::error::{Result, ShareError};
use crate::types::{AccessMode, Descriptor, SessionToken};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

/// Sentinel sent on the wire when a write grant is refused.
pub const DENIED: i64 = -1;

/// Outcome of a write-grant request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// The write slot was appended at this descriptor.
    Granted(Descriptor),
    /// Another writer holds the path (or, under
    /// [`WriterPolicy::ExcludeReaders`], a reader does).
    Denied,
}

impl Grant {
    pub fn descriptor(self) -> Option<Descriptor> {
        match self {
            Grant::Granted(fd) => Some(fd),
            Grant::Denied => None,
        }
    }

    pub fn is_granted(self) -> bool {
        matches!(self, Grant::Granted(_))
    }

    /// Wire form: the descriptor, or [`DENIED`].
    pub fn to_wire(self) -> i64 {
        match self {
            Grant::Granted(fd) => fd as i64,
            Grant::Denied => DENIED,
        }
    }
}

/// One open handle.
#[derive(Debug, Clone)]
struct HandleSlot {
    path: String,
    mode: AccessMode,
}

/// One client session.
#[derive(Debug)]
struct Session {
    /// Index is the descriptor. `None` marks a released slot.
    slots: Vec<Option<HandleSlot>>,
    last_activity: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    fn push(&mut self, path: &str, mode: AccessMode) -> Descriptor {
        self.slots.push(Some(HandleSlot {
            path: path.to_string(),
            mode,
        }));
        (self.slots.len() - 1) as Descriptor
    }

    fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Who holds a path.
#[derive(Debug, Default)]
struct PathLock {
    writer: Option<SessionToken>,
    /// Reader sessions and their descriptors on this path.
    readers: HashMap<SessionToken, BTreeSet<Descriptor>>,
}

impl PathLock {
    fn is_locked(&self) -> bool {
        self.writer.is_some() || !self.readers.is_empty()
    }

    fn can_grant_writer(&self, policy: WriterPolicy) -> bool {
        match policy {
            WriterPolicy::IgnoreReaders => self.writer.is_none(),
            WriterPolicy::ExcludeReaders => !self.is_locked(),
        }
    }
}

/// Snapshot of ledger counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Sessions currently alive.
    pub live_sessions: usize,
    /// Handles not yet released, across all sessions.
    pub open_handles: usize,
    /// Paths with at least one holder.
    pub locked_paths: usize,
    /// Total sessions started.
    pub sessions_started: u64,
    /// Total sessions ended (explicitly or by the reaper).
    pub sessions_ended: u64,
    /// Total handles granted.
    pub grants: u64,
    /// Total write grants refused.
    pub denials: u64,
    /// Total handles released.
    pub releases: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sessions_started: u64,
    sessions_ended: u64,
    grants: u64,
    denials: u64,
    releases: u64,
}

type TokenSource = Box<dyn FnMut() -> SessionToken + Send>;

/// The session and path-lock state machine.
pub struct AccessLedger {
    config: LedgerConfig,
    sessions: HashMap<SessionToken, Session>,
    paths: HashMap<String, PathLock>,
    token_source: TokenSource,
    counters: Counters,
}

impl AccessLedger {
    /// Create a ledger that issues random UUID tokens.
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_token_source(config, SessionToken::generate)
    }

    /// Create a ledger with a custom token generator.
    pub fn with_token_source<F>(config: LedgerConfig, source: F) -> Self
    where
        F: FnMut() -> SessionToken + Send + 'static,
    {
        Self {
            config,
            sessions: HashMap::new(),
            paths: HashMap::new(),
            token_source: Box::new(source),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Allocate a new session with an empty handle table.
    pub fn start_session(&mut self) -> Result<SessionToken> {
        let attempts = self.config.max_token_attempts;
        for _ in 0..attempts {
            let token = (self.token_source)();
            if !self.sessions.contains_key(&token) {
                self.sessions.insert(token.clone(), Session::new());
                self.counters.sessions_started += 1;
                debug!(session = %token, "Session started");
                return Ok(token);
            }
        }

        Err(ShareError::AllocationExhausted { attempts })
    }

    /// End a session, releasing every handle it still holds.
    ///
    /// Unknown tokens are ignored. Returns the number of handles released.
    pub fn end_session(&mut self, token: &SessionToken) -> usize {
        let Some(session) = self.sessions.remove(token) else {
            return 0;
        };

        let mut released = 0;
        for (fd, slot) in session.slots.iter().enumerate() {
            if let Some(slot) = slot {
                release_slot(&mut self.paths, token, fd as Descriptor, slot);
                released += 1;
            }
        }

        self.counters.sessions_ended += 1;
        self.counters.releases += released as u64;
        debug!(session = %token, released, "Session ended");
        released
    }

    pub fn is_valid_session(&self, token: &SessionToken) -> bool {
        self.sessions.contains_key(token)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Record activity on a session. Returns false for unknown tokens.
    pub fn touch(&mut self, token: &SessionToken) -> bool {
        match self.sessions.get_mut(token) {
            Some(session) => {
                session.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Request a write handle on `path`.
    pub fn open_for_write(&mut self, token: &SessionToken, path: &str) -> Result<Grant> {
        let session = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| ShareError::InvalidSession(token.to_string()))?;

        let policy = self.config.writer_policy;
        let grantable = self
            .paths
            .get(path)
            .map_or(true, |lock| lock.can_grant_writer(policy));

        if !grantable {
            self.counters.denials += 1;
            debug!(session = %token, path, "Write grant denied");
            return Ok(Grant::Denied);
        }

        self.paths.entry(path.to_string()).or_default().writer = Some(token.clone());
        let fd = session.push(path, AccessMode::Write);
        self.counters.grants += 1;
        Ok(Grant::Granted(fd))
    }

    /// Open a read handle on `path`. Never refused.
    pub fn open_for_read(&mut self, token: &SessionToken, path: &str) -> Result<Descriptor> {
        let session = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| ShareError::InvalidSession(token.to_string()))?;

        let fd = session.push(path, AccessMode::Read);
        self.paths
            .entry(path.to_string())
            .or_default()
            .readers
            .entry(token.clone())
            .or_default()
            .insert(fd);
        self.counters.grants += 1;
        Ok(fd)
    }

    /// Open a handle in whichever mode the flags ask for.
    pub fn open(&mut self, token: &SessionToken, path: &str, mode: AccessMode) -> Result<Grant> {
        match mode {
            AccessMode::Write => self.open_for_write(token, path),
            AccessMode::Read => self.open_for_read(token, path).map(Grant::Granted),
        }
    }

    /// Check that `fd` is a live handle of `token` on `path`.
    ///
    /// Misuse is an error. A read handle checked with `require_write` is not
    /// an error: it returns `Ok(false)`.
    pub fn is_valid_handle(
        &self,
        token: &SessionToken,
        fd: Descriptor,
        path: &str,
        require_write: bool,
    ) -> Result<bool> {
        let slot = self.slot(token, fd)?;

        if slot.path != path {
            return Err(ShareError::PathMismatch {
                descriptor: fd,
                expected: slot.path.clone(),
                actual: path.to_string(),
            });
        }

        Ok(!require_write || slot.mode.is_write())
    }

    fn slot(&self, token: &SessionToken, fd: Descriptor) -> Result<&HandleSlot> {
        let session = self
            .sessions
            .get(token)
            .ok_or_else(|| ShareError::InvalidSession(token.to_string()))?;

        let entry = usize::try_from(fd)
            .ok()
            .and_then(|idx| session.slots.get(idx))
            .ok_or_else(|| ShareError::InvalidHandle {
                descriptor: fd,
                reason: "descriptor out of range".to_string(),
            })?;

        entry.as_ref().ok_or_else(|| ShareError::InvalidHandle {
            descriptor: fd,
            reason: "handle already closed".to_string(),
        })
    }

    /// Whether any session holds a reader or writer handle on `path`.
    pub fn is_any_handle_outstanding(&self, path: &str) -> bool {
        self.paths.get(path).is_some_and(PathLock::is_locked)
    }

    /// Release a handle. The descriptor is never valid again.
    pub fn close(&mut self, token: &SessionToken, fd: Descriptor, path: &str) -> Result<()> {
        self.is_valid_handle(token, fd, path, false)?;

        let session = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| ShareError::InvalidSession(token.to_string()))?;
        let idx = usize::try_from(fd).map_err(|_| ShareError::InvalidHandle {
            descriptor: fd,
            reason: "descriptor out of range".to_string(),
        })?;

        if let Some(slot) = session.slots.get_mut(idx).and_then(Option::take) {
            release_slot(&mut self.paths, token, fd, &slot);
            self.counters.releases += 1;
        }
        Ok(())
    }

    /// Sessions with no activity since `now - idle`.
    pub fn idle_sessions(&self, idle: Duration, now: Instant) -> Vec<SessionToken> {
        self.sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_activity) >= idle)
            .map(|(token, _)| token.clone())
            .collect()
    }

    /// End every idle session. Returns the tokens that were ended.
    pub fn reap_idle(&mut self, idle: Duration, now: Instant) -> Vec<SessionToken> {
        let idle_tokens = self.idle_sessions(idle, now);
        for token in &idle_tokens {
            self.end_session(token);
        }
        idle_tokens
    }

    /// Get ledger statistics.
    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            live_sessions: self.sessions.len(),
            open_handles: self.sessions.values().map(Session::open_count).sum(),
            locked_paths: self.paths.values().filter(|l| l.is_locked()).count(),
            sessions_started: self.counters.sessions_started,
            sessions_ended: self.counters.sessions_ended,
            grants: self.counters.grants,
            denials: self.counters.denials,
            releases: self.counters.releases,
        }
    }
}

/// Drop one handle's contribution to its path's lock record.
fn release_slot(
    paths: &mut HashMap<String, PathLock>,
    token: &SessionToken,
    fd: Descriptor,
    slot: &HandleSlot,
) {
    let Some(lock) = paths.get_mut(&slot.path) else {
        return;
    };

    match slot.mode {
        AccessMode::Write => {
            if lock.writer.as_ref() == Some(token) {
                lock.writer = None;
            }
        }
        AccessMode::Read => {
            if let Some(fds) = lock.readers.get_mut(token) {
                fds.remove(&fd);
                if fds.is_empty() {
                    lock.readers.remove(token);
                }
            }
        }
    }

    if !lock.is_locked() {
        paths.remove(&slot.path);
    }
}

/// The ledger behind a single mutual-exclusion boundary.
#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<AccessLedger>>,
}

impl SharedLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self::from_ledger(AccessLedger::new(config))
    }

    pub fn from_ledger(ledger: AccessLedger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Enter the critical section. Everything done through one guard is
    /// atomic with respect to other requests.
    pub fn lock(&self) -> MutexGuard<'_, AccessLedger> {
        self.inner.lock()
    }

    pub fn stats(&self) -> LedgerStats {
        self.inner.lock().stats()
    }

    /// Periodically end sessions idle for longer than `idle`, until
    /// `shutdown` flips to true.
    pub fn spawn_reaper(
        &self,
        idle: Duration,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let ledger = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reaped = ledger.lock().reap_idle(idle, Instant::now());
                        for token in reaped {
                            info!(session = %token, idle_secs = idle.as_secs(), "Reaped idle session");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> AccessLedger {
        AccessLedger::new(LedgerConfig::default())
    }

    fn strict_ledger() -> AccessLedger {
        AccessLedger::new(LedgerConfig {
            writer_policy: WriterPolicy::ExcludeReaders,
            ..Default::default()
        })
    }

    #[test]
    fn test_single_writer_scenario() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();
        let s2 = ledger.start_session().unwrap();

        assert_eq!(ledger.open_for_write(&s1, "f").unwrap(), Grant::Granted(0));
        assert_eq!(ledger.open_for_write(&s2, "f").unwrap(), Grant::Denied);

        ledger.close(&s1, 0, "f").unwrap();

        assert_eq!(ledger.open_for_write(&s2, "f").unwrap(), Grant::Granted(0));
    }

    #[test]
    fn test_same_session_second_writer_denied() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();

        assert!(ledger.open_for_write(&s1, "lock").unwrap().is_granted());
        assert_eq!(ledger.open_for_write(&s1, "lock").unwrap(), Grant::Denied);
    }

    #[test]
    fn test_at_most_one_writer_among_many_sessions() {
        let mut ledger = ledger();
        let sessions: Vec<_> = (0..8).map(|_| ledger.start_session().unwrap()).collect();

        let granted: Vec<_> = sessions
            .iter()
            .filter(|s| ledger.open_for_write(s, "shared").unwrap().is_granted())
            .collect();
        assert_eq!(granted.len(), 1);
        assert_eq!(ledger.stats().denials, 7);
    }

    #[test]
    fn test_denial_leaves_state_untouched() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();
        let s2 = ledger.start_session().unwrap();

        ledger.open_for_write(&s1, "f").unwrap();
        let before = ledger.stats();
        assert_eq!(ledger.open_for_write(&s2, "f").unwrap(), Grant::Denied);
        let after = ledger.stats();

        assert_eq!(before.open_handles, after.open_handles);
        assert_eq!(before.grants, after.grants);
        // s2's table did not grow: its first grant is still descriptor 0.
        assert_eq!(ledger.open_for_read(&s2, "g").unwrap(), 0);
    }

    #[test]
    fn test_readers_do_not_block_writer_by_default() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();
        let s2 = ledger.start_session().unwrap();

        ledger.open_for_read(&s1, "f").unwrap();
        assert!(ledger.open_for_write(&s2, "f").unwrap().is_granted());
        // Nor does a writer block readers.
        assert_eq!(ledger.open_for_read(&s1, "f").unwrap(), 1);
    }

    #[test]
    fn test_exclude_readers_policy() {
        let mut ledger = strict_ledger();
        let s1 = ledger.start_session().unwrap();
        let s2 = ledger.start_session().unwrap();

        let fd = ledger.open_for_read(&s1, "f").unwrap();
        assert_eq!(ledger.open_for_write(&s2, "f").unwrap(), Grant::Denied);

        ledger.close(&s1, fd, "f").unwrap();
        assert!(ledger.open_for_write(&s2, "f").unwrap().is_granted());
    }

    #[test]
    fn test_descriptors_are_never_reused() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();

        let fd0 = ledger.open_for_read(&s1, "a").unwrap();
        ledger.close(&s1, fd0, "a").unwrap();

        let fd1 = ledger.open_for_read(&s1, "a").unwrap();
        assert_eq!(fd1, fd0 + 1);

        let err = ledger.is_valid_handle(&s1, fd0, "a", false).unwrap_err();
        assert!(matches!(err, ShareError::InvalidHandle { descriptor: 0, .. }));
        assert!(ledger.is_valid_handle(&s1, fd1, "a", false).unwrap());
    }

    #[test]
    fn test_double_close_fails() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();

        let fd = ledger.open_for_read(&s1, "a").unwrap();
        ledger.close(&s1, fd, "a").unwrap();
        assert!(matches!(
            ledger.close(&s1, fd, "a"),
            Err(ShareError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_handle_validation_errors() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();
        let ghost = SessionToken::from("ghost");

        let fd = ledger.open_for_read(&s1, "a").unwrap();

        assert!(matches!(
            ledger.is_valid_handle(&ghost, fd, "a", false),
            Err(ShareError::InvalidSession(_))
        ));
        assert!(matches!(
            ledger.is_valid_handle(&s1, 7, "a", false),
            Err(ShareError::InvalidHandle { descriptor: 7, .. })
        ));
        assert!(matches!(
            ledger.is_valid_handle(&s1, fd, "b", false),
            Err(ShareError::PathMismatch { .. })
        ));
        assert!(matches!(
            ledger.close(&s1, fd, "b"),
            Err(ShareError::PathMismatch { .. })
        ));
        // A mismatched close must not release the handle.
        assert!(ledger.is_any_handle_outstanding("a"));
    }

    #[test]
    fn test_require_write_on_read_handle_is_false_not_error() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();

        let rfd = ledger.open_for_read(&s1, "a").unwrap();
        let wfd = ledger.open_for_write(&s1, "b").unwrap().descriptor().unwrap();

        assert!(!ledger.is_valid_handle(&s1, rfd, "a", true).unwrap());
        assert!(ledger.is_valid_handle(&s1, wfd, "b", true).unwrap());
    }

    #[test]
    fn test_outstanding_handles_track_readers_and_writers() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();
        let s2 = ledger.start_session().unwrap();

        assert!(!ledger.is_any_handle_outstanding("a"));

        let r1 = ledger.open_for_read(&s1, "a").unwrap();
        let r2 = ledger.open_for_read(&s1, "a").unwrap();
        let r3 = ledger.open_for_read(&s2, "a").unwrap();
        assert!(ledger.is_any_handle_outstanding("a"));

        ledger.close(&s1, r1, "a").unwrap();
        ledger.close(&s2, r3, "a").unwrap();
        assert!(ledger.is_any_handle_outstanding("a"));

        ledger.close(&s1, r2, "a").unwrap();
        assert!(!ledger.is_any_handle_outstanding("a"));
        assert_eq!(ledger.stats().locked_paths, 0);
    }

    #[test]
    fn test_end_session_releases_everything() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();
        let s2 = ledger.start_session().unwrap();

        ledger.open_for_write(&s1, "w").unwrap();
        ledger.open_for_read(&s1, "r").unwrap();
        ledger.open_for_read(&s1, "r").unwrap();
        let closed = ledger.open_for_read(&s1, "c").unwrap();
        ledger.close(&s1, closed, "c").unwrap();
        ledger.open_for_read(&s2, "shared").unwrap();
        ledger.open_for_read(&s1, "shared").unwrap();

        assert_eq!(ledger.end_session(&s1), 4);

        assert!(!ledger.is_valid_session(&s1));
        assert!(!ledger.is_any_handle_outstanding("w"));
        assert!(!ledger.is_any_handle_outstanding("r"));
        assert!(ledger.is_any_handle_outstanding("shared"));
        assert!(ledger.open_for_write(&s2, "w").unwrap().is_granted());

        // Unknown and already-ended tokens are a no-op.
        assert_eq!(ledger.end_session(&s1), 0);
    }

    #[test]
    fn test_operations_on_unknown_session() {
        let mut ledger = ledger();
        let ghost = SessionToken::from("ghost");

        assert!(!ledger.is_valid_session(&ghost));
        assert!(!ledger.touch(&ghost));
        assert!(matches!(
            ledger.open_for_write(&ghost, "f"),
            Err(ShareError::InvalidSession(_))
        ));
        assert!(matches!(
            ledger.open_for_read(&ghost, "f"),
            Err(ShareError::InvalidSession(_))
        ));
        assert!(!ledger.is_any_handle_outstanding("f"));
    }

    #[test]
    fn test_token_allocation_retries_then_exhausts() {
        let config = LedgerConfig {
            max_token_attempts: 3,
            ..Default::default()
        };

        let mut ledger = AccessLedger::with_token_source(config, || SessionToken::from("same"));
        assert_eq!(ledger.start_session().unwrap().as_str(), "same");
        assert!(matches!(
            ledger.start_session(),
            Err(ShareError::AllocationExhausted { attempts: 3 })
        ));

        let mut n = 0;
        let config = LedgerConfig {
            max_token_attempts: 3,
            ..Default::default()
        };
        let mut ledger = AccessLedger::with_token_source(config, move || {
            n += 1;
            SessionToken::from(if n < 3 { "dup".to_string() } else { format!("t{}", n) })
        });
        ledger.start_session().unwrap();
        // Second call collides once on "dup", then gets "t3".
        assert_eq!(ledger.start_session().unwrap().as_str(), "t3");
    }

    #[test]
    fn test_reap_idle_sessions() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();
        let s2 = ledger.start_session().unwrap();
        ledger.open_for_write(&s1, "f").unwrap();

        let later = Instant::now() + Duration::from_secs(120);
        assert!(ledger.idle_sessions(Duration::from_secs(600), later).is_empty());

        let mut reaped = ledger.reap_idle(Duration::from_secs(60), later);
        reaped.sort();
        let mut expected = vec![s1.clone(), s2.clone()];
        expected.sort();
        assert_eq!(reaped, expected);
        assert!(!ledger.is_any_handle_outstanding("f"));
        assert_eq!(ledger.stats().live_sessions, 0);
    }

    #[test]
    fn test_stats() {
        let mut ledger = ledger();
        let s1 = ledger.start_session().unwrap();
        let s2 = ledger.start_session().unwrap();

        let fd = ledger.open_for_write(&s1, "f").unwrap().descriptor().unwrap();
        ledger.open_for_write(&s2, "f").unwrap();
        ledger.open_for_read(&s2, "g").unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.live_sessions, 2);
        assert_eq!(stats.open_handles, 2);
        assert_eq!(stats.locked_paths, 2);
        assert_eq!(stats.grants, 2);
        assert_eq!(stats.denials, 1);

        ledger.close(&s1, fd, "f").unwrap();
        ledger.end_session(&s2);

        let stats = ledger.stats();
        assert_eq!(stats.live_sessions, 1);
        assert_eq!(stats.open_handles, 0);
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.sessions_ended, 1);
    }

    #[test]
    fn test_shared_ledger_concurrent_writers() {
        let shared = SharedLedger::new(LedgerConfig::default());
        let tokens: Vec<_> = (0..16)
            .map(|_| shared.lock().start_session().unwrap())
            .collect();

        let handles: Vec<_> = tokens
            .into_iter()
            .map(|token| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    shared.lock().open_for_write(&token, "contended").unwrap().is_granted()
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|g| *g)
            .count();
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_reaper_task_ends_idle_sessions() {
        let shared = SharedLedger::new(LedgerConfig::default());
        let token = shared.lock().start_session().unwrap();
        shared.lock().open_for_write(&token, "f").unwrap();

        let (tx, rx) = watch::channel(false);
        let reaper = shared.spawn_reaper(Duration::from_millis(50), Duration::from_millis(20), rx);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!shared.lock().is_valid_session(&token));
        assert!(!shared.lock().is_any_handle_outstanding("f"));

        tx.send(true).unwrap();
        reaper.await.unwrap();
    }
}
