//! Deferred persistence of the view-state token.
//!
//! Nothing here touches a clock or the location bar. Callers feed in
//! millisecond timestamps and poll for a value to write, so the same code
//! drives the browser host, the terminal viewer and the tests.

use crate::config::PersistConfig;

/// Trailing-edge debouncer with a maximum wait.
///
/// A pushed value is released once no newer value arrived for `wait_ms`, or
/// once `max_wait_ms` passed since the first unreleased push, whichever comes
/// first. Only the latest value is kept.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    wait_ms: u64,
    max_wait_ms: u64,
    pending: Option<Pending<T>>,
}

#[derive(Debug, Clone)]
struct Pending<T> {
    value: T,
    first_ms: u64,
    last_ms: u64,
}

impl<T> Debouncer<T> {
    pub fn new(wait_ms: u64, max_wait_ms: u64) -> Self {
        Self {
            wait_ms,
            max_wait_ms: max_wait_ms.max(wait_ms),
            pending: None,
        }
    }

    pub fn push(&mut self, value: T, now_ms: u64) {
        let first_ms = self.pending.as_ref().map_or(now_ms, |p| p.first_ms);
        self.pending = Some(Pending {
            value,
            first_ms,
            last_ms: now_ms,
        });
    }

    /// Release the pending value if its deadline has passed.
    pub fn poll(&mut self, now_ms: u64) -> Option<T> {
        let due = self.deadline()? <= now_ms;
        if due {
            self.pending.take().map(|p| p.value)
        } else {
            None
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// When the pending value will be released, for hosts that schedule a timer.
    pub fn deadline(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| {
            (p.last_ms.saturating_add(self.wait_ms)).min(p.first_ms.saturating_add(self.max_wait_ms))
        })
    }
}

/// Two-way bridge between the session and the location hash: a debouncer
/// for outgoing view states plus the last hash this side wrote, so the change
/// event that write triggers is not mistaken for navigation.
#[derive(Debug, Clone)]
pub struct HashSync {
    outgoing: Debouncer<String>,
    last_written: Option<String>,
}

impl HashSync {
    pub fn new(config: &PersistConfig) -> Self {
        Self {
            outgoing: Debouncer::new(config.debounce_ms, config.max_wait_ms),
            last_written: None,
        }
    }

    /// Queue an encoded view state for writing.
    pub fn queue(&mut self, hash: String, now_ms: u64) {
        self.outgoing.push(hash, now_ms);
    }

    /// The hash to write now, if the debounce elapsed and it differs from
    /// what was last written.
    pub fn poll(&mut self, now_ms: u64) -> Option<String> {
        let hash = self.outgoing.poll(now_ms)?;
        if self.last_written.as_deref() == Some(hash.as_str()) {
            return None;
        }
        self.last_written = Some(hash.clone());
        Some(hash)
    }

    pub fn deadline(&self) -> Option<u64> {
        self.outgoing.deadline()
    }

    /// Whether an observed hash came from somewhere else (history navigation,
    /// a pasted link) and should be applied.
    pub fn is_external(&self, observed: &str) -> bool {
        let observed = strip_hash(observed);
        self.last_written.as_deref().map(strip_hash) != Some(observed)
    }

    /// Adopt an externally applied hash as current. It is not written back,
    /// and a queued write it supersedes is dropped.
    pub fn adopt(&mut self, hash: &str) {
        self.last_written = Some(strip_hash(hash).to_string());
        self.outgoing.cancel();
    }
}

fn strip_hash(hash: &str) -> &str {
    hash.strip_prefix('#').unwrap_or(hash)
}
