//! Sliding-window anti-replay cache.
//!
//! Tracks request fingerprints (`nonce_base64 ‖ signature_base64`) so a
//! captured discover request cannot be resubmitted inside the window. The
//! cache is per-process and in-memory: it is a denial-of-replay mechanism,
//! not a correctness barrier across restarts. Signatures stay bound to their
//! payload and nonce either way.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Expired entries are swept opportunistically, at most this often.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

struct CacheState {
    /// Fingerprint -> expiry instant.
    entries: HashMap<String, Instant>,
    next_purge: Instant,
}

/// Time-windowed seen-set over request fingerprints.
///
/// All mutation happens under one mutex, so check-then-insert is atomic per
/// fingerprint: of any number of concurrent identical requests, exactly one
/// observes a fresh fingerprint.
pub struct ReplayCache {
    window: Duration,
    state: Mutex<CacheState>,
}

impl ReplayCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_purge: Instant::now() + PURGE_INTERVAL,
            }),
        }
    }

    /// Record the fingerprint if it has not been seen inside the window.
    ///
    /// Returns `true` when the fingerprint is fresh (and is now recorded),
    /// `false` when it was already seen or either component is empty. A hit
    /// does not refresh the entry's expiry.
    pub fn check_and_record(&self, nonce_text: &str, signature_text: &str) -> bool {
        if nonce_text.is_empty() || signature_text.is_empty() {
            return false;
        }

        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.maybe_purge(now);

        match state.entries.entry(fingerprint(nonce_text, signature_text)) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    return false;
                }
                // The window has elapsed; the fingerprint counts as fresh again.
                occupied.insert(now + self.window);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now + self.window);
                true
            }
        }
    }

    /// Probe for a live fingerprint, extending its expiry by one window from
    /// the moment of access.
    ///
    /// The admission pipeline never re-touches an entry after recording it;
    /// this sliding touch exists for components that re-probe a fingerprint
    /// later and must not see early eviction.
    pub fn seen(&self, nonce_text: &str, signature_text: &str) -> bool {
        if nonce_text.is_empty() || signature_text.is_empty() {
            return false;
        }

        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match state.entries.get_mut(&fingerprint(nonce_text, signature_text)) {
            Some(expiry) if *expiry > now => {
                *expiry = now + self.window;
                true
            }
            _ => false,
        }
    }
}

impl CacheState {
    fn maybe_purge(&mut self, now: Instant) {
        if now < self.next_purge {
            return;
        }
        self.entries.retain(|_, expiry| *expiry > now);
        self.next_purge = now + PURGE_INTERVAL;
    }
}

fn fingerprint(nonce_text: &str, signature_text: &str) -> String {
    format!("{}{}", nonce_text, signature_text)
}
