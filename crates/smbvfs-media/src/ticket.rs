//! Capability tickets for remote media.
//!
//! A ticket is an unguessable token that stands in for one remote file. The
//! first caller to resolve it owns it (trust on first use); later callers get
//! [`TicketError::CallerMismatch`]. A ticket that sits idle for longer than
//! the TTL is removed the next time anyone looks at it.
//!
//! Tickets live in memory only and do not survive a restart.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::StreamConfig;
use crate::error::TicketError;

/// Default idle TTL: 30 minutes.
pub const DEFAULT_IDLE_TTL_MS: u64 = 30 * 60 * 1000;

/// Random bytes per token; tokens are their lowercase hex.
pub const TOKEN_BYTES: usize = 32;

/// Identity of whoever presents a ticket (a uid, a peer id, a session).
pub trait CallerIdentity: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> CallerIdentity for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// What a ticket grants access to.
#[derive(Clone, PartialEq, Eq)]
pub struct TicketSpec {
    pub mount_name: String,
    /// Share-relative path.
    pub remote_path: String,
    pub mime: String,
    /// Known size, if the issuer had one.
    pub size_bytes: Option<u64>,
}

impl fmt::Debug for TicketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketSpec")
            .field("mime", &self.mime)
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

/// An issued ticket.
#[derive(Clone)]
pub struct Ticket<I> {
    pub token: String,
    pub spec: TicketSpec,
    pub bound_identity: Option<I>,
    pub issued_at_ms: u64,
    pub last_access_ms: u64,
}

impl<I: fmt::Debug> fmt::Debug for Ticket<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("token", &short_token(&self.token))
            .field("spec", &self.spec)
            .field("bound_identity", &self.bound_identity)
            .field("issued_at_ms", &self.issued_at_ms)
            .field("last_access_ms", &self.last_access_ms)
            .finish()
    }
}

/// First 8 characters of a token, for logs.
pub fn short_token(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// In-memory ticket table.
pub struct TicketStore<I> {
    clock: Arc<dyn Clock>,
    idle_ttl_ms: u64,
    tickets: DashMap<String, Ticket<I>>,
}

impl<I: CallerIdentity> TicketStore<I> {
    pub fn new(clock: Arc<dyn Clock>, idle_ttl_ms: u64) -> Self {
        Self {
            clock,
            idle_ttl_ms,
            tickets: DashMap::new(),
        }
    }

    /// Store on the system clock with the default TTL.
    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock), DEFAULT_IDLE_TTL_MS)
    }

    /// Store with the idle TTL from `config`.
    pub fn from_config(clock: Arc<dyn Clock>, config: &StreamConfig) -> Self {
        Self::new(clock, config.idle_ttl_ms)
    }

    /// Idle time after which a ticket stops resolving.
    pub fn idle_ttl_ms(&self) -> u64 {
        self.idle_ttl_ms
    }

    fn is_idle(&self, ticket: &Ticket<I>, now_ms: u64) -> bool {
        now_ms.saturating_sub(ticket.last_access_ms) > self.idle_ttl_ms
    }

    /// Issue a fresh, unbound ticket.
    pub fn issue(&self, spec: TicketSpec) -> Ticket<I> {
        let now = self.clock.now_ms();
        loop {
            let token = new_token();
            if let Entry::Vacant(slot) = self.tickets.entry(token.clone()) {
                let ticket = Ticket {
                    token,
                    spec,
                    bound_identity: None,
                    issued_at_ms: now,
                    last_access_ms: now,
                };
                debug!(token = short_token(&ticket.token), mime = %ticket.spec.mime, "ticket issued");
                slot.insert(ticket.clone());
                return ticket;
            }
        }
    }

    /// Resolve `token` for `caller`, binding it on first use.
    ///
    /// Success refreshes the idle timer. The bind decision happens under the
    /// ticket's shard lock, so two first callers racing cannot both win.
    pub fn resolve(&self, token: &str, caller: &I) -> Result<Ticket<I>, TicketError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TicketError::EmptyToken);
        }
        let now = self.clock.now_ms();

        let Some(mut ticket) = self.tickets.get_mut(token) else {
            return Err(TicketError::Expired);
        };

        if self.is_idle(&ticket, now) {
            drop(ticket);
            self.tickets.remove_if(token, |_, t| self.is_idle(t, now));
            debug!(token = short_token(token), "ticket expired");
            return Err(TicketError::Expired);
        }

        if ticket.bound_identity.as_ref().is_some_and(|bound| bound != caller) {
            warn!(token = short_token(token), "ticket presented by a different caller");
            return Err(TicketError::CallerMismatch);
        }
        if ticket.bound_identity.is_none() {
            ticket.bound_identity = Some(caller.clone());
        }
        ticket.last_access_ms = now;
        Ok(ticket.clone())
    }

    /// Remove a ticket. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.tickets.remove(token.trim()).is_some()
    }

    /// Remove every idle ticket. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;
        self.tickets.retain(|_, t| {
            let keep = !self.is_idle(t, now);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed, "purged idle tickets");
        }
        removed
    }

    /// Tickets held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

impl<I> fmt::Debug for TicketStore<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketStore")
            .field("idle_ttl_ms", &self.idle_ttl_ms)
            .field("tickets", &self.tickets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn spec() -> TicketSpec {
        TicketSpec {
            mount_name: "home".into(),
            remote_path: "movies/a.mp4".into(),
            mime: "video/mp4".into(),
            size_bytes: Some(1234),
        }
    }

    fn store(ttl: u64) -> (TicketStore<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        (TicketStore::new(clock.clone(), ttl), clock)
    }

    #[test]
    fn tokens_are_64_hex_chars_and_unique() {
        let (store, _) = store(DEFAULT_IDLE_TTL_MS);
        let a = store.issue(spec());
        let b = store.issue(spec());
        assert_eq!(a.token.len(), TOKEN_BYTES * 2);
        assert!(a.token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a.token, b.token);
        assert_eq!(store.len(), 2);
        assert!(a.bound_identity.is_none());
    }

    #[test]
    fn first_caller_binds() {
        let (store, _) = store(DEFAULT_IDLE_TTL_MS);
        let t = store.issue(spec());
        let resolved = store.resolve(&t.token, &10042).unwrap();
        assert_eq!(resolved.bound_identity, Some(10042));
        assert_eq!(resolved.spec, spec());

        assert!(store.resolve(&t.token, &10042).is_ok());
        assert_eq!(
            store.resolve(&t.token, &10043).unwrap_err(),
            TicketError::CallerMismatch
        );
        // Mismatch does not unbind.
        assert!(store.resolve(&t.token, &10042).is_ok());
    }

    #[test]
    fn idle_ttl_is_strict() {
        let (store, clock) = store(100);
        let t = store.issue(spec());

        clock.advance(100);
        assert!(store.resolve(&t.token, &1).is_ok());

        clock.advance(101);
        assert_eq!(store.resolve(&t.token, &1).unwrap_err(), TicketError::Expired);
        assert!(store.is_empty());
        assert_eq!(store.resolve(&t.token, &1).unwrap_err(), TicketError::Expired);
    }

    #[test]
    fn resolve_refreshes_idle_timer() {
        let (store, clock) = store(100);
        let t = store.issue(spec());
        for _ in 0..5 {
            clock.advance(80);
            assert!(store.resolve(&t.token, &1).is_ok());
        }
    }

    #[test]
    fn unknown_and_blank_tokens() {
        let (store, _) = store(100);
        assert_eq!(store.resolve("nope", &1).unwrap_err(), TicketError::Expired);
        assert_eq!(store.resolve("  ", &1).unwrap_err(), TicketError::EmptyToken);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let (store, _) = store(100);
        let t = store.issue(spec());
        assert!(store.resolve(&format!(" {} ", t.token), &1).is_ok());
    }

    #[test]
    fn revoke_and_purge() {
        let (store, clock) = store(100);
        let a = store.issue(spec());
        let b = store.issue(spec());
        assert!(store.revoke(&a.token));
        assert!(!store.revoke(&a.token));
        assert_eq!(store.resolve(&a.token, &1).unwrap_err(), TicketError::Expired);

        let c = store.issue(spec());
        clock.advance(60);
        store.resolve(&c.token, &1).unwrap();
        clock.advance(60);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.resolve(&b.token, &1).unwrap_err(), TicketError::Expired);
    }

    #[test]
    fn debug_hides_token_and_path() {
        let (store, _) = store(100);
        let t = store.issue(spec());
        let shown = format!("{t:?}");
        assert!(!shown.contains(&t.token));
        assert!(!shown.contains("movies"));
        assert!(shown.contains(short_token(&t.token)));
    }

    #[test]
    fn racing_first_callers_bind_exactly_once() {
        let (store, _) = store(DEFAULT_IDLE_TTL_MS);
        let store = Arc::new(store);
        let token = store.issue(spec()).token;
        let handles: Vec<_> = (0..16u32)
            .map(|caller| {
                let store = store.clone();
                let token = token.clone();
                std::thread::spawn(move || store.resolve(&token, &caller).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }
}
