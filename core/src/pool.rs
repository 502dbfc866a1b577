//! Registry of in-flight requests and the credential resolver built on it.
//!
//! # Design
//! The pool is the one piece of shared mutable state in the client. Request
//! issuance, completion and TLS challenges all reach it from different
//! threads, so every access goes through a single mutex. Challenge lookups
//! copy the entry list under the lock and scan the copy, so a scan never
//! sees a half-applied insert or removal.
//!
//! Entries are tracked by exchange id. Two structurally equal requests can be
//! in flight at once, and each `PoolGuard` removes exactly its own entry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{self, BoxFuture};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::http::{Request, WireRequest};
use crate::tls::{Challenge, ChallengeDisposition, SslCredentials};

pub type ExchangeId = Uuid;

/// Answers TLS challenges raised by the transport.
///
/// Called with the wire form of the request that triggered the challenge.
/// May be invoked from any thread; the returned future may complete after
/// further asynchronous work.
pub trait ChallengeHandler: Send + Sync {
    fn handle(&self, origin: &WireRequest, challenge: &Challenge) -> BoxFuture<'static, ChallengeDisposition>;
}

#[derive(Debug, Default)]
pub struct RequestPool {
    entries: Mutex<Vec<(ExchangeId, Arc<Request>)>>,
}

impl RequestPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ExchangeId, Arc<Request>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an exchange. The entry is removed when the returned guard is
    /// released or dropped, whichever comes first.
    pub fn insert(self: &Arc<Self>, request: Arc<Request>) -> PoolGuard {
        let id = Uuid::new_v4();
        let size = {
            let mut entries = self.lock();
            entries.push((id, request));
            entries.len()
        };
        trace!(exchange = %id, size, "request added to pool");
        PoolGuard {
            pool: Arc::clone(self),
            id,
            released: false,
        }
    }

    fn remove(&self, id: ExchangeId) -> bool {
        let (removed, size) = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|(entry, _)| *entry != id);
            (entries.len() < before, entries.len())
        };
        trace!(exchange = %id, size, removed, "request removed from pool");
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A consistent copy of the current entries.
    pub fn snapshot(&self) -> Vec<Arc<Request>> {
        self.lock().iter().map(|(_, request)| Arc::clone(request)).collect()
    }

    pub fn credentials_for(&self, origin: &WireRequest) -> Option<SslCredentials> {
        find_credentials(&self.snapshot(), origin)
    }
}

/// Credentials of the first pooled request structurally equal to `origin`.
pub fn find_credentials(entries: &[Arc<Request>], origin: &WireRequest) -> Option<SslCredentials> {
    entries
        .iter()
        .find(|request| request.matches(origin))
        .and_then(|request| request.ssl_credentials().cloned())
}

/// Membership of one exchange in the pool.
#[derive(Debug)]
pub struct PoolGuard {
    pool: Arc<RequestPool>,
    id: ExchangeId,
    released: bool,
}

impl PoolGuard {
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn release(mut self) {
        self.released = true;
        self.pool.remove(self.id);
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if !self.released {
            self.pool.remove(self.id);
        }
    }
}

/// Resolves TLS challenges by correlating them with pooled requests.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    pool: Arc<RequestPool>,
}

impl CredentialResolver {
    pub fn new(pool: Arc<RequestPool>) -> Self {
        Self { pool }
    }

    /// Decide how to answer `challenge`.
    ///
    /// With no matching pooled request, or a bundle that does not claim the
    /// scheme, the transport's default validation applies. A bundle that
    /// claims the scheme but cannot produce material for it denies the
    /// exchange instead of falling through to default trust.
    pub fn resolve(&self, origin: &WireRequest, challenge: &Challenge) -> ChallengeDisposition {
        let Some(credentials) = self.pool.credentials_for(origin) else {
            debug!(url = %origin.url, scheme = %challenge.scheme, "no pooled credentials; default handling");
            return ChallengeDisposition::PerformDefaultHandling;
        };
        if !credentials.can_authenticate(&challenge.scheme) {
            return ChallengeDisposition::PerformDefaultHandling;
        }
        match credentials.credentials_for(challenge) {
            Some(credential) => {
                debug!(url = %origin.url, scheme = %challenge.scheme, "answering challenge with pooled credentials");
                ChallengeDisposition::UseCredential(credential)
            }
            None => ChallengeDisposition::CancelChallenge,
        }
    }
}

impl ChallengeHandler for CredentialResolver {
    fn handle(&self, origin: &WireRequest, challenge: &Challenge) -> BoxFuture<'static, ChallengeDisposition> {
        Box::pin(future::ready(self.resolve(origin, challenge)))
    }
}
