//! Scripted identity backend for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pamgate_core::Secret;

use super::backend::{BackendError, BackendSession, ExternalIdentity, IdentityBackend};

/// Call counters shared between a backend and its sessions.
#[derive(Debug, Default)]
pub struct Counters {
    opens: AtomicUsize,
    authenticates: AtomicUsize,
    releases: AtomicUsize,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn authenticates(&self) -> usize {
        self.authenticates.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Account known to the scripted backend.
#[derive(Debug, Clone)]
pub struct Account {
    principal: String,
    secret: String,
    canonical: String,
    groups: Vec<String>,
}

impl Account {
    pub fn new<I, S>(principal: &str, secret: &str, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            principal: principal.to_string(),
            secret: secret.to_string(),
            canonical: principal.to_string(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    /// Username the backend reports instead of the typed principal.
    pub fn canonical(mut self, name: &str) -> Self {
        self.canonical = name.to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Behaviour {
    fail_open: bool,
    panic_on_auth: bool,
    fail_release: bool,
    delay: Option<Duration>,
}

/// Backend answering from a fixed account list and counting every call.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    accounts: Arc<HashMap<String, Account>>,
    behaviour: Behaviour,
    counters: Arc<Counters>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: Account) -> Self {
        Arc::make_mut(&mut self.accounts).insert(account.principal.clone(), account);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.behaviour.fail_open = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behaviour.panic_on_auth = true;
        self
    }

    pub fn failing_release(mut self) -> Self {
        self.behaviour.fail_release = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.behaviour.delay = Some(delay);
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl IdentityBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open_session(&self) -> Result<Box<dyn BackendSession>, BackendError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if self.behaviour.fail_open {
            return Err(BackendError::Unavailable("simulated outage".to_string()));
        }

        Ok(Box::new(ScriptedSession {
            accounts: Arc::clone(&self.accounts),
            behaviour: self.behaviour,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct ScriptedSession {
    accounts: Arc<HashMap<String, Account>>,
    behaviour: Behaviour,
    counters: Arc<Counters>,
}

impl BackendSession for ScriptedSession {
    fn authenticate(
        &mut self,
        principal: &str,
        secret: &Secret,
    ) -> Result<ExternalIdentity, BackendError> {
        self.counters.authenticates.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.behaviour.delay {
            std::thread::sleep(delay);
        }
        if self.behaviour.panic_on_auth {
            panic!("scripted backend failure");
        }

        match self.accounts.get(principal) {
            Some(account) if account.secret == secret.expose() => Ok(ExternalIdentity::new(
                account.canonical.clone(),
                account.groups.clone(),
            )),
            _ => Err(BackendError::Rejected("Authentication failure".to_string())),
        }
    }

    fn release(&mut self) -> Result<(), BackendError> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        if self.behaviour.fail_release {
            return Err(BackendError::Release("simulated close failure".to_string()));
        }
        Ok(())
    }
}
