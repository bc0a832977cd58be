//! Seams between the agent and the browser it runs in

use crate::error::SurfaceError;
use crate::rules::RuleSet;
use async_trait::async_trait;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};

/// Browser-assigned page (tab) identifier
pub type PageId = u64;

/// The browser the agent enforces in
#[async_trait]
pub trait BrowserSurface: Send + Sync {
    /// Which browser this is (`chrome`, `firefox`, ...)
    fn agent_kind(&self) -> &str;

    /// Replace the installed redirect rules
    async fn apply_rules(&self, rules: &RuleSet) -> Result<(), SurfaceError>;

    /// Send a page somewhere else
    async fn redirect(&self, page: PageId, url: &str) -> Result<(), SurfaceError>;

    async fn close(&self, page: PageId) -> Result<(), SurfaceError>;

    async fn window_count(&self) -> u32;

    /// Whether the user has allowed the agent into private windows
    async fn incognito_allowed(&self) -> bool;
}

/// Opens a fresh duplex stream to the bridge
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn connect(&self) -> io::Result<Self::Stream>;
}

/// In-memory surface that records what it was asked to do
#[derive(Debug, Default)]
pub struct MemorySurface {
    kind: String,
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryState {
    pub applied: Vec<RuleSet>,
    pub redirects: Vec<(PageId, String)>,
    pub closed: Vec<PageId>,
    pub windows: u32,
    pub incognito_allowed: bool,
    pub refuse_redirects: bool,
    pub refuse_rules: u32,
}

impl MemorySurface {
    pub fn new(kind: impl Into<String>) -> Self {
        MemorySurface {
            kind: kind.into(),
            state: Mutex::new(MemoryState {
                windows: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> MemoryState {
        self.lock().clone()
    }

    pub fn set_refuse_redirects(&self, refuse: bool) {
        self.lock().refuse_redirects = refuse;
    }

    /// Reject the next `count` rule installs
    pub fn refuse_next_rules(&self, count: u32) {
        self.lock().refuse_rules = count;
    }

    pub fn set_incognito_allowed(&self, allowed: bool) {
        self.lock().incognito_allowed = allowed;
    }
}

#[async_trait]
impl BrowserSurface for MemorySurface {
    fn agent_kind(&self) -> &str {
        &self.kind
    }

    async fn apply_rules(&self, rules: &RuleSet) -> Result<(), SurfaceError> {
        let mut state = self.lock();
        if state.refuse_rules > 0 {
            state.refuse_rules -= 1;
            return Err(SurfaceError::Refused("rule install rejected".into()));
        }
        state.applied.push(rules.clone());
        Ok(())
    }

    async fn redirect(&self, page: PageId, url: &str) -> Result<(), SurfaceError> {
        let mut state = self.lock();
        if state.refuse_redirects {
            return Err(SurfaceError::Refused("redirect blocked by browser".into()));
        }
        state.redirects.push((page, url.to_string()));
        Ok(())
    }

    async fn close(&self, page: PageId) -> Result<(), SurfaceError> {
        self.lock().closed.push(page);
        Ok(())
    }

    async fn window_count(&self) -> u32 {
        self.lock().windows
    }

    async fn incognito_allowed(&self) -> bool {
        self.lock().incognito_allowed
    }
}
