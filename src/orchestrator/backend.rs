use crate::search::{SearchClient, SearchError, SearchParams, SearchResults};
use crate::session::{SessionSupervisor, TransportError};
use crate::Result;
use async_trait::async_trait;

/// Abstract classification of a failed unit fetch
///
/// The orchestrator's retry logic branches on exactly these four kinds;
/// mapping from concrete library errors happens below, at the adapter
/// boundary.
#[derive(Debug)]
pub enum UnitError {
    /// The session/transport context is unusable; recovered locally by
    /// rebuilding the context and re-running login
    TransportLost(String),

    /// Backend-auth refresh exhausted; recurrence is fatal for the sweep
    SessionRefresh(String),

    /// Definitive non-auth rejection from the backend; the unit is marked
    /// failed and the sweep moves on (until the streak threshold)
    BackendUnavailable { status: u16, body: String },

    /// Unclassified; never assumed safe to skip
    Other(String),
}

impl From<SearchError> for UnitError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Transport(transport) if transport.is_context_lost() => {
                Self::TransportLost(transport.to_string())
            }
            SearchError::SessionRefresh(message) => Self::SessionRefresh(message),
            SearchError::BackendUnavailable { status, body } => {
                Self::BackendUnavailable { status, body }
            }
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<TransportError> for UnitError {
    fn from(err: TransportError) -> Self {
        if err.is_context_lost() {
            Self::TransportLost(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Seam between the orchestrator and the session machinery
///
/// The live implementation wires the supervisor and search client; tests
/// drive the retry logic with scripted classified errors instead.
#[async_trait]
pub trait SearchBackend {
    /// Ensures an authenticated session exists before a unit begins.
    /// Login failures (account lock, handshake timeout) surface here with
    /// their own taxonomy, before any run row is created.
    async fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    async fn fetch_properties(
        &mut self,
        params: &SearchParams,
    ) -> std::result::Result<SearchResults, UnitError>;

    /// Tears down the current session and builds a fresh authenticated one.
    /// Errors here (account lock, handshake timeout) are fatal for the
    /// sweep and propagate unchanged.
    async fn rebuild_session(&mut self) -> Result<()>;
}

/// Production backend: one supervisor-owned session, one search client
pub struct LiveBackend {
    supervisor: SessionSupervisor,
    client: Option<SearchClient>,
    warmup_enabled: bool,
}

impl LiveBackend {
    pub fn new(supervisor: SessionSupervisor, warmup_enabled: bool) -> Self {
        Self {
            supervisor,
            client: None,
            warmup_enabled,
        }
    }

    /// Builds (context + login + client) lazily, so fully-resumed sweeps
    /// never open a session at all
    async fn ensure_client(&mut self) -> Result<&mut SearchClient> {
        if self.client.is_none() {
            let mut context = self.supervisor.new_context()?;
            self.supervisor.login(&mut context).await?;
            self.client = Some(SearchClient::new(context, self.warmup_enabled));
        }
        Ok(self.client.as_mut().expect("client just ensured"))
    }
}

#[async_trait]
impl SearchBackend for LiveBackend {
    async fn prepare(&mut self) -> Result<()> {
        self.ensure_client().await?;
        Ok(())
    }

    async fn fetch_properties(
        &mut self,
        params: &SearchParams,
    ) -> std::result::Result<SearchResults, UnitError> {
        let client = match self.ensure_client().await {
            Ok(client) => client,
            // Transport loss during setup is still recoverable via rebuild.
            Err(crate::SweepError::Transport(e)) => return Err(e.into()),
            Err(other) => return Err(UnitError::Other(other.to_string())),
        };
        client.fetch_properties(params).await.map_err(UnitError::from)
    }

    async fn rebuild_session(&mut self) -> Result<()> {
        self.client = None;
        self.ensure_client().await?;
        Ok(())
    }
}
