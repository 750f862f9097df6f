use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::try_join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::client::CosaClient;
use crate::handle::{Command, CoordinatorHandle};
use crate::types::*;
use crate::{Error, Result};

const COMMAND_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    /// How often the endpoint list itself is re-fetched.
    pub relist_interval: Duration,
    pub cycle_deadline: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            relist_interval: Duration::from_secs(3600),
            cycle_deadline: Duration::from_secs(15),
        }
    }
}

impl CoordinatorConfig {
    /// Number of cycles between endpoint re-lists (360 with defaults).
    pub fn relist_every(&self) -> u32 {
        let poll = self.poll_interval.as_secs_f64();
        if poll <= 0.0 {
            return 1;
        }
        let n = (self.relist_interval.as_secs_f64() / poll).round();
        (n as u32).max(1)
    }
}

/// Owns the endpoint snapshot and drives the list/fetch/reconcile/publish cycle.
///
/// All mutation happens through `&mut self`, so one task owning the
/// coordinator can never run two cycles at once.
pub struct Coordinator {
    pub(crate) client: CosaClient,
    config: CoordinatorConfig,
    endpoint_refs: Vec<EndpointRef>,
    relist_countdown: u32,
    snapshot: watch::Sender<Snapshot>,
    status: watch::Sender<RefreshStatus>,
    commands_tx: mpsc::Sender<Command>,
    commands: mpsc::Receiver<Command>,
}

impl Coordinator {
    pub fn new(client: CosaClient, config: CoordinatorConfig) -> Self {
        let (snapshot, _) = watch::channel(Snapshot::default());
        let (status, _) = watch::channel(RefreshStatus::default());
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        Self {
            client,
            config,
            endpoint_refs: Vec::new(),
            relist_countdown: 0,
            snapshot,
            status,
            commands_tx,
            commands,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(
            self.commands_tx.clone(),
            self.snapshot.subscribe(),
            self.status.subscribe(),
        )
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn client(&self) -> &CosaClient {
        &self.client
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.borrow().clone()
    }

    pub fn endpoint_refs(&self) -> &[EndpointRef] {
        &self.endpoint_refs
    }

    /// Install a fresh token after the user logged in again and lift the halt.
    /// Actions queued while the session was lost are rejected, not replayed.
    pub fn reauthenticate(&mut self, token: impl Into<String>) {
        if self.status.borrow().auth_required {
            self.reject_queued();
        }
        self.client.set_auth_token(token);
        self.status.send_modify(|s| s.auth_required = false);
        debug!("session restored");
    }

    /// Run one refresh cycle. On failure the previous snapshot stays published.
    pub async fn refresh(&mut self) -> Result<()> {
        self.ensure_session()?;

        let deadline = self.config.cycle_deadline;
        let outcome = match tokio::time::timeout(deadline, self.cycle()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        };

        match outcome {
            Ok(endpoints) => {
                debug!(count = endpoints.len(), "refresh cycle published");
                self.publish(endpoints);
                self.status.send_modify(|s| {
                    s.cycles += 1;
                    s.last_update_success = true;
                    s.last_error = None;
                });
                Ok(())
            }
            Err(e) => {
                self.status.send_modify(|s| s.cycles += 1);
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Out-of-band refresh after a write. The outcome lands in `status()`.
    pub(crate) async fn request_refresh(&mut self) {
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "requested refresh failed");
        }
    }

    /// Poll until the session is lost, serving queued actions in between ticks.
    /// Returns the error that ended the session.
    pub async fn run(&mut self) -> Error {
        if let Err(e) = self.ensure_session() {
            self.reject_queued();
            return e;
        }

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await
                        && e.is_auth_failure()
                    {
                        self.reject_queued();
                        return e;
                    }
                }
                Some(command) = self.commands.recv() => {
                    self.dispatch(command).await;
                    ticker.reset();
                    if self.status.borrow().auth_required {
                        self.reject_queued();
                        return Error::ApiAuth;
                    }
                }
            }
        }
    }

    async fn cycle(&mut self) -> Result<Vec<Endpoint>> {
        if self.relist_countdown == 0 {
            let refs = self.client.list_endpoints().await?;
            debug!(count = refs.len(), "endpoint list refreshed");
            self.endpoint_refs = refs;
            self.relist_countdown = self.config.relist_every();
        }
        self.relist_countdown -= 1;

        let client = &self.client;
        let endpoints =
            try_join_all(self.endpoint_refs.iter().map(|r| client.get_endpoint(&r.id))).await?;

        let corrections = endpoints
            .iter()
            .filter(|e| e.mode != Mode::Manual)
            .map(|e| async move {
                debug!(endpoint = %e.id, mode = e.mode.as_cosa_str(), "forcing manual mode");
                if !client.set_mode(&e.id, Mode::Manual, e.option).await? {
                    warn!(endpoint = %e.id, "server did not confirm manual mode");
                }
                Ok::<_, Error>(())
            });
        try_join_all(corrections).await?;

        Ok(endpoints)
    }

    fn publish(&mut self, endpoints: Vec<Endpoint>) {
        let version = self.snapshot.borrow().version + 1;
        self.snapshot.send_replace(Snapshot {
            version,
            endpoints: Arc::new(endpoints),
            updated_at: Some(Utc::now()),
        });
    }

    /// Apply an optimistic edit to one endpoint and publish it at once.
    /// Returns the snapshot it replaced along with the patched endpoint.
    pub(crate) fn publish_patch(
        &mut self,
        endpoint_id: &str,
        patch: impl FnOnce(&mut Endpoint),
    ) -> Result<(Snapshot, Endpoint)> {
        let current = self.snapshot();
        let mut endpoints = (*current.endpoints).clone();
        let endpoint = endpoints
            .iter_mut()
            .find(|e| e.id == endpoint_id)
            .ok_or_else(|| Error::UnknownEndpoint(endpoint_id.to_string()))?;
        patch(endpoint);
        let patched = endpoint.clone();

        self.snapshot.send_replace(Snapshot {
            version: current.version + 1,
            endpoints: Arc::new(endpoints),
            updated_at: current.updated_at,
        });
        Ok((current, patched))
    }

    /// Re-publish the endpoints of an earlier snapshot under a new version.
    pub(crate) fn restore(&mut self, previous: Snapshot) {
        let version = self.snapshot.borrow().version + 1;
        self.snapshot.send_replace(Snapshot {
            version,
            ..previous
        });
    }

    fn reject_queued(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            command.reject(Error::ApiAuth);
        }
    }

    pub(crate) fn endpoint(&self, endpoint_id: &str) -> Result<Endpoint> {
        self.snapshot
            .borrow()
            .endpoint(endpoint_id)
            .cloned()
            .ok_or_else(|| Error::UnknownEndpoint(endpoint_id.to_string()))
    }

    pub(crate) fn ensure_session(&self) -> Result<()> {
        if self.status.borrow().auth_required {
            return Err(Error::ApiAuth);
        }
        Ok(())
    }

    pub(crate) fn record_failure(&mut self, e: &Error) {
        if e.is_auth_failure() {
            error!("session rejected by server, polling halted until re-authentication");
        } else {
            warn!(error = %e, "refresh cycle failed, keeping previous snapshot");
        }
        let auth = e.is_auth_failure();
        let message = e.to_string();
        self.status.send_modify(|s| {
            s.last_update_success = false;
            s.last_error = Some(message);
            s.auth_required |= auth;
        });
    }
}
