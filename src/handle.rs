use tokio::sync::{mpsc, oneshot, watch};

use crate::coordinator::Coordinator;
use crate::types::*;
use crate::{Error, Result};

type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Command {
    Refresh(Reply<()>),
    SetTargetTemperature {
        endpoint_id: String,
        temperature: Temperature,
        reply: Reply<bool>,
    },
    SelectPreset {
        endpoint_id: String,
        choice: PresetChoice,
        reply: Reply<bool>,
    },
    SetHvacMode {
        endpoint_id: String,
        mode: HvacMode,
        reply: Reply<bool>,
    },
    SetCalibration {
        endpoint_id: String,
        calibration: f64,
        reply: Reply<bool>,
    },
    SetPidWindow {
        endpoint_id: String,
        overrides: PidWindowOverrides,
        reply: Reply<bool>,
    },
}

/// Cloneable front door for presentation code: reads published snapshots
/// and queues actions for the task running [`Coordinator::run`].
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    status: watch::Receiver<RefreshStatus>,
}

impl CoordinatorHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshot: watch::Receiver<Snapshot>,
        status: watch::Receiver<RefreshStatus>,
    ) -> Self {
        Self {
            commands,
            snapshot,
            status,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.borrow().clone()
    }

    pub async fn request_refresh(&self) -> Result<()> {
        self.call(Command::Refresh).await
    }

    pub async fn set_target_temperature(
        &self,
        endpoint_id: impl Into<String>,
        temperature: Temperature,
    ) -> Result<bool> {
        let endpoint_id = endpoint_id.into();
        self.call(|reply| Command::SetTargetTemperature {
            endpoint_id,
            temperature,
            reply,
        })
        .await
    }

    pub async fn select_preset(
        &self,
        endpoint_id: impl Into<String>,
        choice: PresetChoice,
    ) -> Result<bool> {
        let endpoint_id = endpoint_id.into();
        self.call(|reply| Command::SelectPreset {
            endpoint_id,
            choice,
            reply,
        })
        .await
    }

    pub async fn set_hvac_mode(
        &self,
        endpoint_id: impl Into<String>,
        mode: HvacMode,
    ) -> Result<bool> {
        let endpoint_id = endpoint_id.into();
        self.call(|reply| Command::SetHvacMode {
            endpoint_id,
            mode,
            reply,
        })
        .await
    }

    pub async fn set_calibration(
        &self,
        endpoint_id: impl Into<String>,
        calibration: f64,
    ) -> Result<bool> {
        let endpoint_id = endpoint_id.into();
        self.call(|reply| Command::SetCalibration {
            endpoint_id,
            calibration,
            reply,
        })
        .await
    }

    pub async fn set_pid_window(
        &self,
        endpoint_id: impl Into<String>,
        overrides: PidWindowOverrides,
    ) -> Result<bool> {
        let endpoint_id = endpoint_id.into();
        self.call(|reply| Command::SetPidWindow {
            endpoint_id,
            overrides,
            reply,
        })
        .await
    }

    /// Fails fast with `ApiAuth` while the session is lost; nothing would
    /// answer a queued action until the host re-authenticates.
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        if self.status.borrow().auth_required {
            return Err(Error::ApiAuth);
        }
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::Stopped)?;
        rx.await.map_err(|_| Error::Stopped)?
    }
}

impl Command {
    /// Answer without executing.
    pub(crate) fn reject(self, e: Error) {
        match self {
            Command::Refresh(reply) => {
                let _ = reply.send(Err(e));
            }
            Command::SetTargetTemperature { reply, .. }
            | Command::SelectPreset { reply, .. }
            | Command::SetHvacMode { reply, .. }
            | Command::SetCalibration { reply, .. }
            | Command::SetPidWindow { reply, .. } => {
                let _ = reply.send(Err(e));
            }
        }
    }
}

impl Coordinator {
    pub(crate) async fn dispatch(&mut self, command: Command) {
        // A dropped receiver only means the caller stopped waiting.
        match command {
            Command::Refresh(reply) => {
                let _ = reply.send(self.refresh().await);
            }
            Command::SetTargetTemperature {
                endpoint_id,
                temperature,
                reply,
            } => {
                let result = self.set_target_temperature(&endpoint_id, temperature).await;
                let _ = reply.send(result);
            }
            Command::SelectPreset {
                endpoint_id,
                choice,
                reply,
            } => {
                let _ = reply.send(self.select_preset(&endpoint_id, choice).await);
            }
            Command::SetHvacMode {
                endpoint_id,
                mode,
                reply,
            } => {
                let _ = reply.send(self.set_hvac_mode(&endpoint_id, mode).await);
            }
            Command::SetCalibration {
                endpoint_id,
                calibration,
                reply,
            } => {
                let _ = reply.send(self.set_calibration(&endpoint_id, calibration).await);
            }
            Command::SetPidWindow {
                endpoint_id,
                overrides,
                reply,
            } => {
                let _ = reply.send(self.set_pid_window(&endpoint_id, overrides).await);
            }
        }
    }
}
