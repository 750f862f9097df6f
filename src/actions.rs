use tracing::debug;

use crate::coordinator::Coordinator;
use crate::types::*;
use crate::Result;

// Every action: validate, patch and publish the snapshot optimistically,
// write to the cloud, then refresh so server truth overrides the patch.

impl Coordinator {
    /// Change the target of the preset that is currently active.
    /// Returns `Ok(false)` without writing when that preset has no target slot.
    pub async fn set_target_temperature(
        &mut self,
        endpoint_id: &str,
        temperature: Temperature,
    ) -> Result<bool> {
        self.ensure_session()?;
        let temperature = temperature.check_bounds()?;
        let current = self.endpoint(endpoint_id)?;

        let Some(overrides) = TargetTemperatureOverrides::for_preset(current.option, temperature)
        else {
            debug!(
                endpoint = endpoint_id,
                option = current.option.as_cosa_str(),
                "active option has no adjustable target"
            );
            return Ok(false);
        };

        let (previous, patched) = self.publish_patch(endpoint_id, |e| {
            let option = e.option;
            if let Some(slot) = e.preset_slot_mut(option) {
                *slot = temperature;
            }
            e.target_temperature = Some(temperature);
        })?;

        let written = self.client.set_target_temperatures(&patched, overrides).await;
        self.finish_write(previous, written).await
    }

    pub async fn select_preset(&mut self, endpoint_id: &str, choice: PresetChoice) -> Result<bool> {
        self.ensure_session()?;
        let current = self.endpoint(endpoint_id)?;
        let preset = choice.to_preset();
        let target = current.preset_temperature(preset);

        let (previous, _) = self.publish_patch(endpoint_id, |e| {
            if preset == Preset::Frozen && e.option != Preset::Frozen {
                e.previous_option = Some(e.option);
            }
            e.option = preset;
            e.target_temperature = target;
        })?;

        let written = self.client.set_option(endpoint_id, preset).await;
        self.finish_write(previous, written).await
    }

    /// `Off` freezes the endpoint; `Heat` resumes the option it had before.
    pub async fn set_hvac_mode(&mut self, endpoint_id: &str, mode: HvacMode) -> Result<bool> {
        let choice = match mode {
            HvacMode::Off => PresetChoice::Off,
            HvacMode::Heat => self
                .endpoint(endpoint_id)?
                .previous_option
                .and_then(PresetChoice::from_preset)
                .filter(|c| *c != PresetChoice::Off)
                .unwrap_or(PresetChoice::Home),
        };
        self.select_preset(endpoint_id, choice).await
    }

    pub async fn set_calibration(&mut self, endpoint_id: &str, calibration: f64) -> Result<bool> {
        self.ensure_session()?;
        let calibration = check_range("calibration", calibration, CALIBRATION_RANGE)?;
        let calibration = round_tenths(calibration);

        let (previous, _) = self.publish_patch(endpoint_id, |e| e.calibration = Some(calibration))?;

        let written = self.client.set_device_settings(endpoint_id, calibration).await;
        self.finish_write(previous, written).await
    }

    pub async fn set_pid_window(
        &mut self,
        endpoint_id: &str,
        mut overrides: PidWindowOverrides,
    ) -> Result<bool> {
        self.ensure_session()?;
        if let Some(low) = overrides.low {
            let low = check_range("pidWindowLow", low, PID_WINDOW_LOW_RANGE)?;
            overrides.low = Some(round_tenths(low));
        }
        if let Some(high) = overrides.high {
            let high = check_range("pidWindowHigh", high, PID_WINDOW_HIGH_RANGE)?;
            overrides.high = Some(round_tenths(high));
        }
        let settings = overrides.resolve(&self.endpoint(endpoint_id)?)?;

        let (previous, patched) =
            self.publish_patch(endpoint_id, |e| e.combi_settings = Some(settings))?;

        let written = self.client.set_combi_settings(&patched, overrides).await;
        self.finish_write(previous, written).await
    }

    /// A lost session means no reconcile refresh will come, so the
    /// optimistic patch is rolled back instead.
    async fn finish_write(&mut self, previous: Snapshot, written: Result<bool>) -> Result<bool> {
        match written {
            Err(e) if e.is_auth_failure() => {
                self.restore(previous);
                self.record_failure(&e);
                Err(e)
            }
            written => {
                self.request_refresh().await;
                written
            }
        }
    }
}
