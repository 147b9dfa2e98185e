//! Device control channel
//!
//! The dashboard edits the lamp schedule; the merged schedule is published to
//! the device on the `setting` topic through a [`ControlChannel`].

use crate::error::ComputeError;
use crate::types::{LightSchedule, Measurement, SchedulePatch};

/// Topic the device listens on for schedule updates
pub const SETTING_TOPIC: &str = "setting";

/// Publish side of the message transport to the device
pub trait ControlChannel {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), ComputeError>;
}

/// A message handed to a control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

/// In-memory channel that records every published message
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<OutboundMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[OutboundMessage] {
        &self.messages
    }

    /// Take all recorded messages, oldest first
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.messages)
    }
}

impl ControlChannel for Outbox {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), ComputeError> {
        Measurement::from_topic(topic).map_err(|e| ComputeError::Publish(e.to_string()))?;
        self.messages.push(OutboundMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

impl LightSchedule {
    /// Apply a patch over the current schedule.
    ///
    /// Each field takes the patch value when present (zero included), then the
    /// current value, then zero.
    pub fn merge(current: Option<&LightSchedule>, patch: &SchedulePatch) -> LightSchedule {
        let base = current.copied().unwrap_or_default();
        LightSchedule {
            light_on_hour: patch.light_on_hour.unwrap_or(base.light_on_hour),
            light_on_min: patch.light_on_min.unwrap_or(base.light_on_min),
            light_off_hour: patch.light_off_hour.unwrap_or(base.light_off_hour),
            light_off_min: patch.light_off_min.unwrap_or(base.light_off_min),
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        for (name, hour) in [
            ("lightOnHour", self.light_on_hour),
            ("lightOffHour", self.light_off_hour),
        ] {
            if hour >= 24 {
                return Err(ComputeError::InvalidSchedule(format!(
                    "{name} must be below 24, got {hour}"
                )));
            }
        }
        for (name, minute) in [
            ("lightOnMin", self.light_on_min),
            ("lightOffMin", self.light_off_min),
        ] {
            if minute >= 60 {
                return Err(ComputeError::InvalidSchedule(format!(
                    "{name} must be below 60, got {minute}"
                )));
            }
        }
        Ok(())
    }

    /// `HH:MM` rendering of the on and off times
    pub fn formatted(&self) -> (String, String) {
        (
            format!("{:02}:{:02}", self.light_on_hour, self.light_on_min),
            format!("{:02}:{:02}", self.light_off_hour, self.light_off_min),
        )
    }
}
