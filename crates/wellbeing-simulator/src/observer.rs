//! Status observer that writes the live feed to the log

use log::{debug, info};

use wellbeing_core::{ObserverError, PumpStatus, StatusObserver, StatusUpdate};

/// Logs every update as the JSON payload a web socket client would receive.
/// Status changes are logged at `info`, the rest at `debug`.
#[derive(Default)]
pub struct LogObserver {
    last_status: Option<PumpStatus>,
}

impl LogObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusObserver for LogObserver {
    fn deliver(&mut self, update: &StatusUpdate) -> Result<(), ObserverError> {
        let payload = serde_json::to_string(update).map_err(|_| ObserverError::Rejected)?;
        if self.last_status == Some(update.status) {
            debug!(" {}", payload);
        } else {
            info!(" {}", payload);
        }
        self.last_status = Some(update.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let update = StatusUpdate {
            status: PumpStatus::Fault,
            amps: 0.5,
        };
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"status":"FAULT","amps":0.5}"#
        );
    }

    #[test]
    fn test_tracks_last_status() {
        let mut observer = LogObserver::new();
        let update = StatusUpdate {
            status: PumpStatus::On,
            amps: 4.2,
        };

        observer.deliver(&update).unwrap();

        assert_eq!(observer.last_status, Some(PumpStatus::On));
    }
}
