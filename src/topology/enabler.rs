use thiserror::Error;
use tracing::info;

use crate::data_aquisition::core::{CommitStatus, DeviceSession, SessionError};

pub const ENABLE_LLDP_COMMAND: &str = "set protocols lldp interface all";

#[derive(Debug, Error)]
pub enum EnablementError {
    #[error("LLDP could not get enabled: {0}")]
    Rejected(String),
    #[error("LLDP could not get enabled: {0}")]
    Session(#[from] SessionError),
}

/// Turn on LLDP for every interface and commit. Re-applying on a device that already runs LLDP is harmless.
pub async fn enable_lldp<S>(device: &mut S) -> Result<(), EnablementError>
where
    S: DeviceSession + ?Sized,
{
    match device.load_and_commit(ENABLE_LLDP_COMMAND).await? {
        CommitStatus::Committed => {
            info!("Successfully enabled LLDP!");
            Ok(())
        }
        CommitStatus::Rejected(reason) => Err(EnablementError::Rejected(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::testing::MockDevice;

    #[tokio::test]
    async fn test_enable_lldp_commits_set_command() {
        let mut device = MockDevice::new("R1");
        enable_lldp(&mut device).await.unwrap();
        assert_eq!(device.log.committed(), vec![ENABLE_LLDP_COMMAND.to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_commit() {
        let mut device = MockDevice::new("R1").reject_commit("configuration database locked");
        let err = enable_lldp(&mut device).await.unwrap_err();
        assert!(matches!(err, EnablementError::Rejected(ref r) if r.contains("locked")));
    }

    #[tokio::test]
    async fn test_session_failure_during_commit() {
        let mut device = MockDevice::new("R1").fail_commit();
        let err = enable_lldp(&mut device).await.unwrap_err();
        assert!(matches!(err, EnablementError::Session(_)));
    }
}
