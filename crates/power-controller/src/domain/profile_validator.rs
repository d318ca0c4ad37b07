use std::time::Duration;

use api_types::PowerProfile;
use tracing::debug;

use crate::domain::traits::ProfileClient;
use crate::domain::types::ReconcileError;
use crate::domain::types::ValidationError;

/// Confirms that `profile` exists on the AppQoS instance at `node_address`.
///
/// A missing profile and the empty profile AppQoS returns for unknown names
/// are both validation failures. Transport errors and timeouts are transient.
pub async fn validate_profile<C>(
    client: &C,
    profile: &str,
    node_name: &str,
    node_address: &str,
    timeout: Duration,
) -> Result<PowerProfile, ReconcileError>
where
    C: ProfileClient + ?Sized,
{
    let lookup = tokio::time::timeout(timeout, client.get_profile(profile, node_address))
        .await
        .map_err(|_| {
            ReconcileError::transient(format!(
                "timed out looking up power profile '{profile}' at {node_address}"
            ))
        })?
        .map_err(|e| {
            ReconcileError::transient(format!(
                "failed to look up power profile '{profile}' at {node_address}: {e}"
            ))
        })?;

    match lookup {
        Some(found) if !found.is_empty() => {
            debug!(profile = %profile, node = %node_name, "Power profile validated");
            Ok(found)
        }
        _ => Err(ValidationError::UnknownProfile {
            profile: profile.to_string(),
            node: node_name.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mock::MockProfileClient;

    const ADDRESS: &str = "https://10.0.0.1:5000";

    #[tokio::test]
    async fn known_profile_passes() {
        let client = MockProfileClient::new();
        client.add_profile(ADDRESS, "performance");

        let profile = validate_profile(&client, "performance", "node-1", ADDRESS, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(profile.name.as_deref(), Some("performance"));
    }

    #[tokio::test]
    async fn missing_and_empty_profiles_are_validation_errors() {
        let client = MockProfileClient::new();
        client.add_empty_profile(ADDRESS, "ghost");

        for name in ["absent", "ghost"] {
            let err = validate_profile(&client, name, "node-1", ADDRESS, Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    ReconcileError::Validation(ValidationError::UnknownProfile { ref profile, .. })
                        if profile == name
                ),
                "unexpected error: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn service_failure_is_retryable() {
        let client = MockProfileClient::new();
        client.set_error_mode(true);

        let err = validate_profile(&client, "performance", "node-1", ADDRESS, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Transient { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let client = MockProfileClient::new();
        client.add_profile(ADDRESS, "performance");
        client.set_delay(Duration::from_millis(200));

        let err = validate_profile(&client, "performance", "node-1", ADDRESS, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Transient { .. }));
    }
}
