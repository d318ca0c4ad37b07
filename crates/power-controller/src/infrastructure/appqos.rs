//! HTTP client of the per-node AppQoS service

use std::time::Duration;

use api_types::PowerProfile;
use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;

use crate::domain::traits::ProfileClient;
use crate::domain::traits::ServiceError;

const POWER_PROFILES_PATH: &str = "/power_profiles";

#[derive(Debug, derive_more::Display)]
pub enum AppQosError {
    #[display("Failed to build AppQoS HTTP client")]
    ClientBuild,
    #[display("AppQoS request to {url} failed: {message}")]
    RequestFailed { url: String, message: String },
    #[display("AppQoS at {url} answered {status}")]
    UnexpectedStatus { url: String, status: u16 },
}

impl core::error::Error for AppQosError {}

impl From<Report<AppQosError>> for ServiceError {
    fn from(report: Report<AppQosError>) -> Self {
        ServiceError::unavailable(report.to_string())
    }
}

/// Looks up power profiles through `GET <address>/power_profiles`.
#[derive(Clone)]
pub struct AppQosClient {
    http: reqwest::Client,
}

impl AppQosClient {
    /// `accept_invalid_certs` is for AppQoS instances serving self-signed certificates.
    pub fn new(
        accept_invalid_certs: bool,
        timeout: Duration,
    ) -> Result<Self, Report<AppQosError>> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .change_context(AppQosError::ClientBuild)?;
        Ok(Self { http })
    }

    async fn list_profiles(
        &self,
        node_address: &str,
    ) -> Result<Vec<PowerProfile>, Report<AppQosError>> {
        let url = format!(
            "{}{POWER_PROFILES_PATH}",
            node_address.trim_end_matches('/')
        );
        let failed = |message: String| AppQosError::RequestFailed {
            url: url.clone(),
            message,
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Report::new(failed(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Report::new(AppQosError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            }));
        }

        let profiles: Vec<PowerProfile> = response
            .json()
            .await
            .map_err(|e| Report::new(failed(format!("invalid body: {e}"))))?;
        debug!(url = %url, count = profiles.len(), "Fetched power profiles");
        Ok(profiles)
    }
}

/// The profile named `name`, if listed.
fn find_profile(profiles: Vec<PowerProfile>, name: &str) -> Option<PowerProfile> {
    profiles
        .into_iter()
        .find(|profile| profile.name.as_deref() == Some(name))
}

#[async_trait]
impl ProfileClient for AppQosClient {
    async fn get_profile(
        &self,
        name: &str,
        node_address: &str,
    ) -> Result<Option<PowerProfile>, ServiceError> {
        let profiles = self.list_profiles(node_address).await?;
        Ok(find_profile(profiles, name))
    }
}
