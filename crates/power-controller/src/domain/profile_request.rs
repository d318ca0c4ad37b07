//! Extraction of power profile requests from pod specs

use std::collections::BTreeSet;

use api_types::PROFILE_RESOURCE_PREFIX;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::Pod;

use crate::domain::quantity;
use crate::domain::types::ProfilePolicy;
use crate::domain::types::ValidationError;

const GUARANTEED_QOS_CLASS: &str = "Guaranteed";
const CPU_RESOURCE: &str = "cpu";

/// Returns the profile a container requests, if any.
///
/// Profiles are requested as extended resources named
/// `power.example.com/<profile>`. Asking for two of them is an error.
pub fn container_profile(container: &Container) -> Result<Option<String>, ValidationError> {
    let Some(requests) = container
        .resources
        .as_ref()
        .and_then(|resources| resources.requests.as_ref())
    else {
        return Ok(None);
    };

    let mut profile = None;
    for resource in requests.keys() {
        let Some(name) = resource.strip_prefix(PROFILE_RESOURCE_PREFIX) else {
            continue;
        };
        if profile.is_some() {
            return Err(ValidationError::MultipleProfilesInContainer {
                container: container.name.clone(),
            });
        }
        profile = Some(name.to_string());
    }

    Ok(profile)
}

/// Enforces the pod-wide profile policy over the per-container profiles.
pub fn check_pod_profiles<'a>(
    profiles: impl IntoIterator<Item = &'a str>,
    policy: ProfilePolicy,
) -> Result<(), ValidationError> {
    if policy == ProfilePolicy::PerContainer {
        return Ok(());
    }

    let distinct: BTreeSet<&str> = profiles.into_iter().collect();
    if distinct.len() > 1 {
        return Err(ValidationError::MultipleProfilesInPod {
            profiles: distinct.into_iter().map(str::to_string).collect(),
        });
    }
    Ok(())
}

/// Containers of `pod` eligible for exclusive CPUs.
///
/// Only pods in the Guaranteed QoS class get pinned, and only containers
/// whose CPU request is a whole number of cores. Init containers come first.
pub fn exclusive_cpu_containers(pod: &Pod) -> Vec<&Container> {
    let guaranteed = pod
        .status
        .as_ref()
        .and_then(|status| status.qos_class.as_deref())
        == Some(GUARANTEED_QOS_CLASS);
    if !guaranteed {
        return Vec::new();
    }

    let Some(spec) = pod.spec.as_ref() else {
        return Vec::new();
    };

    spec.init_containers
        .iter()
        .flatten()
        .chain(spec.containers.iter())
        .filter(|container| requests_whole_cpus(container))
        .collect()
}

fn requests_whole_cpus(container: &Container) -> bool {
    container
        .resources
        .as_ref()
        .and_then(|resources| resources.requests.as_ref())
        .and_then(|requests| requests.get(CPU_RESOURCE))
        .and_then(|cpu| quantity::whole_cpus(&cpu.0))
        .is_some_and(|cpus| cpus > 0)
}

/// Runtime ID of a container with the `<runtime>://` prefix removed.
///
/// Empty when the kubelet has not reported the container yet.
pub fn container_id(pod: &Pod, container_name: &str) -> String {
    let Some(status) = pod.status.as_ref() else {
        return String::new();
    };

    status
        .init_container_statuses
        .iter()
        .flatten()
        .chain(status.container_statuses.iter().flatten())
        .find(|container| container.name == container_name)
        .and_then(|container| container.container_id.as_deref())
        .map(|id| match id.split_once("://") {
            Some((_, id)) => id.to_string(),
            None => id.to_string(),
        })
        .unwrap_or_default()
}
