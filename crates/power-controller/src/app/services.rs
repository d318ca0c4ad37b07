use std::sync::Arc;

use crate::domain::PodStateStore;
use crate::infrastructure::k8s::controller::PowerPodController;

/// Application dependencies - simple struct with Arc-wrapped services
pub struct ApplicationServices {
    pub pod_state: Arc<PodStateStore>,
    pub controller: Arc<PowerPodController>,
}
