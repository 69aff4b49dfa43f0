use std::sync::Arc;

use research_logging::research_warn;

use crate::ResearchService;

/// One-shot reachability check. No retries; callers poll on demand.
#[derive(Clone)]
pub struct HealthMonitor {
    service: Arc<dyn ResearchService>,
}

impl HealthMonitor {
    pub fn new(service: Arc<dyn ResearchService>) -> Self {
        Self { service }
    }

    /// True when `GET /health` answers with a success status and a health body.
    pub async fn check(&self) -> bool {
        match self.service.health().await {
            Ok(_) => true,
            Err(err) => {
                research_warn!("Research service unreachable: {}", err);
                false
            }
        }
    }
}
