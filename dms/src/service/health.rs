use super::Service;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Sick,
}

impl Service {
    /// Check connectivity with the backing store. Never fails.
    pub async fn health(&self) -> Health {
        match self.store().ping().await {
            Ok(()) => Health::Healthy,
            Err(e) => {
                log::warn!("Health probe failed: {e}");
                Health::Sick
            }
        }
    }
}
