// Lab lifecycle endpoints

use tracing::debug;

use crate::client::LabClient;
use crate::error::Error;
use crate::models::{LabInitRequest, LabInitResponse, OkResponse};

impl LabClient {
    /// Create the lab: one server container plus `ports` client containers,
    /// each client on its own network.
    ///
    /// `POST /lab/init`. With `recreate`, the existing lab is torn down first.
    pub async fn init_lab(&self, ports: u32, recreate: bool) -> Result<LabInitResponse, Error> {
        let url = self.url("lab/init")?;
        debug!(ports, recreate, "initialising lab");
        self.post(url, &LabInitRequest { ports, recreate }).await
    }

    /// Remove all lab containers and networks.
    ///
    /// `POST /lab/destroy`
    pub async fn destroy_lab(&self) -> Result<(), Error> {
        let url = self.url("lab/destroy")?;
        debug!("destroying lab");
        let _: OkResponse = self.post(url, &serde_json::json!({})).await?;
        Ok(())
    }

    /// Raw lab inventory (containers, states, interfaces, networks).
    ///
    /// `GET /lab/status`. The shape is informational only and passed
    /// through untyped.
    pub async fn lab_status(&self) -> Result<serde_json::Value, Error> {
        let url = self.url("lab/status")?;
        self.get(url).await
    }

    /// Liveness probe.
    ///
    /// `GET /health`
    pub async fn health(&self) -> Result<bool, Error> {
        let url = self.url("health")?;
        let resp: OkResponse = self.get(url).await?;
        Ok(resp.ok)
    }
}
