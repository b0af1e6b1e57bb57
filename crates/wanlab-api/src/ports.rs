// Port discovery and shaping endpoints
//
// Discovery (`/ports`), batch shaping (`/links/apply_ports_matrix`) and
// batch status (`/links/status_ports`).

use tracing::debug;

use crate::client::LabClient;
use crate::error::Error;
use crate::models::{
    ApplyMatrixRequest, ApplyMatrixResponse, DiscoveredPort, PortRef, PortSetting, StatusMap,
    StatusPortsRequest,
};

impl LabClient {
    /// List every interface of every lab container.
    ///
    /// `GET /ports`
    pub async fn list_ports(&self) -> Result<Vec<DiscoveredPort>, Error> {
        let url = self.url("ports")?;
        debug!("listing ports");
        self.get(url).await
    }

    /// Apply per-port shaping settings in one batch.
    ///
    /// `POST /links/apply_ports_matrix`. The backend rejects an empty batch
    /// with HTTP 400; a `200` with `ok: false` is reported as `Rejected`.
    pub async fn apply_ports_matrix(&self, items: &[PortSetting]) -> Result<usize, Error> {
        let url = self.url("links/apply_ports_matrix")?;
        debug!(count = items.len(), "applying shaping matrix");
        let resp: ApplyMatrixResponse = self.post(url, &ApplyMatrixRequest { items }).await?;
        if !resp.ok {
            return Err(Error::Rejected {
                message: "apply_ports_matrix returned ok=false".into(),
            });
        }
        Ok(resp.count)
    }

    /// Query the qdisc status of the given ports.
    ///
    /// `POST /links/status_ports`. Keys in the result use the cleaned
    /// interface name (`client1:eth0`).
    pub async fn status_ports(&self, ports: &[PortRef]) -> Result<StatusMap, Error> {
        let url = self.url("links/status_ports")?;
        debug!(count = ports.len(), "querying port status");
        self.post(url, &StatusPortsRequest { ports }).await
    }
}
