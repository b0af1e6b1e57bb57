// Diagnostic tool endpoints

use tracing::debug;

use crate::client::LabClient;
use crate::error::Error;
use crate::models::{PingRequest, PingResponse};

/// Counts the backend accepts; anything outside is clamped server-side too.
pub const PING_COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

impl LabClient {
    /// Run `ping` from inside the `source` container towards `target`.
    ///
    /// `POST /tools/ping`. A non-zero exit code is not an error here: the
    /// raw output is returned with `ok = false`.
    pub async fn ping(&self, source: &str, target: &str, count: u32) -> Result<PingResponse, Error> {
        let url = self.url("tools/ping")?;
        let count = count.clamp(*PING_COUNT_RANGE.start(), *PING_COUNT_RANGE.end());
        debug!(source, target, count, "running ping");
        self.post(
            url,
            &PingRequest {
                source,
                target,
                count,
                size: None,
            },
        )
        .await
    }
}
