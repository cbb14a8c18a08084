//! Fire-and-forget progress reporting to the orchestrator (component C5).
//!
//! Grounded on the Python reference's `ReportService`: same endpoint shape,
//! same "log and swallow" failure policy so a flaky orchestrator never blocks
//! the OTA lifecycle, reimplemented with the daemon's blocking `reqwest`
//! client instead of `httpx`.

use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::REPORT_TIMEOUT;
use crate::state::Stage;

#[derive(Serialize)]
struct ReportPayload<'a> {
    stage: Stage,
    progress: u32,
    message: &'a str,
    error: Option<&'a str>,
}

/// POSTs progress updates to `<orchestrator_url>/api/v1.0/ota/report`.
pub struct Reporter {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl Reporter {
    /// Builds a reporter targeting `orchestrator_url`.
    pub fn new(orchestrator_url: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REPORT_TIMEOUT)
            .build()
            .expect("reqwest client should always build with valid defaults");

        Self {
            endpoint: format!("{}/api/v1.0/ota/report", orchestrator_url.trim_end_matches('/')),
            client,
        }
    }

    /// Sends a single progress report. All failures are logged and
    /// swallowed; this never blocks the caller beyond [`REPORT_TIMEOUT`].
    pub fn report(&self, stage: Stage, progress: u32, message: &str, error: Option<&str>) {
        let payload = ReportPayload {
            stage,
            progress,
            message,
            error,
        };

        match self.client.post(&self.endpoint).json(&payload).send() {
            Ok(response) if response.status().is_success() => {
                debug!(progress, "report sent successfully");
            }
            Ok(response) => {
                warn!(status = %response.status(), "orchestrator rejected progress report");
            }
            Err(err) => {
                warn!(error = %err, "failed to report progress to orchestrator, continuing");
            }
        }
    }
}
