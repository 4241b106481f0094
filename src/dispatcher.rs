//! Backend selection, per-backend capacity, and timeout enforcement.
//!
//! One execution path regardless of backend: acquire the backend's pool slot,
//! run the adapter under a deadline, return the classified result. No retries
//! live here; retry policy belongs to callers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::DispatchError;
use crate::ocr::{BackendKind, OcrBackend, Recognition};
use crate::validator::DecodedImage;

/// One backend with its independent capacity and deadline. Exhaustion of one
/// lane never affects the other.
struct Lane {
    backend: Arc<dyn OcrBackend>,
    pool: Semaphore,
    deadline: Duration,
}

pub struct Dispatcher {
    local: Lane,
    cloud: Lane,
}

impl Dispatcher {
    pub fn new(settings: &Settings, local: Arc<dyn OcrBackend>, cloud: Arc<dyn OcrBackend>) -> Self {
        Self {
            local: Lane {
                backend: local,
                pool: Semaphore::new(settings.local_concurrency),
                deadline: settings.local_timeout,
            },
            cloud: Lane {
                backend: cloud,
                pool: Semaphore::new(settings.cloud_concurrency),
                deadline: settings.cloud_timeout,
            },
        }
    }

    fn lane(&self, kind: BackendKind) -> &Lane {
        match kind {
            BackendKind::Local => &self.local,
            BackendKind::Cloud => &self.cloud,
        }
    }

    pub fn is_available(&self, kind: BackendKind) -> bool {
        self.lane(kind).backend.is_available()
    }

    /// Route a prepared image to the selected backend.
    ///
    /// Pool exhaustion fails immediately instead of queueing; a call that
    /// outlives the lane deadline is dropped (the local child process is
    /// killed, the cloud request aborted) and reported as that backend's
    /// timeout class.
    pub async fn dispatch(
        &self,
        image: &DecodedImage,
        kind: BackendKind,
    ) -> Result<Recognition, DispatchError> {
        let lane = self.lane(kind);

        let _permit = match lane.pool.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(backend = %kind, "backend pool exhausted");
                return Err(match kind {
                    BackendKind::Local => DispatchError::EngineUnavailable(
                        "local OCR engine is at capacity, try again shortly".into(),
                    ),
                    BackendKind::Cloud => DispatchError::QuotaExceeded(
                        "cloud recognition concurrency limit reached, try again shortly".into(),
                    ),
                });
            }
        };

        debug!(backend = %kind, deadline_secs = lane.deadline.as_secs(), "dispatching recognition");
        match timeout(lane.deadline, lane.backend.recognize(image)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(backend = %kind, deadline_secs = lane.deadline.as_secs(), "recognition timed out");
                Err(match kind {
                    BackendKind::Local => DispatchError::EngineUnavailable(format!(
                        "local OCR engine did not finish within {}s",
                        lane.deadline.as_secs()
                    )),
                    BackendKind::Cloud => DispatchError::NetworkFailure(format!(
                        "cloud recognition service did not respond within {}s",
                        lane.deadline.as_secs()
                    )),
                })
            }
        }
    }
}
