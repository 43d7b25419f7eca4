use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::errors::DashboardResult;
use crate::layout::{discover_from_source, LayoutSnapshot};
use crate::sheets::{SheetSource, SheetTarget};

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<LayoutSnapshot>>,
    /// `None` once invalidated, so the next read refreshes while the old
    /// snapshot stays around as an error fallback.
    refreshed_at: Option<Instant>,
}

impl CacheState {
    fn fresh(&self, ttl: Duration) -> Option<Arc<LayoutSnapshot>> {
        match (&self.snapshot, self.refreshed_at) {
            (Some(snapshot), Some(at)) if at.elapsed() < ttl => Some(Arc::clone(snapshot)),
            _ => None,
        }
    }
}

/// Time-bounded, single-flight cache of the discovered sheet layout.
pub struct LayoutCache {
    source: Arc<dyn SheetSource>,
    target: SheetTarget,
    ttl: Duration,
    timeout: Duration,
    state: RwLock<CacheState>,
}

impl LayoutCache {
    pub fn new(
        source: Arc<dyn SheetSource>,
        target: SheetTarget,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            target,
            ttl,
            timeout,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn target(&self) -> &SheetTarget {
        &self.target
    }

    pub async fn get_layout(&self) -> DashboardResult<Arc<LayoutSnapshot>> {
        if let Some(snapshot) = self.state.read().await.fresh(self.ttl) {
            return Ok(snapshot);
        }

        let mut state = self.state.write().await;
        // Another caller may have refreshed while we waited for the write lock.
        if let Some(snapshot) = state.fresh(self.ttl) {
            return Ok(snapshot);
        }

        let discovered = match tokio::time::timeout(
            self.timeout,
            discover_from_source(self.source.as_ref(), &self.target),
        )
        .await
        {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };

        match discovered {
            Ok(layout) => {
                let snapshot = Arc::new(layout);
                state.snapshot = Some(Arc::clone(&snapshot));
                state.refreshed_at = Some(Instant::now());
                Ok(snapshot)
            }
            Err(error) => match &state.snapshot {
                Some(stale) => {
                    tracing::warn!(
                        error = %error,
                        captured_at = %stale.captured_at,
                        "layout refresh failed, serving cached layout"
                    );
                    Ok(Arc::clone(stale))
                }
                None => Err(error),
            },
        }
    }

    pub async fn invalidate(&self) {
        self.state.write().await.refreshed_at = None;
        tracing::info!("layout cache invalidated");
    }
}
