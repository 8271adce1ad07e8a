//! Recording purge client

use async_trait::async_trait;
use blobsync_types::{
    CompletedPurge, Error, PurgeClient, PurgeHandle, PurgeStatus, PurgeTarget, Result,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// One `begin_purge` call seen by [`MemoryPurgeClient`]
#[derive(Debug, Clone)]
pub struct RecordedPurge {
    /// Endpoint addressed
    pub target: PurgeTarget,
    /// Paths submitted
    pub paths: Vec<String>,
    /// When the call was made
    pub at: Instant,
}

/// Purge client that records calls and acknowledges them immediately
#[derive(Debug, Default)]
pub struct MemoryPurgeClient {
    calls: Mutex<Vec<RecordedPurge>>,
    fail_on: Mutex<Option<usize>>,
}

impl MemoryPurgeClient {
    /// Create a client that accepts every request
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the `call`-th request (one-based)
    pub async fn fail_on_call(&self, call: usize) {
        *self.fail_on.lock().await = Some(call);
    }

    /// Every call made so far
    pub async fn calls(&self) -> Vec<RecordedPurge> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl PurgeClient for MemoryPurgeClient {
    async fn begin_purge(
        &self,
        target: &PurgeTarget,
        paths: &[String],
    ) -> Result<Box<dyn PurgeHandle>> {
        let call = {
            let mut calls = self.calls.lock().await;
            calls.push(RecordedPurge {
                target: target.clone(),
                paths: paths.to_vec(),
                at: Instant::now(),
            });
            calls.len()
        };

        if *self.fail_on.lock().await == Some(call) {
            return Err(Error::from_status(
                400,
                format!("purge request {call} rejected"),
            ));
        }

        Ok(Box::new(CompletedPurge(PurgeStatus { status_code: 200 })))
    }
}
