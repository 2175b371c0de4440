use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ClusterResult;

/// The master side of the election seam. Election backends call these
/// methods when the leadership of the master instance changes.
#[async_trait]
pub trait LeaderElectable: Send + Sync + 'static {
    async fn elected_leader(&self);

    async fn revoked_leadership(&self);
}

/// A backend that decides which master instance is the leader.
/// Backends backed by a coordination service implement this trait.
#[async_trait]
pub trait LeaderElectionAgent: Send + Sync + 'static {
    /// Starts participating in the election, delivering leadership changes
    /// to the given electable.
    async fn start(&self, electable: Arc<dyn LeaderElectable>) -> ClusterResult<()>;

    /// Withdraws from the election.
    async fn stop(&self) -> ClusterResult<()>;
}

/// The election agent for deployments with a single master instance.
/// The master is elected unconditionally as soon as it starts.
pub struct SingleLeaderAgent;

#[async_trait]
impl LeaderElectionAgent for SingleLeaderAgent {
    async fn start(&self, electable: Arc<dyn LeaderElectable>) -> ClusterResult<()> {
        electable.elected_leader().await;
        Ok(())
    }

    async fn stop(&self) -> ClusterResult<()> {
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct RecordingElectable {
        elected: AtomicBool,
    }

    #[async_trait]
    impl LeaderElectable for RecordingElectable {
        async fn elected_leader(&self) {
            self.elected.store(true, Ordering::SeqCst);
        }

        async fn revoked_leadership(&self) {
            self.elected.store(false, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_single_leader_agent_elects_immediately() {
        let electable = Arc::new(RecordingElectable {
            elected: AtomicBool::new(false),
        });
        let agent = SingleLeaderAgent;
        agent.start(electable.clone()).await.unwrap();
        assert!(electable.elected.load(Ordering::SeqCst));
        agent.stop().await.unwrap();
    }
}
