//! Engine composition root.
//!
//! Owns the node identity and wires substrate, collaborators, store,
//! orchestrator, gateway, and relay together. The fanout-notice channel
//! between store and gateway is created here, making that dependency
//! explicit and independently testable.

use crate::content::{AudienceResolver, ContentProvider};
use crate::gateway::{Gateway, LocalEmitter};
use crate::identity::NodeId;
use crate::orchestrator::{FanoutOrchestrator, CHUNK_SIZE};
use crate::presence::PresenceDirectory;
use crate::relay::{Relay, RelaySender, RelayState};
use crate::timeline::TimelineStore;
use fanline_substrate::Substrate;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Builder for an [`Engine`].
pub struct EngineBuilder {
    substrate: Arc<dyn Substrate>,
    presence: Arc<dyn PresenceDirectory>,
    audience: Arc<dyn AudienceResolver>,
    content: Arc<dyn ContentProvider>,
    emitter: Arc<dyn LocalEmitter>,
    node_id: Option<NodeId>,
    chunk_size: usize,
}

impl EngineBuilder {
    /// Start a builder from the required collaborators.
    #[must_use]
    pub fn new(
        substrate: Arc<dyn Substrate>,
        presence: Arc<dyn PresenceDirectory>,
        audience: Arc<dyn AudienceResolver>,
        content: Arc<dyn ContentProvider>,
        emitter: Arc<dyn LocalEmitter>,
    ) -> Self {
        Self {
            substrate,
            presence,
            audience,
            content,
            emitter,
            node_id: None,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Use a specific node identity instead of generating one.
    #[must_use]
    pub fn with_node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// Override the fanout chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Wire everything together.
    #[must_use]
    pub fn build(self) -> Engine {
        let node_id = self.node_id.unwrap_or_else(NodeId::generate);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let store = TimelineStore::new(self.substrate.clone(), notice_tx);
        let orchestrator =
            FanoutOrchestrator::with_chunk_size(self.audience, store.clone(), self.chunk_size);
        let gateway = Arc::new(Gateway::new(
            node_id.clone(),
            self.presence,
            self.content,
            store.clone(),
            RelaySender::new(self.substrate.clone()),
            self.emitter,
        ));
        let relay = Arc::new(Relay::new(node_id.clone(), self.substrate));

        Engine {
            node_id,
            store,
            orchestrator,
            gateway,
            relay,
            notice_rx: Some(notice_rx),
        }
    }
}

/// A fully wired routing engine for one node.
pub struct Engine {
    node_id: NodeId,
    store: TimelineStore,
    orchestrator: FanoutOrchestrator,
    gateway: Arc<Gateway>,
    relay: Arc<Relay>,
    notice_rx: Option<mpsc::UnboundedReceiver<crate::timeline::FanoutNotice>>,
}

impl Engine {
    /// This node's identity.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// The timeline store.
    #[must_use]
    pub fn store(&self) -> &TimelineStore {
        &self.store
    }

    /// The fanout orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &FanoutOrchestrator {
        &self.orchestrator
    }

    /// The routing gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Current relay subscription state.
    #[must_use]
    pub fn relay_state(&self) -> RelayState {
        self.relay.state()
    }

    /// Subscribe the relay and start the notice pump.
    ///
    /// Returns whether the dial-up channel came up; `false` leaves the
    /// node serving local traffic only, with [`Engine::resubscribe`] as
    /// the recovery hook.
    pub async fn start(&mut self) -> bool {
        if let Some(mut notice_rx) = self.notice_rx.take() {
            let gateway = self.gateway.clone();
            tokio::spawn(async move {
                while let Some(notice) = notice_rx.recv().await {
                    if let Err(e) = gateway.handle_notice(notice).await {
                        error!(error = %e, "Notice routing failed");
                    }
                }
            });
        }

        let subscribed = self.relay.subscribe(self.gateway.clone()).await;
        info!(
            node = %self.node_id,
            subscribed,
            "Engine started"
        );
        subscribed
    }

    /// Force a relay resubscription attempt.
    pub async fn resubscribe(&self) -> bool {
        self.relay.resubscribe(self.gateway.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentItem, MemoryAudience, MemoryContent};
    use crate::gateway::{EmitError, LocalEmitter};
    use crate::presence::{MemoryPresence, PresenceRecord};
    use crate::timeline::Direction;
    use async_trait::async_trait;
    use fanline_substrate::MemorySubstrate;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingEmitter {
        events: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl LocalEmitter for CountingEmitter {
        async fn emit(
            &self,
            connection_id: &str,
            event: &str,
            _payload: &Value,
        ) -> Result<(), EmitError> {
            self.events
                .lock()
                .unwrap()
                .push((connection_id.to_string(), event.to_string()));
            Ok(())
        }
    }

    struct Node {
        engine: Engine,
        emitter: Arc<CountingEmitter>,
    }

    fn node(
        substrate: &Arc<MemorySubstrate>,
        presence: &Arc<MemoryPresence>,
        audience: &Arc<MemoryAudience>,
        content: &Arc<MemoryContent>,
        id: &str,
    ) -> Node {
        let emitter = Arc::new(CountingEmitter::default());
        let engine = EngineBuilder::new(
            substrate.clone(),
            presence.clone(),
            audience.clone(),
            content.clone(),
            emitter.clone(),
        )
        .with_node_id(id.into())
        .build();
        Node { engine, emitter }
    }

    async fn wait_for_events(emitter: &CountingEmitter, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while emitter.events.lock().unwrap().len() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("events never arrived");
    }

    #[tokio::test]
    async fn test_two_node_timeline_flow() {
        // Two engines sharing one substrate and one presence directory.
        let substrate = Arc::new(MemorySubstrate::new());
        let presence = Arc::new(MemoryPresence::new());
        let audience = Arc::new(MemoryAudience::new());
        let content = Arc::new(MemoryContent::new());

        let mut a = node(&substrate, &presence, &audience, &content, "nodeA");
        let mut b = node(&substrate, &presence, &audience, &content, "nodeB");
        assert!(a.engine.start().await);
        assert!(b.engine.start().await);

        // One follower on each node.
        presence.connect(PresenceRecord::new("conn-1", "nodeA", "f-local"));
        presence.connect(PresenceRecord::new("conn-2", "nodeB", "f-remote"));
        audience.set_followers("author", vec!["f-local".into(), "f-remote".into()]);

        let item = ContentItem::new("p1", "author", 1_700_000_000_000);
        content.put_item(item.clone());

        a.engine
            .orchestrator()
            .distribute(Direction::Fanout, "author", &item)
            .await
            .unwrap();

        // Both timelines materialize.
        assert_eq!(a.engine.store().timeline_len("f-local").await.unwrap(), 1);
        assert_eq!(a.engine.store().timeline_len("f-remote").await.unwrap(), 1);

        // The local follower gets a direct emit on node A; the remote one
        // arrives through node B's relay.
        wait_for_events(&a.emitter, 1).await;
        wait_for_events(&b.emitter, 1).await;

        let a_events = a.emitter.events.lock().unwrap();
        assert_eq!(a_events[0], ("conn-1".into(), "timeline:update".into()));
        let b_events = b.emitter.events.lock().unwrap();
        assert_eq!(b_events[0], ("conn-2".into(), "timeline:update".into()));
    }

    #[tokio::test]
    async fn test_builder_generates_identity_when_unset() {
        let substrate = Arc::new(MemorySubstrate::new());
        let engine = EngineBuilder::new(
            substrate,
            Arc::new(MemoryPresence::new()),
            Arc::new(MemoryAudience::new()),
            Arc::new(MemoryContent::new()),
            Arc::new(CountingEmitter::default()),
        )
        .build();

        assert_eq!(engine.node_id().as_str().len(), crate::identity::NODE_ID_LEN);
        assert_eq!(engine.relay_state(), RelayState::Unsubscribed);
    }
}
