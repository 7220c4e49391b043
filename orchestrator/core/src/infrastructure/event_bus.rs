// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over a tokio broadcast channel. Planning and
// cortex events share one stream so the CLI daemon can tail both.
// Events are not persisted; a lagging subscriber loses the oldest ones.

use crate::domain::events::PlanningEvent;
use crate::domain::plan::PlanId;
use async_trait::async_trait;
use lifeos_cortex::domain::CortexEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stream", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Planning(PlanningEvent),
    Cortex(CortexEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is how many events are buffered before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_planning_event(&self, event: PlanningEvent) {
        self.send(DomainEvent::Planning(event));
    }

    pub fn publish_cortex_event(&self, event: CortexEvent) {
        self.send(DomainEvent::Cortex(event));
    }

    fn send(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the planning events of a single plan
    pub fn subscribe_plan(&self, plan_id: PlanId) -> PlanEventReceiver {
        PlanEventReceiver {
            receiver: self.sender.subscribe(),
            plan_id,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl lifeos_cortex::application::EventBus for EventBus {
    async fn publish(&self, event: CortexEvent) -> anyhow::Result<()> {
        self.publish_cortex_event(event);
        Ok(())
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one plan
pub struct PlanEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    plan_id: PlanId,
}

impl PlanEventReceiver {
    pub async fn recv(&mut self) -> Result<PlanningEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Planning(planning) = event {
                if planning.plan_id() == self.plan_id {
                    return Ok(planning);
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::profile::UserId;
    use chrono::Utc;
    use lifeos_cortex::domain::{MemoryCategory, MemoryId};

    fn approved(plan_id: PlanId) -> PlanningEvent {
        PlanningEvent::PlanApproved {
            plan_id,
            user_id: UserId::new(),
            version: 2,
            approved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        let plan_id = PlanId::new();
        bus.publish_planning_event(approved(plan_id));

        match receiver.recv().await.unwrap() {
            DomainEvent::Planning(event) => assert_eq!(event.plan_id(), plan_id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plan_filter_skips_other_plans() {
        let bus = EventBus::new(10);
        let target = PlanId::new();
        let mut receiver = bus.subscribe_plan(target);

        bus.publish_planning_event(approved(PlanId::new()));
        bus.publish_cortex_event(CortexEvent::MemoryStored {
            memory_id: MemoryId::new(),
            user_id: UserId::new(),
            category: MemoryCategory::Preference,
            timestamp: Utc::now(),
        });
        bus.publish_planning_event(approved(target));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.plan_id(), target);
    }

    #[tokio::test]
    async fn test_cortex_trait_forwards_to_stream() {
        use lifeos_cortex::application::EventBus as _;

        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let user_id = UserId::new();

        bus.publish(CortexEvent::LifecycleCompleted {
            user_id,
            decayed: 1,
            pruned: 0,
            promoted: 0,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

        match receiver.try_recv().unwrap() {
            DomainEvent::Cortex(event) => assert_eq!(event.user_id(), Some(user_id)),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
