//! Background actors of the agent
//!
//! Each actor runs as an independent tokio task and is controlled through a cloneable
//! handle.
//!
//! ```text
//!   Orchestrator ──push──▶ PriorityQueue ──pop──▶ DeliveryWorker ──POST──▶ ingestion
//!        ▲                                              │
//!        │ pause / resume                               │ should_shutdown
//!        └──────────── ShutdownCoordinator ◀────────────┘
//!                              ▲
//!                              └── ShutdownPoller (GET /api/check-shutdown)
//! ```
//!
//! ## Actor Types
//!
//! - **DeliveryWorker**: single consumer of the priority queue, retries failed sends
//! - **ShutdownPoller**: optional, asks the server for pending shutdown requests
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Shared queue**: the orchestrator and the delivery worker only share the queue
//! 3. **Request/Response**: oneshot channels for answers

pub mod delivery;
pub mod messages;
pub mod poller;
