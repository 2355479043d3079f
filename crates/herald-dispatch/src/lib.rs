//! Herald Dispatch Engine
//!
//! Drains pending messages from the message store and delivers them to an
//! external HTTP endpoint:
//! - `Scheduler`: start/stop-controllable periodic driver
//! - `DispatchWorker`: batch fetch and per-message concurrent send
//! - `DeliveryClient`: HTTP client for the delivery endpoint
//! - `MessageRepository` / `MessageCache`: store and cache seams, with
//!   SQL, Redis and in-memory implementations

pub mod error;
pub mod repository;
pub mod memory;
pub mod cache;
pub mod delivery;
pub mod worker;
pub mod scheduler;

#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::{CacheError, DispatchError, StoreError};
pub use repository::MessageRepository;
pub use memory::InMemoryMessageRepository;
pub use cache::{InMemoryMessageCache, MessageCache, RedisMessageCache, MAX_ENTRY_TTL};
pub use delivery::{Acknowledgment, AcceptedDelivery, DeliveryClient, DeliveryConfig};
pub use worker::{DispatchCycle, DispatchWorker, SendReport, WorkerConfig};
pub use scheduler::{Scheduler, MAX_INTERVAL};
