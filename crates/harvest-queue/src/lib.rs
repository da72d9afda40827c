//! Harvest Queue
//!
//! Tasks travel through a durable broker as `{"tag": ..., "value": ...}`
//! JSON envelopes. [`TaskQueue`] runs a poller that moves broker batches into
//! a local buffer and a worker that drains the buffer into a
//! [`TaskHandler`], so a slow task never keeps the poller from talking to the
//! broker.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod broker;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod queue;
pub mod task;

pub use broker::Broker;
#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;
pub use error::{QueueError, Result};
pub use memory::MemoryBroker;
pub use queue::{QueueOptions, TaskHandler, TaskQueue, TaskSink};
pub use task::{Envelope, ListApiTask, Tag, Task};
