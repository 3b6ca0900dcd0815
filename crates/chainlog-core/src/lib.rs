//! # chainlog-core
//!
//! Backend-agnostic event-log subsystem for EVM contracts.
//!
//! ## Pipeline
//! ```text
//! Contract + event identifier
//!       │
//!       ▼
//! resolver::resolve            → EventDescriptor
//!       │
//!       ▼
//! args::normalize_args         → NormalizedArgs (Wildcard | Exact | AnyOf)
//!       │
//!       ▼
//! topic::encode_topics         → Vec<Topic> (one 32-byte slot per indexed param)
//!       │
//!       ▼
//! LogBackend::query_logs / subscribe / receipt
//!       │
//!       ▼
//! log::normalize_log           → NormalizedLog<Native>
//! ```
//!
//! The engine ([`LogEngine`]) depends only on the [`LogBackend`] trait.
//! Concrete backends live in `chainlog-http` and `chainlog-ws`;
//! [`memory::MemoryBackend`] is an in-process chain for tests and offline use.

pub mod args;
pub mod backend;
pub mod config;
pub mod contract;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod log;
pub mod memory;
pub mod resolver;
pub mod rpc;
pub mod topic;
pub mod types;

pub use args::{ArgFilter, ArgValue, FilterArg, IndexedArgs, NormalizedArgs};
pub use backend::{BlockTag, LogBackend, LogFilter, LogSubscription, Receipt, Unsubscribe};
pub use config::{BackendKind, ChainlogConfig, LogConfig};
pub use contract::Contract;
pub use descriptor::{EventDescriptor, Parameter};
pub use engine::{BoxError, LogEngine, WatchHandle};
pub use error::{BackendError, ConfigError, DecodeFailure, EventError, LogError};
pub use log::{LogArgs, LogValue, NativeLog, NormalizedLog, RawLog};
pub use topic::Topic;
pub use types::IndexedType;
