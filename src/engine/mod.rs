// SPDX-License-Identifier: MIT

//! The state store engine
//!
//! This module provides:
//! - `StateStore` - one named, typed value with history and persistence
//! - `StateRegistry` - the session's live stores and their cache
//! - `coerce` - conversion of raw input into a store's declared type
//! - `PersistenceAdapter` - durable storage of exposed state documents

pub mod cache;
pub mod clock;
pub mod coerce;
pub mod config;
pub mod error;
pub mod history;
pub mod persistence;
pub mod registry;
pub mod store;
pub mod units;
pub mod value;

pub use cache::StateCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BoolConfig, BoolRepr, NumConfig, StoreConfig, TypeConfig};
pub use error::{StateError, StateResult};
pub use history::{HistoryBuffer, HistoryEntry};
pub use persistence::{FileStore, MemoryStore, NullStore, PersistenceAdapter};
pub use registry::StateRegistry;
pub use store::{EventKind, ExposedState, StateEvent, StateStore, StoreContext};
pub use units::{StandardUnits, UnitCatalog};
pub use value::StateValue;
