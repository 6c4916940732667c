// SPDX-License-Identifier: MIT

//! Consumers of the engine: deployment loading, read and write nodes,
//! broker mirroring and the HTTP surface

pub mod broker;
pub mod getter;
pub mod loader;
pub mod server;
pub mod setter;

pub use getter::{Getter, GetterConfig, GetterOutput};
pub use loader::{DeploymentConfig, DeploymentLoader};
pub use setter::{SetMessage, Setter};
