#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod config;
pub use config::ContainerConfig;

mod container;
pub use container::ModuleContainer;
pub use container::ModuleRef;

mod defaults;
pub use defaults::Defaults;

mod error;
pub use error::Error;

mod failsafe;
mod loader;
mod platform;
