#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod dependency;
pub use dependency::DependencyGroup;

mod error;
pub use error::Error;

mod name;
pub use name::ModuleName;
pub use name::Stream;

mod nsvcap;
pub use nsvcap::Nsvcap;

mod package;
pub use package::ModuleId;
pub use package::ModulePackage;
pub use package::latest_modules;

mod state;
pub use state::ModuleErrorType;
pub use state::ModuleState;
