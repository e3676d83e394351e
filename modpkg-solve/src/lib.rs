#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod goal;
pub use goal::Resolution;
pub use goal::resolve_active;

mod provider;
pub use provider::ModuleProvider;

mod types;
pub use types::StreamRecord;
pub use types::StreamSpec;
