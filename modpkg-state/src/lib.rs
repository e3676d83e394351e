#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod entry;
pub use entry::StateEntry;
pub use entry::StateFile;

mod error;
pub use error::Error;

mod parser;

mod persistor;
pub use persistor::StatePersistor;
