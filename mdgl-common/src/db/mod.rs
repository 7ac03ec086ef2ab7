//! Clinical store connections and schema

pub mod init;

pub use init::*;
