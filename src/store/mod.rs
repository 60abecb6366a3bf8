//! Persistent storage for the history API

pub mod sessions;

pub use sessions::{SessionStore, StoreError};
