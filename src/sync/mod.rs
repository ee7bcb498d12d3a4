//! Module that automatically chooses which sync structs to import
//!
//! Used to facilitate [loom][`loom::model`] model tests

#[cfg(loom)]
pub(crate) use loom::sync::{Arc, Mutex};

#[cfg(not(loom))]
pub(crate) use std::sync::{Arc, Mutex};
