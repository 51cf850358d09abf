//! R scripting bridge and dataset plumbing for visualization tools.
//!
//! The [`rserve`] module runs R scripts against a local Rserve, injecting a
//! [`data::DataTable`] as an R matrix first. The [`liststate`] module holds
//! the dimensions-list-state value object that visualization widgets expose
//! through their property sheets.

pub mod cli;
pub mod config;
pub mod data;
pub mod liststate;
pub mod rserve;
