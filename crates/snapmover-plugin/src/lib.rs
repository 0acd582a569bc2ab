//! Velero item actions that route CSI snapshots through a data mover
//!
//! - **Backup**: request a mover backup for every snapshot content and wait
//!   for it to finish before the request is written into the archive
//! - **Restore**: recreate the mover restore request, wait for the sync, then
//!   rebind the snapshot and claim to the data the mover produced
//! - **Delete**: clean up snapshot content created for a backup
//! - **Registry**: every action, its selector and the restore stage order
//! - **CLI**: run one action against the live cluster from JSON files

pub mod action;
pub mod backup;
pub mod cli;
pub mod client;
pub mod delete;
pub mod registry;
pub mod restore;

pub(crate) use snapmover_common::{crd, Error, Result};
