//! CLI command implementations.

pub mod backup;
pub mod inspect;
pub mod maintenance;
pub mod record;
pub mod transfer;
pub mod verify;
