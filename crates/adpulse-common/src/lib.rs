//! Domain types shared by every adpulse crate.

pub mod id;
pub mod types;
