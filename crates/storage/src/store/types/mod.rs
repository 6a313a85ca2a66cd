#![forbid(unsafe_code)]

mod outbox;
mod projects;
mod snapshots;
mod testcases;
mod trials;
mod workspaces;

pub use outbox::*;
pub use projects::*;
pub use snapshots::*;
pub use testcases::*;
pub use trials::*;
pub use workspaces::*;
