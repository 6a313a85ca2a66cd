#![forbid(unsafe_code)]

mod args;
mod envelope;
mod render;

pub(crate) use args::*;
pub(crate) use envelope::*;
pub(crate) use render::*;
