//! Request handlers

mod entries;
mod feed;
mod health;
mod runner;

pub use entries::*;
pub use feed::*;
pub use health::*;
pub use runner::*;
