pub mod config;
pub mod resolver;
pub mod server;

pub mod io;

mod common;
mod proto;
