//! `rdp-bridge`: serves the remote-debugging protocol to front-ends and
//! forwards it onto a browser's debugging endpoint.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod logging;
pub mod proxy;
pub mod server;
