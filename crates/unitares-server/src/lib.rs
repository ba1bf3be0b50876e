//! Process bootstrap for the governance service: wires the `unitares-*`
//! crates into one [`GovernanceServer`] facade and a tool-dispatch table
//! (spec.md §6 "External interfaces"). No transport layer lives here — HTTP,
//! stdio MCP, or whatever else a deployment wants sits in front of
//! [`GovernanceServer::handle`].

pub mod handlers;
pub mod server;

pub use server::GovernanceServer;
