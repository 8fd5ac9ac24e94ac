//! Client for the gatekeeper decision and management API.

mod client;

pub use client::{Decision, GatekeeperClient, SdkError};
