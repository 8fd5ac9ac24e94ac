//! Decision and management API.
//!
//! # Endpoints
//! ```text
//! ANY  /decisions[/<path>]      evaluate a request for an external proxy
//! GET  /decisions/traefik       same, request taken from X-Forwarded-*
//! GET  /rules?limit&offset      list loaded rules
//! GET  /rules/{id}              one rule
//! GET  /health/alive            process is up
//! GET  /health/ready            rules are loaded
//! GET  /version                 build version
//! GET  /.well-known/jwks.json   public signing keys
//! ```

pub mod decision;
pub mod health;
pub mod jwks;
pub mod rules;
