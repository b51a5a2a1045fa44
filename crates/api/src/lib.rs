//! Herald HTTP API.
//!
//! Endpoints:
//! - GET  /health: liveness, no auth
//! - POST /api/notifications: enqueue for background delivery
//! - POST /api/notifications/send: deliver synchronously
//! - GET  /api/notifications/{id}/status: current status
//! - GET  /api/notifications/pending/count: notifications due now

pub mod middleware;
pub mod routes;
pub mod state;
