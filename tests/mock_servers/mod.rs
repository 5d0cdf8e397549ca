//! Mock servers for integration testing
//!
//! Simulate the backend services the bridge talks to, so the full client
//! stack can be exercised over real sockets without the daemon installed.

pub mod mpd;

pub use mpd::MockMpdServer;
