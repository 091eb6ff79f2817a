// tb-test-utils: Shared test utilities for the gateway workspace.
//
// Provides a scriptable in-memory cloud and raw PDU builders for unit and
// integration testing of the dispatcher, handlers, and socket server.

pub mod frames;
pub mod mock_cloud;

pub use mock_cloud::{CloudCall, MockCloud};
