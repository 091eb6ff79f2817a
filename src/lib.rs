// thingbridge: Umbrella crate for the gateway workspace.
//
// Re-exports the member crates under one roof for the end-to-end test
// suites in tests/integration/.

pub use gateway;
pub use tb_cloud;
pub use tb_protocol;
