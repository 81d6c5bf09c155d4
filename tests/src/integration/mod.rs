//! # Integration Flows
//!
//! Several `MalRuntime` nodes share one `InMemoryTransport`; every test
//! drives real messages through endpoints, dispatch and the registry.

pub mod properties;
pub mod pubsub_flows;
pub mod request_flows;
pub mod sequencing;
