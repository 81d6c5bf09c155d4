//! # MAL Runtime Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs        # Nodes, provider handlers, recording listener
//! └── integration/       # End-to-end flows over the in-memory transport
//!     ├── request_flows.rs
//!     ├── sequencing.rs
//!     └── pubsub_flows.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p mal-tests
//!
//! # By category
//! cargo test -p mal-tests integration::pubsub_flows::
//!
//! # Benchmarks
//! cargo bench -p mal-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
