//! Host-side pieces of the daemon: the core native module Flow programs
//! configure the server through, and the `flowtest` conformance harness.

pub mod flowtest;
pub mod runtime;
