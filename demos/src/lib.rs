//! Toy statecharts used by `stateflow-cli` and the `examples/` binaries in
//! this crate to exercise `interpret`/`spawn`/`subscribe` end to end,
//! playing the same role `durable-runtime`'s `hello-world` /
//! `sleep-n-go.rs` / `notified.rs` demos play for that crate.
//!
//! Neither machine here is the kind of thing a real statechart compiler
//! would emit — they're hand-written `Machine`/`StateSnapshot`
//! implementations, small enough to read in one sitting, built directly
//! against the traits `stateflow-core` exposes.

pub mod ping_pong;
pub mod traffic_light;
