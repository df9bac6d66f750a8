//! `cargo run --example ping_pong`
//!
//! Spawns an auto-forwarded child machine, bounces a few `PING`s through
//! the parent down to it, and watches the parent finish once the child
//! reports done — the final-state termination cascade in action.

use std::time::Duration;

use stateflow::StateSnapshot;
use stateflow_demos::ping_pong::{rally_options, Rally};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let interpreter = stateflow::interpret(Rally, rally_options());
    let _on_done = interpreter.on_done(|event| println!("rally done: {event}"));

    interpreter.start(None);
    interpreter.send("START").expect("interpreter is running");

    for _ in 0..3 {
        interpreter.send("PING").expect("interpreter is running");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let context = interpreter.current().map(|s| s.context().clone());
    println!("final context: {context:?}");
}
