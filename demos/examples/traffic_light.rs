//! `cargo run --example traffic_light`
//!
//! Starts a self-advancing traffic light, watches a few cycles go by, then
//! forces it back to red with an `EMERGENCY` event and shows the pending
//! tick never fires afterwards.

use std::time::Duration;

use stateflow::{InterpretOptions, StateSnapshot};
use stateflow_demos::traffic_light::TrafficLight;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let interpreter = stateflow::interpret(TrafficLight, InterpretOptions::default());
    let _subscription = interpreter.subscribe(
        |snapshot| println!("-> {:?} (cycles completed: {})", snapshot.light, snapshot.context().cycles),
        None,
    );

    interpreter.start(None);
    tokio::time::sleep(Duration::from_secs(3)).await;

    println!("sending EMERGENCY");
    interpreter.send("EMERGENCY").expect("interpreter is running");
    tokio::time::sleep(Duration::from_secs(2)).await;

    interpreter.stop();
}
