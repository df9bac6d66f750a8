//! Demo harness for the `stateflow` interpreter.
//!
//! Runs one of the toy machines in `stateflow-demos` end to end and prints
//! every transition as it happens, the same role `durable-cli` plays for
//! `durable-runtime` (minus the cluster: everything here is in-process).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use stateflow::{InterpretOptions, StateSnapshot};
use stateflow_demos::{ping_pong, traffic_light};
use tracing_subscriber::prelude::*;

#[derive(Debug, clap::Parser)]
#[command(about = "Drive a toy stateflow machine end to end")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Red -> Green -> Yellow -> Red on a timer, then force an EMERGENCY
    /// stop and show the pending tick never fires.
    TrafficLight {
        /// How many TICKs to observe before sending EMERGENCY.
        #[arg(long, default_value_t = 3)]
        ticks: usize,
    },
    /// Spawn an auto-forwarded child and watch the parent finish when the
    /// child reports done.
    PingPong,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    match Args::parse().command {
        Command::TrafficLight { ticks } => run_traffic_light(ticks).await,
        Command::PingPong => run_ping_pong().await,
    }
}

async fn run_traffic_light(ticks: usize) -> anyhow::Result<()> {
    let interpreter = stateflow::interpret(traffic_light::TrafficLight, InterpretOptions::default());

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_in_listener = seen.clone();
    let _subscription = interpreter.subscribe(
        move |snapshot| {
            seen_in_listener.fetch_add(1, Ordering::SeqCst);
            println!(
                "-> {:?} (cycles completed: {})",
                snapshot.light,
                snapshot.context().cycles
            );
        },
        None,
    );

    interpreter.start(None);

    while seen.load(Ordering::SeqCst) <= ticks {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    println!("sending EMERGENCY");
    interpreter.send("EMERGENCY")?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    interpreter.stop();
    println!("stopped");
    Ok(())
}

async fn run_ping_pong() -> anyhow::Result<()> {
    let interpreter = stateflow::interpret(ping_pong::Rally, ping_pong::rally_options());

    let done = Arc::new(tokio::sync::Notify::new());
    let done_in_listener = done.clone();
    let _on_done = interpreter.on_done(move |event| {
        println!("rally done: {event}");
        done_in_listener.notify_one();
    });

    interpreter.start(None);
    interpreter.send("START")?;

    for _ in 0..3 {
        interpreter.send("PING")?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    done.notified().await;
    let context = interpreter.current().map(|s| s.context().clone());
    println!("final context: {context:?}");
    Ok(())
}
