//! Counter - Minimal keyed-store example
//!
//! Shows the core pattern end to end:
//! - State: a record of fields
//! - Transform: `count` also derives `label`
//! - Listeners: one per field, only woken when that field changes
//! - Dispatch: inline notification, or hand-off to a notifier task
//!
//! Run with `--hand-off` to let a tokio task run the listeners.

use std::time::Duration;

use clap::Parser;
use keyed_store::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "counter", about = "Dispatch a few counter updates through a keyed store")]
struct Args {
    /// Number of increments to dispatch
    #[arg(long, default_value_t = 3)]
    steps: i64,

    /// Defer notification to a separate task
    #[arg(long)]
    hand_off: bool,

    /// Print the dispatch log at the end
    #[arg(long)]
    log: bool,
}

// ============================================================================
// Store - state + transform
// ============================================================================

fn build_store(args: &Args) -> Store {
    let mut builder = StoreBuilder::new(json!({"count": 0, "label": "zero", "quiet": 0}))
        .transform("count", |incoming, _state| {
            let n = incoming.as_i64().unwrap_or(0);
            let label = match n {
                0 => "zero".to_string(),
                n if n % 2 == 0 => format!("even {}", n),
                n => format!("odd {}", n),
            };
            json!({"count": n, "label": label}).into_record()
        })
        .hand_off(args.hand_off);

    if args.log {
        builder = builder.dispatch_log(DispatchLogConfig::default());
    }
    builder.build()
}

fn watch_field(store: &Store, field: &'static str) -> Unsubscribe {
    let reader = store.clone();
    store.subscribe(
        listener(move || {
            let value = reader.field(field).unwrap_or_default();
            println!("  [{field}] -> {value}");
        }),
        field,
    )
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let store = build_store(&args);

    let _subs = [
        watch_field(&store, "count"),
        watch_field(&store, "label"),
        watch_field(&store, "quiet"),
    ];

    let (tx, rx) = handoff_channel();
    let cancel_token = CancellationToken::new();
    let notifier = spawn_notifier(store.clone(), rx, cancel_token.clone());

    for _ in 0..args.steps {
        let next = store.field_as::<i64>("count").unwrap_or(0) + 1;
        let outcome = store.dispatch(json!({"count": next}), DispatchOptions::new());
        println!("dispatched {} ({:?})", outcome.batch, outcome.status);

        if let Some(pending) = outcome.pending() {
            if tx.send(pending).is_err() {
                eprintln!("notifier stopped, dropping {}", outcome.batch);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Never reaches the `quiet` listener
    store.set_unsynchronized(json!({"quiet": 1}));

    drop(tx);
    if notifier.await.is_err() {
        eprintln!("notifier task panicked");
    }
    cancel_token.cancel();

    println!(
        "final state (revision {}): {}",
        store.revision(),
        serde_json::Value::Object((*store.state()).clone())
    );

    if let Some(log) = store.dispatch_log() {
        println!("dispatch log:");
        for entry in log.entries() {
            println!("  {}", entry.summary());
        }
    }
}
