//! Session Handshake Sequence.
//!
//! This example demonstrates:
//! 1. A custom handler for `["post", session, state]` payloads
//! 2. Pausing while an external task answers, then resuming through a handle
//! 3. Sharing replies between steps through the heap
//! 4. A watchdog timer that fails the sequence if the peer goes quiet
//!
//! Run with `RUST_LOG=debug cargo run --example handshake` to see the
//! engine's own logging.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tsunagi::prelude::*;

// Stands in for a remote peer reached over some transport.
async fn remote_peer(session: String, state: String) -> Result<String, String> {
    tokio::time::sleep(Duration::from_millis(150)).await;
    match state.as_str() {
        "hello" => Ok(format!("{session}: welcome")),
        "auth" => Ok(format!("{session}: token-7f3a")),
        other => Err(format!("{session}: unexpected state {other}")),
    }
}

// Posts `["post", session, state]` payloads to the peer and waits for the reply.
#[derive(Debug)]
struct PostHandler;

#[async_trait]
impl Handler for PostHandler {
    async fn handle(
        &self,
        seq: &mut Sequence,
        request: &mut Request,
    ) -> Result<Outcome, SequenceError> {
        let Some(["post", session, state]) = request.payload().and_then(|p| {
            let items = p.as_array()?;
            let strs: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
            <[&str; 3]>::try_from(strs?).ok()
        }) else {
            return Ok(Outcome::Deferred);
        };

        println!("  -> posting {state} for {session}");
        let (session, state) = (session.to_string(), state.to_string());

        seq.pause();
        let handle = seq.handle()?;
        tokio::spawn(async move {
            let reply = remote_peer(session, state.clone()).await;
            let delivered = handle
                .invoke(move |seq| match reply {
                    Ok(reply) => {
                        println!("  <- {reply}");
                        seq.heap_mut().insert(state, reply);
                        seq.resume()
                    }
                    Err(reason) => seq.failed(vec![Value::from(reason)]),
                })
                .await;
            if let Err(e) = delivered {
                eprintln!("reply could not be delivered: {e}");
            }
        });

        Ok(Outcome::Value(Value::Null))
    }
}

#[tokio::main]
async fn main() -> Result<(), SequenceError> {
    tracing_subscriber::fmt::init();

    println!("=== Session Handshake ===\n");

    let options = SequenceOptions::from_value(json!({"session": "s-42"}))?;

    let handle = Sequence::builder()
        .options(options)
        .add_handler(PostHandler)
        .add_action(Action::code(|seq| {
            // re-armed by every step; fires only if the peer stalls
            seq.add_delay(
                Duration::from_secs(2),
                |seq| {
                    seq.failed(vec![json!("watchdog expired")])?;
                    Ok(TimerOutcome::Done)
                },
                Some("watchdog".into()),
            );
            Ok(Value::Null)
        }))
        .add_action(Action::payload(json!(["post", "s-42", "hello"])))
        .add_action(Action::code(|seq| {
            seq.adjust_delay("watchdog", Duration::from_secs(2))?;
            Ok(Value::Null)
        }))
        .add_action(Action::payload(json!(["post", "s-42", "auth"])))
        .add_action(Action::code(|seq| {
            seq.remove_delay("watchdog");
            let token = seq.heap().get::<String>("auth").cloned();
            seq.finished(vec![Value::from(token)])?;
            Ok(Value::Null)
        }))
        .add_callback(|seq, args| {
            println!("\nHandshake complete");
            println!("  session: {:?}", seq.options().get("session"));
            println!("  greeting: {:?}", seq.heap().get::<String>("hello"));
            println!("  token: {}", args.first().cloned().unwrap_or_default());
            Ok(())
        })
        .add_error_callback(|_seq, args| {
            println!("\nHandshake failed: {args:?}");
            Ok(())
        })
        .add_finally_callback(|seq, _args| {
            println!("  took {:?}", seq.elapsed());
            Ok(())
        })
        .build()
        .spawn();

    handle.run().await?;
    let state = handle.wait().await;
    println!("\nFinal state: {state}");

    Ok(())
}
