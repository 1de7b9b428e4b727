//! End-to-end throughput benchmark for Parley.
//!
//! Connects N named clients to a running server, joins them all to one room
//! and has every client broadcast continuously. Counts room messages received.

use futures_util::{SinkExt, StreamExt};
use parley_protocol::{codec, InboundMessage, RawFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SERVER_URL: &str = "ws://127.0.0.1:4042/ws";
const ROOM: &str = "benchmark";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let server_url = args.get(2).cloned().unwrap_or_else(|| SERVER_URL.to_string());

    println!("Parley end-to-end throughput benchmark");
    println!("  server:  {}", server_url);
    println!("  clients: {}", num_clients);
    println!("  warmup:  {}s, measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    run_room_benchmark(&server_url, num_clients).await;
}

async fn run_room_benchmark(server_url: &str, num_clients: usize) {
    let message_count = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let handles: Vec<_> = (0..num_clients)
        .map(|client_id| {
            let url = format!("{}?name=bench-{}", server_url, client_id);
            let msg_count = Arc::clone(&message_count);
            let barrier = Arc::clone(&barrier);

            tokio::spawn(async move {
                if let Err(e) = run_client(&url, msg_count, barrier).await {
                    eprintln!("Client {} error: {}", client_id, e);
                }
            })
        })
        .collect();

    // Wait for all clients to connect and join
    barrier.wait().await;
    println!("All {} clients joined {}", num_clients, ROOM);

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    // Reset counter and start measurement
    message_count.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_messages = message_count.load(Ordering::SeqCst);
    let msgs_per_sec = total_messages as f64 / elapsed.as_secs_f64();

    println!();
    println!("Results");
    println!("  duration:        {:>10.2}s", elapsed.as_secs_f64());
    println!("  messages:        {:>10}", total_messages);
    println!("  throughput:      {:>10.0} msg/s", msgs_per_sec);
    println!(
        "  per client:      {:>10.0} msg/s",
        msgs_per_sec / num_clients as f64
    );

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    url: &str,
    message_count: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let (ws, _) = connect_async(url).await?;
    let (mut sender, mut receiver) = ws.split();

    let join = codec::encode_inbound(&InboundMessage::join(ROOM), Default::default())?;
    sender.send(to_message(join)).await?;

    // Wait for all clients to be ready
    barrier.wait().await;

    let payload = "x".repeat(64);
    let broadcast = to_message(codec::encode_inbound(
        &InboundMessage::room(ROOM, payload.as_str()),
        Default::default(),
    )?);

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let frame = match message {
                Message::Text(text) => RawFrame::Text(text),
                Message::Binary(data) => RawFrame::Binary(data.into()),
                _ => continue,
            };
            if is_benchmark_traffic(&frame, &payload) {
                message_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    loop {
        if sender.send(broadcast.clone()).await.is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}

/// Room traffic carrying the benchmark payload, not join or leave notices.
fn is_benchmark_traffic(frame: &RawFrame, payload: &str) -> bool {
    matches!(codec::decode_envelope(frame), Ok(env) if env.body == payload)
}

fn to_message(frame: RawFrame) -> Message {
    match frame {
        RawFrame::Text(text) => Message::Text(text),
        RawFrame::Binary(data) => Message::Binary(data.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::{Encoding, Envelope};

    fn frame(envelope: &Envelope) -> RawFrame {
        codec::encode(envelope, Encoding::Json).unwrap()
    }

    #[test]
    fn test_only_payload_envelopes_count() {
        let payload = "x".repeat(64);

        assert!(is_benchmark_traffic(
            &frame(&Envelope::from_sender("bench-1", payload.as_str())),
            &payload
        ));
        assert!(!is_benchmark_traffic(
            &frame(&Envelope::system("bench-2 entered the room")),
            &payload
        ));
        // Leave notices carry a sender.
        assert!(!is_benchmark_traffic(
            &frame(&Envelope::from_sender("bench-3", "bench-3 left the room")),
            &payload
        ));
    }
}
