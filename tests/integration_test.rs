//! End-to-end tests for the serial-to-network forwarding pipeline
//!
//! Exercises the accumulator/buffer/transport pipeline the way
//! `PortEngine` wires it together, standing a real `TcpListener` in for the
//! remote endpoint so these run without serial hardware.

use chrono::{Duration as ChronoDuration, Utc};
use serial_net_forwarder::accumulator::Accumulator;
use serial_net_forwarder::buffer::Buffer;
use serial_net_forwarder::transport::tcp::TcpClient;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

async fn open_buffer(dir: &tempfile::TempDir, name: &str, capacity: usize) -> Buffer {
    let path = dir.path().join(format!("buffer_{name}.db"));
    Buffer::open(name, &path, capacity).await.unwrap()
}

/// spec.md §8: a burst of serial bytes separated by less than `send_delay`
/// is emitted exactly once, as the concatenation of the whole burst.
#[tokio::test]
async fn idle_delimited_burst_emits_exactly_once() {
    let mut acc = Accumulator::new(Duration::from_millis(60));

    acc.push(b"AT+");
    tokio::time::sleep(Duration::from_millis(10)).await;
    acc.push(b"STATUS");
    tokio::time::sleep(Duration::from_millis(10)).await;
    acc.push(b"?");

    // Still inside the idle window: nothing ready yet.
    assert!(acc.try_emit().is_none());

    tokio::time::sleep(Duration::from_millis(70)).await;
    let emitted = acc.try_emit().expect("burst should have emitted once");
    assert_eq!(emitted, b"AT+STATUS?");

    // A second poll without new input must not re-emit.
    assert!(acc.try_emit().is_none());
}

/// spec.md §8: a message buffered while the transport is unreachable is
/// delivered, and marked sent, once the transport comes back — simulating
/// the crash/restart case where the engine reopens an existing buffer file.
#[tokio::test]
async fn message_buffered_while_disconnected_is_delivered_after_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = open_buffer(&dir, "crash", 100).await;

    let id = buffer.insert(b"queued-while-down").await.unwrap();
    let unsent = buffer.enumerate_unsent().await.unwrap();
    assert_eq!(unsent.len(), 1);
    assert!(!unsent[0].sent);

    // Simulate process restart: reopen the same file, the row survives.
    drop(buffer);
    let path = dir.path().join("buffer_crash.db");
    let reopened = Buffer::open("crash", &path, 100).await.unwrap();
    let unsent = reopened.enumerate_unsent().await.unwrap();
    assert_eq!(unsent.len(), 1);
    assert_eq!(unsent[0].id, id);

    // Transport comes back; the engine flushes and marks the row sent.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = sock.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    });

    let mut client = TcpClient::new(addr.ip().to_string(), addr.port());
    client.connect().await.unwrap();
    client.send(&unsent[0].data).await.unwrap();
    reopened.mark_sent(&[id], Utc::now()).await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(received, b"queued-while-down");
    assert!(reopened.enumerate_unsent().await.unwrap().is_empty());
}

/// spec.md §8: ports are independent — traffic and buffering on one port
/// must not affect another's.
#[tokio::test]
async fn multiple_ports_buffer_independently() {
    let dir = tempfile::tempdir().unwrap();
    let port_a = open_buffer(&dir, "a", 100).await;
    let port_b = open_buffer(&dir, "b", 100).await;

    port_a.insert(b"from-a").await.unwrap();
    port_b.insert(b"from-b-1").await.unwrap();
    port_b.insert(b"from-b-2").await.unwrap();

    assert_eq!(port_a.enumerate_unsent().await.unwrap().len(), 1);
    assert_eq!(port_b.enumerate_unsent().await.unwrap().len(), 2);

    port_a.mark_sent(&[1], Utc::now()).await.unwrap();
    assert!(port_a.enumerate_unsent().await.unwrap().is_empty());
    // Marking port A sent must not touch port B's rows.
    assert_eq!(port_b.enumerate_unsent().await.unwrap().len(), 2);
}

/// spec.md §8: a crash mid-accumulation recovers the partial message from
/// the pending-accumulator mirror record and resumes accumulating into it.
#[tokio::test]
async fn pending_accumulator_survives_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = open_buffer(&dir, "recover", 100).await;

    // Engine mirrors the in-flight accumulator periodically while bytes sit
    // unflushed; simulate the mirror write, then a crash before try_emit.
    buffer.put_pending(b"partial-before-cr").await.unwrap();

    drop(buffer);
    let path = dir.path().join("buffer_recover.db");
    let reopened = Buffer::open("recover", &path, 100).await.unwrap();

    let recovered = reopened
        .load_pending()
        .await
        .unwrap()
        .expect("pending-accumulator record should have survived the crash");

    let mut acc = Accumulator::new(Duration::from_millis(30));
    acc.restore(recovered);
    acc.push(b"ash"); // the rest of the line arrives after restart

    tokio::time::sleep(Duration::from_millis(50)).await;
    let emitted = acc.try_emit().expect("should emit the combined message");
    assert_eq!(emitted, b"partial-before-crash");
}

/// spec.md §8: when a flush breaks partway through (the transport flaps),
/// order is preserved — earlier messages already marked sent stay sent,
/// the message that failed and everything after it stay unsent.
#[tokio::test]
async fn flush_during_flap_preserves_order_and_partial_progress() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = open_buffer(&dir, "flap", 100).await;

    let id1 = buffer.insert(b"one").await.unwrap();
    let id2 = buffer.insert(b"two").await.unwrap();
    let id3 = buffer.insert(b"three").await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 16];
        // Read only the first message, then force an abrupt RST on drop
        // (SO_LINGER 0) so the next write fails deterministically instead of
        // depending on how many writes it takes for a plain FIN to surface.
        sock.readable().await.unwrap();
        sock.try_read(&mut buf).unwrap();
        socket2::SockRef::from(&sock)
            .set_linger(Some(Duration::ZERO))
            .unwrap();
    });

    let mut client = TcpClient::new(addr.ip().to_string(), addr.port());
    client.connect().await.unwrap();

    let unsent = buffer.enumerate_unsent().await.unwrap();
    let mut sent_ids = Vec::new();

    // Send the first message and let the server consume it and vanish
    // before attempting the rest, so the later sends hit a genuinely closed peer.
    client.send(&unsent[0].data).await.unwrap();
    sent_ids.push(unsent[0].id);
    server.await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    for msg in &unsent[1..] {
        if client.send(&msg.data).await.is_err() {
            break;
        }
        sent_ids.push(msg.id);
    }
    if !sent_ids.is_empty() {
        buffer.mark_sent(&sent_ids, Utc::now()).await.unwrap();
    }

    assert_eq!(sent_ids, vec![id1]);
    let remaining = buffer.enumerate_unsent().await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].id, id2);
    assert_eq!(remaining[1].id, id3);
}

/// spec.md §8: the retention sweep removes only sent messages older than
/// the 30-day window; a message sent 31 days ago is purged, one sent 29
/// days ago is kept, and unsent messages are never touched regardless of age.
#[tokio::test]
async fn retention_sweep_respects_the_thirty_day_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = open_buffer(&dir, "retention", 100).await;

    let old_id = buffer.insert(b"31-days-old-sent").await.unwrap();
    let kept_id = buffer.insert(b"29-days-old-sent").await.unwrap();
    let unsent_id = buffer.insert(b"never-sent-very-old").await.unwrap();

    buffer
        .mark_sent(&[old_id], Utc::now() - ChronoDuration::days(31))
        .await
        .unwrap();
    buffer
        .mark_sent(&[kept_id], Utc::now() - ChronoDuration::days(29))
        .await
        .unwrap();

    let cutoff = Utc::now() - ChronoDuration::days(30);
    let deleted = buffer.purge_old_sent(cutoff).await.unwrap();
    assert_eq!(deleted, 1);

    let unsent = buffer.enumerate_unsent().await.unwrap();
    assert_eq!(unsent.len(), 1);
    assert_eq!(unsent[0].id, unsent_id);
}

/// spec.md §8 "Boundaries": a buffer at capacity evicts the oldest unsent
/// message rather than rejecting new writes or growing unbounded.
#[tokio::test]
async fn buffer_at_capacity_evicts_oldest_rather_than_rejecting_writes() {
    let dir = tempfile::tempdir().unwrap();
    let buffer = open_buffer(&dir, "capacity", 3).await;

    for i in 0..5 {
        buffer.insert(format!("msg-{i}").as_bytes()).await.unwrap();
    }

    let unsent = buffer.enumerate_unsent().await.unwrap();
    assert_eq!(unsent.len(), 3);
    assert_eq!(unsent[0].data, b"msg-2");
    assert_eq!(unsent[2].data, b"msg-4");
}
