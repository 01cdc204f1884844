//! Producer/consumer handover across real threads: ordering, chunk
//! boundaries, blocking, and teardown.

use std::sync::Arc;
use std::thread;

use redorelay::config::constants::{MEMORY_CHUNK_SIZE, MESSAGE_LENGTH_SIZE};
use redorelay::memory::MemoryPool;
use redorelay::output::OutputBuffer;

#[test]
fn writer_thread_sees_messages_in_commit_order() {
    let pool = Arc::new(MemoryPool::new(0, 64));
    let mut out = OutputBuffer::new(pool).unwrap();
    let mut reader = out.reader();

    let consumer = thread::spawn(move || {
        let mut got = Vec::new();
        while let Some(msg) = reader.next_message() {
            got.push(msg);
        }
        got
    });

    const COUNT: usize = 200;
    for i in 0..COUNT {
        out.begin_message().unwrap();
        // mixed sizes so some messages straddle chunk boundaries
        let body = if i % 17 == 0 {
            vec![i as u8; MEMORY_CHUNK_SIZE / 3]
        } else {
            format!("event-{i:03}").into_bytes()
        };
        out.append_bytes(&body).unwrap();
        out.commit_message().unwrap();
    }
    out.shutdown();

    let got = consumer.join().unwrap();
    assert_eq!(got.len(), COUNT);
    for (i, msg) in got.iter().enumerate() {
        if i % 17 == 0 {
            assert_eq!(msg.len(), MEMORY_CHUNK_SIZE / 3);
            assert!(msg.iter().all(|&b| b == i as u8));
        } else {
            assert_eq!(msg, format!("event-{i:03}").as_bytes());
        }
    }
}

#[test]
fn append_at_chunk_boundary_links_a_new_chunk() {
    let pool = Arc::new(MemoryPool::new(0, 8));
    let mut out = OutputBuffer::new(pool).unwrap();
    let mut reader = out.reader();

    out.begin_message().unwrap();
    let fill = MEMORY_CHUNK_SIZE - MESSAGE_LENGTH_SIZE - 3;
    out.append_bytes(&vec![0x11; fill]).unwrap();
    assert_eq!(out.buffers_allocated(), 1);

    for b in [1u8, 2, 3, 4] {
        out.append(b).unwrap();
    }
    assert_eq!(out.buffers_allocated(), 2);
    out.commit_message().unwrap();

    let msg = reader.try_next().unwrap();
    assert_eq!(msg.len(), fill + 4);
    assert_eq!(&msg[..fill], &vec![0x11; fill][..]);
    assert_eq!(&msg[fill..], &[1, 2, 3, 4]);
}

#[test]
fn writer_blocks_until_a_message_commits() {
    let pool = Arc::new(MemoryPool::new(0, 8));
    let mut out = OutputBuffer::new(pool).unwrap();
    let mut reader = out.reader();

    let consumer = thread::spawn(move || reader.next_message());

    // publish after a delay; the consumer must stay blocked until then
    thread::sleep(std::time::Duration::from_millis(50));
    out.begin_message().unwrap();
    out.append_str("late arrival").unwrap();
    out.commit_message().unwrap();

    assert_eq!(consumer.join().unwrap().unwrap(), b"late arrival");
}

#[test]
fn shutdown_wakes_an_idle_writer() {
    let pool = Arc::new(MemoryPool::new(0, 8));
    let out = OutputBuffer::new(pool).unwrap();
    let mut reader = out.reader();

    let consumer = thread::spawn(move || reader.next_message());
    thread::sleep(std::time::Duration::from_millis(20));
    out.shutdown();

    assert!(consumer.join().unwrap().is_none());
}

#[test]
fn pool_chunks_recycle_through_a_long_stream() {
    let pool = Arc::new(MemoryPool::new(0, 8));
    let mut out = OutputBuffer::new(pool.clone()).unwrap();
    let mut reader = out.reader();

    // far more data than the pool ceiling could hold at once
    for i in 0..32 {
        out.begin_message().unwrap();
        out.append_bytes(&vec![i as u8; MEMORY_CHUNK_SIZE / 2]).unwrap();
        out.commit_message().unwrap();
        let msg = reader.try_next().unwrap();
        assert_eq!(msg.len(), MEMORY_CHUNK_SIZE / 2);
    }
    // drained chunks were recycled instead of growing the pool
    assert!(pool.allocated() <= 3, "allocated {}", pool.allocated());
}
