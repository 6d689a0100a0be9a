//! Cross-thread loopback transport tests.
//!
//! Production deployments run one process per rank; these tests stand in one
//! OS thread per rank, which exercises the same per-sender FIFO contract.

use std::thread;

use rangier_transport::{Envelope, LoopbackCluster, Rank, Transport};

#[test]
fn two_rank_roundtrip() {
    let mut cluster = LoopbackCluster::new(2);
    let b = cluster.pop().unwrap();
    let a = cluster.pop().unwrap();
    assert_eq!(a.rank(), Rank(0));
    assert_eq!(b.rank(), Rank(1));

    let echo = thread::spawn(move || {
        let env = b.recv().unwrap();
        b.send(env.sender, Envelope::new(env.tag, b.rank(), env.payload))
            .unwrap();
    });

    a.send(Rank(1), Envelope::new(4, Rank(0), b"ping".to_vec()))
        .unwrap();
    let reply = a.recv().unwrap();
    echo.join().unwrap();

    assert_eq!(reply.sender, Rank(1));
    assert_eq!(reply.payload, b"ping");
}

#[test]
fn ring_token_passes_every_rank() {
    const SIZE: u32 = 4;
    let cluster = LoopbackCluster::new(SIZE);

    let handles: Vec<_> = cluster
        .into_iter()
        .map(|endpoint| {
            thread::spawn(move || {
                let me = endpoint.rank().0;
                if me == 0 {
                    endpoint
                        .send(Rank(1), Envelope::new(5, endpoint.rank(), vec![0]))
                        .unwrap();
                }
                let env = endpoint.recv().unwrap();
                let hops = env.payload[0];
                if me != 0 {
                    let next = Rank((me + 1) % SIZE);
                    endpoint
                        .send(next, Envelope::new(5, endpoint.rank(), vec![hops + 1]))
                        .unwrap();
                }
                hops
            })
        })
        .collect();

    let hops: Vec<u8> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    // Rank 0 sees the token after a full circuit of SIZE - 1 forwards.
    assert_eq!(hops[0], (SIZE - 1) as u8);
    assert_eq!(hops[1], 0);
    assert_eq!(hops[2], 1);
    assert_eq!(hops[3], 2);
}

#[test]
fn interleaved_tags_keep_per_sender_order() {
    let mut cluster = LoopbackCluster::new(2);
    let rx = cluster.pop().unwrap();
    let tx = cluster.pop().unwrap();

    for i in 0..6u8 {
        let tag = if i % 2 == 0 { 10 } else { 11 };
        tx.send(Rank(1), Envelope::new(tag, Rank(0), vec![i])).unwrap();
    }

    let mut seqs = Vec::new();
    for _ in 0..6 {
        seqs.push(rx.recv().unwrap().seq);
    }
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted, "per-sender delivery must preserve send order");
}
