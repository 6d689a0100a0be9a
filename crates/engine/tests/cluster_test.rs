//! Whole-protocol circuits across several ranks on one loopback cluster.
//!
//! All runtimes are polled from a single test thread, so every interleaving
//! here is deterministic.

use std::sync::{Arc, Mutex};

use rangier_engine::wire::{self, EarlyOutputMsg, IncumbentUpdate, SolutionRecord, WorkerReport};
use rangier_engine::{RankRuntime, RoleKind, SearchCallbacks, SearchConfig, Tick, ThreadState};
use rangier_transport::{Envelope, LoopbackCluster, LoopbackEndpoint, Rank, Transport};

fn build_cluster(
    size: u32,
    config: &SearchConfig,
    mut callbacks: impl FnMut(Rank) -> SearchCallbacks,
) -> Vec<RankRuntime<LoopbackEndpoint>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    LoopbackCluster::new(size)
        .into_iter()
        .map(|endpoint| {
            let rank = endpoint.rank();
            RankRuntime::new(config.clone(), endpoint, callbacks(rank)).unwrap()
        })
        .collect()
}

/// Poll every runtime until a full pass over the cluster is idle.
fn pump_all(runtimes: &mut [RankRuntime<LoopbackEndpoint>]) {
    for _ in 0..10_000 {
        let mut idle = true;
        for rt in runtimes.iter_mut() {
            if rt.poll().unwrap() != Tick::Idle {
                idle = false;
            }
        }
        if idle {
            return;
        }
    }
    panic!("cluster did not quiesce");
}

fn worker_report(load: f64, donor: bool, receiver: bool) -> WorkerReport {
    WorkerReport {
        load,
        bound: f64::INFINITY,
        tokens_wanted: u32::from(receiver),
        acks: 0,
        donor,
        receiver,
    }
}

#[test]
fn hub_brokers_a_subproblem_transfer() {
    let mut config = SearchConfig::default();
    // Degenerate scatter curve: every transfer trial succeeds.
    config.scatter.min_prob = 1.0;
    config.scatter.target_prob = 1.0;
    config.scatter.max_prob = 1.0;

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let mut runtimes = build_cluster(3, &config, move |rank| match rank.0 {
        // Rank 1 is the loaded donor.
        1 => SearchCallbacks::new().take_subproblem(|token| Some(vec![token as u8, 0x77])),
        // Rank 2 is the starved receiver.
        2 => {
            let sink = Arc::clone(&sink);
            SearchCallbacks::new().on_subproblem_received(move |packed, from| {
                sink.lock().unwrap().push((packed.to_vec(), from));
            })
        }
        _ => SearchCallbacks::new(),
    });

    // The hub learns of the donor, then the starved worker checks in.
    runtimes[1].send_report(worker_report(10.0, true, false)).unwrap();
    pump_all(&mut runtimes);
    runtimes[2].send_report(worker_report(0.0, false, true)).unwrap();
    pump_all(&mut runtimes);

    let received = received.lock().unwrap();
    assert_eq!(received.as_slice(), &[(vec![0, 0x77], Rank(1))]);
}

#[test]
fn quality_leader_donates_when_no_worker_volunteers() {
    let mut config = SearchConfig::default();
    config.scatter.min_prob = 1.0;
    config.scatter.target_prob = 1.0;
    config.scatter.max_prob = 1.0;

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let mut runtimes = build_cluster(3, &config, move |rank| match rank.0 {
        1 => SearchCallbacks::new().take_subproblem(|token| Some(vec![token as u8, 0x51])),
        2 => {
            let sink = Arc::clone(&sink);
            SearchCallbacks::new().on_subproblem_received(move |packed, from| {
                sink.lock().unwrap().push((packed.to_vec(), from));
            })
        }
        _ => SearchCallbacks::new(),
    });

    // Rank 1 holds the best incumbent but does not volunteer as a donor.
    runtimes[1]
        .send_report(WorkerReport {
            load: 10.0,
            bound: 3.0,
            tokens_wanted: 0,
            acks: 0,
            donor: false,
            receiver: false,
        })
        .unwrap();
    pump_all(&mut runtimes);
    runtimes[2].send_report(worker_report(0.0, false, true)).unwrap();
    pump_all(&mut runtimes);

    // The hub falls back to the quality leader as donor.
    assert_eq!(
        received.lock().unwrap().as_slice(),
        &[(vec![0, 0x51], Rank(1))]
    );

    // The decision consumed this epoch's reports: a second check-in with no
    // fresh donor information gets nothing.
    runtimes[2].send_report(worker_report(0.0, false, true)).unwrap();
    pump_all(&mut runtimes);
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[test]
fn direct_subproblem_request_bypasses_the_hub() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let mut runtimes = build_cluster(2, &SearchConfig::default(), move |rank| match rank.0 {
        0 => {
            let sink = Arc::clone(&sink);
            SearchCallbacks::new().on_subproblem_received(move |packed, from| {
                sink.lock().unwrap().push((packed.to_vec(), from));
            })
        }
        _ => SearchCallbacks::new().take_subproblem(|_| Some(vec![0xAB])),
    });

    runtimes[0].request_subproblem(Rank(1), 42).unwrap();
    pump_all(&mut runtimes);

    assert_eq!(
        received.lock().unwrap().as_slice(),
        &[(vec![0xAB], Rank(1))]
    );
}

#[test]
fn incumbent_broadcast_reaches_every_rank_once() {
    let improvements = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&improvements);
    let mut runtimes = build_cluster(7, &SearchConfig::default(), move |rank| {
        let sink = Arc::clone(&sink);
        SearchCallbacks::new().on_incumbent_improved(move |value| {
            sink.lock().unwrap().push((rank, value));
        })
    });

    runtimes[3].broadcast_incumbent(17.0).unwrap();
    pump_all(&mut runtimes);

    for rt in &runtimes {
        let incumbent = rt.incumbent();
        assert_eq!(incumbent.value, 17.0);
        assert_eq!(incumbent.seq, 1);
        assert_eq!(incumbent.origin, Rank(3));
    }
    // Every rank except the originator fires the improvement hook once.
    let mut improvements = improvements.lock().unwrap().clone();
    improvements.sort_by_key(|(rank, _)| rank.0);
    let ranks: Vec<u32> = improvements.iter().map(|(rank, _)| rank.0).collect();
    assert_eq!(ranks, vec![0, 1, 2, 4, 5, 6]);
    assert!(improvements.iter().all(|&(_, value)| value == 17.0));
}

#[test]
fn stale_incumbent_relay_is_dropped() {
    let mut runtimes = build_cluster(2, &SearchConfig::default(), |_| SearchCallbacks::new());

    runtimes[0].broadcast_incumbent(5.0).unwrap();
    pump_all(&mut runtimes);
    assert_eq!(runtimes[1].incumbent().value, 5.0);

    // A worse value with a newer sequence still loses on objective.
    runtimes[0].broadcast_incumbent(9.0).unwrap();
    pump_all(&mut runtimes);
    assert_eq!(runtimes[1].incumbent().value, 5.0);
    assert_eq!(runtimes[1].incumbent().seq, 1);
}

#[test]
fn concurrent_improvements_converge_on_the_better_value() {
    let mut runtimes = build_cluster(2, &SearchConfig::default(), |_| SearchCallbacks::new());

    // Both ranks improve before either broadcast lands, so both updates
    // carry the same per-origin sequence number.
    runtimes[0].broadcast_incumbent(10.0).unwrap();
    runtimes[1].broadcast_incumbent(5.0).unwrap();
    pump_all(&mut runtimes);

    for rt in &runtimes {
        let incumbent = rt.incumbent();
        assert_eq!(incumbent.value, 5.0);
        assert_eq!(incumbent.origin, Rank(1));
    }
}

#[test]
fn load_log_token_makes_the_configured_circuits() {
    let mut config = SearchConfig::default();
    config.features.load_log_rounds = 2;

    let mut runtimes = build_cluster(3, &config, |_| SearchCallbacks::new());
    for (i, rt) in runtimes.iter_mut().enumerate() {
        rt.set_local_load(i as f64);
    }

    runtimes[0].start_load_log().unwrap();
    pump_all(&mut runtimes);

    let rounds = |rt: &RankRuntime<LoopbackEndpoint>| -> Vec<u64> {
        rt.load_log().iter().map(|entry| entry.round).collect()
    };
    // The origin injects the round-0 token without appending for it.
    assert_eq!(rounds(&runtimes[0]), vec![1, 2]);
    assert_eq!(rounds(&runtimes[1]), vec![0, 1, 2]);
    assert_eq!(rounds(&runtimes[2]), vec![0, 1, 2]);

    for rt in &runtimes {
        assert_eq!(
            rt.role_state(RoleKind::LoadLogChain),
            Some(ThreadState::Dormant)
        );
        assert!(rt
            .load_log()
            .iter()
            .all(|entry| entry.rank == rt.rank() && entry.load == rt.rank().0 as f64));
    }
}

#[test]
fn repositories_merge_toward_the_hub() {
    let mut config = SearchConfig::default();
    config.features.enumeration = true;

    let mut runtimes = build_cluster(3, &config, |_| SearchCallbacks::new());

    let record = |id: u64| SolutionRecord {
        id,
        value: id as f64,
        packed: vec![id as u8],
    };
    // Overlapping solution sets on the two leaf ranks.
    runtimes[1].shared.repository.insert(record(1));
    runtimes[1].shared.repository.insert(record(2));
    runtimes[2].shared.repository.insert(record(2));
    runtimes[2].shared.repository.insert(record(3));

    for rt in &runtimes {
        rt.flush_repository().unwrap();
    }
    pump_all(&mut runtimes);

    let merged = runtimes[0].repository();
    assert_eq!(merged.len(), 3);
    for id in 1..=3 {
        assert!(merged.contains(id));
    }
    assert_eq!(
        runtimes[0].role_state(RoleKind::RepoMerge),
        Some(ThreadState::Dormant)
    );
}

#[test]
fn large_repository_ships_in_buffer_sized_fragments() {
    let mut config = SearchConfig::default();
    config.features.enumeration = true;
    // A one-solution batch: the whole repository cannot fit one fragment.
    config.buffers.repository_batch = 1;

    let packed_len = config.buffers.max_solution_bytes;
    let mut runtimes = build_cluster(2, &config, |_| SearchCallbacks::new());

    for id in 1..=3 {
        runtimes[1].shared.repository.insert(SolutionRecord {
            id,
            value: id as f64,
            packed: vec![id as u8; packed_len],
        });
    }

    runtimes[1].flush_repository().unwrap();
    pump_all(&mut runtimes);

    let merged = runtimes[0].repository();
    assert_eq!(merged.len(), 3);
    assert_eq!(
        runtimes[0].role_state(RoleKind::RepoMerge),
        Some(ThreadState::Dormant)
    );
}

#[test]
fn early_output_handshake_confirms_the_incumbent() {
    let mut config = SearchConfig::default();
    config.features.early_output = true;

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&emitted);
    let mut runtimes = build_cluster(2, &config, move |_| {
        let sink = Arc::clone(&sink);
        SearchCallbacks::new().on_early_output(move |value| {
            sink.lock().unwrap().push(value);
        })
    });

    // The worker improves the incumbent, then asks for early output.
    runtimes[1].broadcast_incumbent(42.0).unwrap();
    pump_all(&mut runtimes);
    assert_eq!(runtimes[0].incumbent().value, 42.0);

    runtimes[1].request_early_output().unwrap();
    pump_all(&mut runtimes);

    assert_eq!(emitted.lock().unwrap().as_slice(), &[42.0]);
}

#[test]
fn several_ranks_confirm_the_same_incumbent() {
    let mut config = SearchConfig::default();
    config.features.early_output = true;

    let emitted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&emitted);
    let mut runtimes = build_cluster(3, &config, move |rank| {
        let sink = Arc::clone(&sink);
        SearchCallbacks::new().on_early_output(move |value| {
            sink.lock().unwrap().push((rank, value));
        })
    });

    runtimes[1].broadcast_incumbent(42.0).unwrap();
    pump_all(&mut runtimes);

    // Two workers ask to emit the same confirmed value before either
    // handshake completes.
    runtimes[1].request_early_output().unwrap();
    runtimes[2].request_early_output().unwrap();
    pump_all(&mut runtimes);

    let mut emitted = emitted.lock().unwrap().clone();
    emitted.sort_by_key(|(rank, _)| rank.0);
    assert_eq!(emitted, vec![(Rank(1), 42.0), (Rank(2), 42.0)]);
}

#[test]
fn superseded_early_output_request_is_not_delivered() {
    let mut config = SearchConfig::default();
    config.features.early_output = true;

    let mut endpoints = LoopbackCluster::new(2).into_iter();
    let mut coordinator =
        RankRuntime::new(config, endpoints.next().unwrap(), SearchCallbacks::new()).unwrap();
    let worker_side = endpoints.next().unwrap();

    // The coordinator learns of a better incumbent first.
    let better = wire::encode(&IncumbentUpdate {
        value: 40.0,
        seq: 1,
        origin: Rank(1),
    })
    .unwrap();
    worker_side
        .send(
            Rank(0),
            Envelope::new(coordinator.tags().incumbent.0, Rank(1), better),
        )
        .unwrap();
    while coordinator.poll().unwrap() != Tick::Idle {}
    assert_eq!(coordinator.incumbent().value, 40.0);

    // A request carrying the value that improvement overtook.
    let stale = wire::encode(&EarlyOutputMsg::Request {
        value: 42.0,
        seq: 7,
    })
    .unwrap();
    worker_side
        .send(
            Rank(0),
            Envelope::new(coordinator.tags().early_output.0, Rank(1), stale),
        )
        .unwrap();
    while coordinator.poll().unwrap() != Tick::Idle {}

    // No Deliver comes back.
    assert!(worker_side.try_recv().unwrap().is_none());
}

#[test]
#[should_panic(expected = "early-output confirm received before deliver")]
fn confirm_before_deliver_aborts_the_coordinator() {
    let mut config = SearchConfig::default();
    config.features.early_output = true;

    let mut endpoints = LoopbackCluster::new(2).into_iter();
    let mut coordinator = RankRuntime::new(
        config,
        endpoints.next().unwrap(),
        SearchCallbacks::new(),
    )
    .unwrap();
    let rogue = endpoints.next().unwrap();

    let confirm = wire::encode(&EarlyOutputMsg::Confirm { seq: 0 }).unwrap();
    rogue
        .send(
            Rank(0),
            Envelope::new(coordinator.tags().early_output.0, Rank(1), confirm),
        )
        .unwrap();

    while coordinator.poll().unwrap() != Tick::Idle {}
}
