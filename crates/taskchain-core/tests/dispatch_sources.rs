mod common;

use common::{executor, Event, FailPoint, MemoryStore, Recorder};
use std::sync::Arc;
use std::time::Duration;
use taskchain_core::scheduler::{
    ActiveChains, ExecutionLock, Poller, SignalListener, WorkerPool,
};
use taskchain_core::{
    BuiltinRegistry, Chain, ChainQueue, ChainRunResult, ChainSignal, RunStatus, SignalCommand,
    TaskKind,
};
use tokio_util::sync::CancellationToken;

fn start(config_id: i64) -> ChainSignal {
    ChainSignal {
        command: SignalCommand::Start,
        config_id,
    }
}

fn stop(config_id: i64) -> ChainSignal {
    ChainSignal {
        command: SignalCommand::Stop,
        config_id,
    }
}

#[tokio::test]
async fn test_start_signal_queues_chain() {
    let store = MemoryStore::new();
    store.add_chain(Chain::new(20, 2, "signalled"));
    let queue = ChainQueue::new(4);
    let listener = SignalListener::new(store.clone(), queue.sender(), ActiveChains::new());

    store.signal(start(99));
    store.signal(start(2));
    store.signal(ChainSignal::shutdown());
    listener.run(CancellationToken::new()).await;

    // the unknown configuration was skipped
    let chain = queue.receiver().recv().await.unwrap();
    assert_eq!(chain.chain_id, 20);
}

#[tokio::test]
async fn test_listener_stops_on_shutdown() {
    let store = MemoryStore::new();
    let queue = ChainQueue::new(1);
    let listener = SignalListener::new(store.clone(), queue.sender(), ActiveChains::new());

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), listener.run(shutdown))
        .await
        .expect("listener should stop");
}

#[tokio::test(start_paused = true)]
async fn test_stop_signal_cancels_running_chain() {
    let store = MemoryStore::new();
    let command_id = store.add_element(3, TaskKind::Builtin, "Record", false);
    store.add_param(command_id, "long");
    store.add_param(command_id, "60000");

    let mut builtins = BuiltinRegistry::empty();
    builtins.register("Record", Arc::new(Recorder::default()));
    let active = ActiveChains::new();
    let pool = WorkerPool::new(
        store.clone(),
        executor(&store, builtins),
        ExecutionLock::new(),
        Arc::clone(&active),
    );

    let shutdown = CancellationToken::new();
    let run = {
        let pool = Arc::clone(&pool);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { pool.process(Chain::new(30, 3, "long"), &shutdown).await })
    };
    while !active.contains(3) {
        tokio::task::yield_now().await;
    }

    let queue = ChainQueue::new(1);
    let listener = SignalListener::new(store.clone(), queue.sender(), Arc::clone(&active));
    store.signal(stop(3));
    store.signal(stop(4));
    store.signal(ChainSignal::shutdown());
    listener.run(shutdown.clone()).await;

    assert_eq!(run.await.unwrap(), Some(ChainRunResult::Failed));
    assert!(active.is_empty());
    assert!(!shutdown.is_cancelled());

    let events = store.events();
    assert!(events.contains(&Event::Status(Some(command_id), RunStatus::ChainFailed)));
    assert_eq!(events.last(), Some(&Event::Rollback));
}

#[tokio::test]
async fn test_stop_without_running_chain_is_noop() {
    let active = ActiveChains::new();
    assert!(!active.cancel(42));
    assert!(active.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poller_spreads_large_batches() {
    let store = MemoryStore::new();
    let chains: Vec<_> = (1..=100).map(|id| Chain::new(id, id, "bulk")).collect();
    store.set_due(chains);

    let queue = ChainQueue::new(128);
    let poller = Poller::new(store.clone(), queue.sender(), 2, 5);

    let started = tokio::time::Instant::now();
    assert_eq!(poller.poll(false).await, 100);
    assert_eq!(started.elapsed(), Duration::from_secs(5));

    let receiver = queue.receiver();
    for expected in 1..=100 {
        assert_eq!(receiver.recv().await.unwrap().chain_id, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_poller_queues_small_batches_at_once() {
    let store = MemoryStore::new();
    store.set_reboot((1..=5).map(|id| Chain::new(id, id, "boot")).collect());
    store.set_due(vec![Chain::new(9, 9, "due")]);

    let queue = ChainQueue::new(8);
    let poller = Poller::new(store.clone(), queue.sender(), 2, 5);

    let started = tokio::time::Instant::now();
    assert_eq!(poller.poll(true).await, 5);
    assert_eq!(started.elapsed(), Duration::ZERO);

    // the reboot pass leaves due chains alone
    assert_eq!(poller.poll(false).await, 1);
}

#[tokio::test]
async fn test_poll_query_error_queues_nothing() {
    let store = MemoryStore::new();
    store.set_due(vec![Chain::new(1, 1, "due")]);
    store.set_reboot(vec![Chain::new(2, 2, "boot")]);
    store.fail(FailPoint::SelectChains);

    let queue = ChainQueue::new(8);
    let poller = Poller::new(store.clone(), queue.sender(), 2, 5);

    assert_eq!(poller.poll(true).await, 0);
    assert_eq!(poller.poll(false).await, 0);

    let receiver = queue.receiver();
    drop(poller);
    drop(queue);
    assert!(receiver.recv().await.is_none());
}
