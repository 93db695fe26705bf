use super::shared::{WorkerShared, WorkerSharedParams};
use super::Worker;
use crate::engine::control::{Gate, PoolState, PoolStateCell};
use crate::runtime::contract::{ExecuteFuture, ExecutionUnit};
use crate::runtime::hooks::PoolHooks;
use crate::runtime::telemetry::Telemetry;
use crate::work::backlog::Backlog;
use crate::work::disposition::Disposition;
use crate::work::state::{RunState, RunStateTable, WorkerStatus};
use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

enum Step {
    Ready(Result<Disposition>),
    Hang,
}

/// Execution unit that replays a script of verdicts, recording every call.
struct ScriptUnit {
    steps: VecDeque<Step>,
    calls: Arc<Mutex<Vec<u32>>>,
}

impl ScriptUnit {
    fn new(steps: Vec<Step>) -> (Self, Arc<Mutex<Vec<u32>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                steps: steps.into(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl ExecutionUnit<u32> for ScriptUnit {
    fn execute<'a>(&'a mut self, item: &'a u32, _cancel: &'a CancellationToken) -> ExecuteFuture<'a> {
        self.calls.lock().unwrap().push(*item);
        let step = self
            .steps
            .pop_front()
            .unwrap_or(Step::Ready(Ok(Disposition::next())));
        Box::pin(async move {
            match step {
                Step::Ready(result) => result,
                Step::Hang => {
                    futures::future::pending::<()>().await;
                    unreachable!("hanging step never completes")
                }
            }
        })
    }
}

struct Rig {
    backlog: Arc<Backlog<u32>>,
    pool_state: Arc<PoolStateCell>,
    gate: Gate,
    cancel_tx: watch::Sender<CancellationToken>,
    telemetry: Arc<Telemetry>,
    // (item, success) in notification order
    events: Arc<Mutex<Vec<(u32, bool)>>>,
}

fn build_rig(
    items: Vec<u32>,
    hooks: Option<PoolHooks<u32>>,
) -> (Rig, WorkerShared<u32>, Arc<RunState>, watch::Receiver<WorkerStatus>) {
    let backlog = Arc::new(Backlog::new());
    backlog.extend(items);
    let (states, mut requested_rxs) = RunStateTable::new(1);
    let states = Arc::new(states);
    let pool_state = Arc::new(PoolStateCell::new());
    pool_state.transition(PoolState::Running);
    let gate = Gate::new();
    let (cancel_tx, cancel_rx) = watch::channel(CancellationToken::new());
    let telemetry = Arc::new(Telemetry::default());
    let events: Arc<Mutex<Vec<(u32, bool)>>> = Arc::new(Mutex::new(Vec::new()));

    let recorded = events.clone();
    let hooks = hooks.unwrap_or_else(PoolHooks::new).on_item_finished(move |item, error| {
        recorded.lock().unwrap().push((*item, error.is_none()));
    });

    let shared = WorkerShared::new(WorkerSharedParams {
        backlog: backlog.clone(),
        states: states.clone(),
        pool_state: pool_state.clone(),
        hooks,
        telemetry: telemetry.clone(),
        cancel_rx,
        gate: gate.subscribe(),
    });

    let requested_rx = requested_rxs.remove(0);
    let state = states.get(0).clone();
    let rig = Rig {
        backlog,
        pool_state,
        gate,
        cancel_tx,
        telemetry,
        events,
    };
    (rig, shared, state, requested_rx)
}

#[tokio::test]
async fn worker_finishes_when_backlog_drains() {
    let (rig, shared, state, requested_rx) = build_rig(vec![1, 2, 3], None);
    let (unit, calls) = ScriptUnit::new(vec![]);
    let worker = Worker::new(0, Box::new(unit), state.clone(), requested_rx, shared);

    let outcome = timeout(Duration::from_secs(1), worker.run())
        .await
        .expect("worker should finish");
    assert!(outcome.is_success());
    assert_eq!(state.current(), WorkerStatus::Finished);
    assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(
        *rig.events.lock().unwrap(),
        vec![(1, true), (2, true), (3, true)]
    );
    assert_eq!(rig.telemetry.items_completed(), 3);
    assert!(rig.backlog.is_empty());
}

#[tokio::test]
async fn retry_same_reprocesses_the_identical_item() {
    let (rig, shared, state, requested_rx) = build_rig(vec![9], None);
    let (unit, calls) = ScriptUnit::new(vec![
        Step::Ready(Ok(Disposition::retry_same())),
        Step::Ready(Ok(Disposition::next())),
    ]);
    let worker = Worker::new(0, Box::new(unit), state, requested_rx, shared);

    let outcome = timeout(Duration::from_secs(1), worker.run()).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(*calls.lock().unwrap(), vec![9, 9]);
    assert_eq!(*rig.events.lock().unwrap(), vec![(9, false), (9, true)]);
    assert_eq!(rig.telemetry.items_retried(), 1);
    assert_eq!(rig.telemetry.items_completed(), 1);
}

#[tokio::test]
async fn retry_other_requeues_at_the_tail() {
    let (rig, shared, state, requested_rx) = build_rig(vec![1, 2], None);
    let (unit, calls) = ScriptUnit::new(vec![Step::Ready(Ok(Disposition::retry_other()))]);
    let worker = Worker::new(0, Box::new(unit), state, requested_rx, shared);

    let outcome = timeout(Duration::from_secs(1), worker.run()).await.unwrap();
    assert!(outcome.is_success());
    // 1 is deferred behind 2, then reattempted.
    assert_eq!(*calls.lock().unwrap(), vec![1, 2, 1]);
    assert_eq!(rig.telemetry.items_requeued(), 1);
    assert_eq!(rig.telemetry.items_completed(), 2);
}

#[tokio::test]
async fn raised_error_aborts_the_worker_and_requeues_the_item() {
    let (rig, shared, state, requested_rx) = build_rig(vec![5], None);
    let (unit, _calls) = ScriptUnit::new(vec![Step::Ready(Err(anyhow!("backend down")))]);
    let worker = Worker::new(0, Box::new(unit), state.clone(), requested_rx, shared);

    let outcome = timeout(Duration::from_secs(1), worker.run()).await.unwrap();
    assert!(!outcome.is_success());
    assert!(outcome.error().unwrap().to_string().contains("backend down"));
    assert_eq!(state.current(), WorkerStatus::Failed);
    assert_eq!(state.failure().unwrap().to_string(), "backend down");
    // The item returns to the backlog for other workers.
    assert_eq!(rig.backlog.try_pop(), Some(5));
    assert_eq!(*rig.events.lock().unwrap(), vec![(5, false)]);
    assert_eq!(rig.telemetry.worker_failures(), 1);
}

#[tokio::test]
async fn exception_policy_overrides_the_default_abort() {
    let hooks = PoolHooks::new().on_exception(|_error, _item: &u32| Disposition::retry_other());
    let (rig, shared, state, requested_rx) = build_rig(vec![7], Some(hooks));
    let (unit, calls) = ScriptUnit::new(vec![Step::Ready(Err(anyhow!("transient")))]);
    let worker = Worker::new(0, Box::new(unit), state, requested_rx, shared);

    let outcome = timeout(Duration::from_secs(1), worker.run()).await.unwrap();
    assert!(outcome.is_success(), "policy downgraded the error to a retry");
    assert_eq!(*calls.lock().unwrap(), vec![7, 7]);
    assert_eq!(rig.telemetry.items_requeued(), 1);
    assert_eq!(rig.telemetry.worker_failures(), 0);
}

#[tokio::test]
async fn pause_parks_the_worker_and_resume_replays_the_held_item() {
    let (rig, shared, state, requested_rx) = build_rig(vec![1], None);
    let (unit, calls) = ScriptUnit::new(vec![]);
    state.request(WorkerStatus::Paused);
    let worker = Worker::new(0, Box::new(unit), state.clone(), requested_rx, shared);
    let handle = tokio::spawn(worker.run());

    timeout(Duration::from_secs(1), async {
        while state.current() != WorkerStatus::Paused {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker should report paused");
    assert_eq!(rig.pool_state.current(), PoolState::Paused);
    assert!(calls.lock().unwrap().is_empty(), "no item runs while paused");

    state.request(WorkerStatus::Running);
    let outcome = timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker should resume and finish")
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(*calls.lock().unwrap(), vec![1]);
    assert_eq!(rig.pool_state.current(), PoolState::Running);
}

#[tokio::test]
async fn stop_request_terminates_without_processing() {
    let (rig, shared, state, requested_rx) = build_rig(vec![1, 2], None);
    let (unit, calls) = ScriptUnit::new(vec![]);
    state.request(WorkerStatus::Stopped);
    let worker = Worker::new(0, Box::new(unit), state.clone(), requested_rx, shared);

    let outcome = timeout(Duration::from_secs(1), worker.run()).await.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(state.current(), WorkerStatus::Stopped);
    assert!(calls.lock().unwrap().is_empty());
    assert!(rig.events.lock().unwrap().is_empty());
    // The backlog is abandoned, not drained.
    assert_eq!(rig.backlog.len(), 2);
}

#[tokio::test]
async fn cancellation_mid_execute_is_reinterpreted_as_retry_same() {
    let (rig, shared, state, requested_rx) = build_rig(vec![4], None);
    let (unit, calls) = ScriptUnit::new(vec![Step::Hang, Step::Ready(Ok(Disposition::next()))]);
    let worker = Worker::new(0, Box::new(unit), state, requested_rx, shared);
    let handle = tokio::spawn(worker.run());

    timeout(Duration::from_secs(1), async {
        while calls.lock().unwrap().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first execute should start");

    // Cancel the in-flight execute and rotate a fresh token, the way the
    // controller does on resume. No await between the two sends keeps the
    // rotation atomic from the worker's point of view.
    rig.cancel_tx.borrow().cancel();
    let _ = rig.cancel_tx.send(CancellationToken::new());

    let outcome = timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker should retry and finish")
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(*calls.lock().unwrap(), vec![4, 4], "same item is retried");
    assert_eq!(rig.telemetry.items_retried(), 1);
    assert_eq!(rig.telemetry.items_completed(), 1);
    // The retry notification fires before the success.
    assert_eq!(*rig.events.lock().unwrap(), vec![(4, false), (4, true)]);
}

#[tokio::test]
async fn gate_holds_workers_between_iterations() {
    let (rig, shared, state, requested_rx) = build_rig(vec![1, 2], None);
    let (unit, calls) = ScriptUnit::new(vec![]);
    rig.gate.close();
    let worker = Worker::new(0, Box::new(unit), state, requested_rx, shared);
    let handle = tokio::spawn(worker.run());

    sleep(Duration::from_millis(30)).await;
    assert!(calls.lock().unwrap().is_empty(), "gate closed; nothing runs");

    rig.gate.open();
    let outcome = timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker should run once the gate opens")
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
}
