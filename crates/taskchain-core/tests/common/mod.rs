//! In-memory job store that records every interaction

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskchain_core::scheduler::{ChainExecutor, TaskDispatcher};
use taskchain_core::{
    BuiltinRegistry, BuiltinTask, Chain, ChainElement, ChainError, ChainSignal, ChainStore,
    ProgramRunner, Result, RunStatus, RunStatusId, StatusSubject, StoreTransaction, TaskKind,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One observable store interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin,
    Commit,
    Rollback,
    RunCreated(i64),
    Status(Option<i64>, RunStatus),
    Log(i64, i32),
    Statement(i64),
    Delete(i64),
}

/// Store call that can be switched to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    SelectChains,
    Begin,
    FetchElements,
    FetchParams,
    CanProceed,
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    chains: HashMap<i64, Chain>,
    elements: HashMap<i64, Vec<ChainElement>>,
    params: HashMap<i64, Vec<String>>,
    due: Vec<Chain>,
    reboot: Vec<Chain>,
    open_runs: HashMap<i64, i64>,
    run_chain: HashMap<i64, i64>,
    failing: HashSet<FailPoint>,
}

impl State {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.failing.contains(&point) {
            return Err(ChainError::Execution(format!("{:?} unavailable", point)));
        }
        Ok(())
    }
}

/// Recording store backed by plain collections
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    signals: tokio::sync::Mutex<mpsc::UnboundedReceiver<ChainSignal>>,
    signal_tx: mpsc::UnboundedSender<ChainSignal>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let (signal_tx, signals) = mpsc::unbounded_channel();
        Arc::new(Self {
            state: Arc::new(Mutex::new(State::default())),
            signals: tokio::sync::Mutex::new(signals),
            signal_tx,
            next_id: AtomicI64::new(1),
        })
    }

    pub fn add_chain(&self, chain: Chain) {
        self.state.lock().unwrap().chains.insert(chain.task_id, chain);
    }

    /// Append an element; `script` is the routine name for builtins
    pub fn add_element(&self, task_id: i64, kind: TaskKind, script: &str, ignore_error: bool) -> i64 {
        let command_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let element =
            ChainElement::new(command_id, task_id, kind, script).with_ignore_error(ignore_error);
        self.state
            .lock()
            .unwrap()
            .elements
            .entry(task_id)
            .or_default()
            .push(element);
        command_id
    }

    pub fn add_param(&self, command_id: i64, value: &str) {
        self.state
            .lock()
            .unwrap()
            .params
            .entry(command_id)
            .or_default()
            .push(value.to_string());
    }

    pub fn set_due(&self, chains: Vec<Chain>) {
        self.state.lock().unwrap().due = chains;
    }

    pub fn set_reboot(&self, chains: Vec<Chain>) {
        self.state.lock().unwrap().reboot = chains;
    }

    pub fn signal(&self, signal: ChainSignal) {
        self.signal_tx.send(signal).unwrap();
    }

    /// Make every later call at `point` return an error
    pub fn fail(&self, point: FailPoint) {
        self.state.lock().unwrap().failing.insert(point);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl ChainStore for MemoryStore {
    async fn wait_for_signal(&self, shutdown: &CancellationToken) -> ChainSignal {
        let mut signals = self.signals.lock().await;
        tokio::select! {
            _ = shutdown.cancelled() => ChainSignal::shutdown(),
            signal = signals.recv() => signal.unwrap_or_else(ChainSignal::shutdown),
        }
    }

    async fn select_chain_by_config(&self, config_id: i64) -> Result<Chain> {
        self.state
            .lock()
            .unwrap()
            .chains
            .get(&config_id)
            .cloned()
            .ok_or(ChainError::ChainNotFound(config_id))
    }

    async fn select_due_chains(&self) -> Result<Vec<Chain>> {
        let mut state = self.state.lock().unwrap();
        state.check(FailPoint::SelectChains)?;
        Ok(std::mem::take(&mut state.due))
    }

    async fn select_reboot_chains(&self) -> Result<Vec<Chain>> {
        let mut state = self.state.lock().unwrap();
        state.check(FailPoint::SelectChains)?;
        Ok(std::mem::take(&mut state.reboot))
    }

    async fn can_proceed(&self, chain_id: i64, max_instances: i64) -> Result<bool> {
        if max_instances <= 0 {
            return Ok(true);
        }
        let state = self.state.lock().unwrap();
        state.check(FailPoint::CanProceed)?;
        let running = state.open_runs.get(&chain_id).copied().unwrap_or(0);
        Ok(running < max_instances)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        self.state.lock().unwrap().check(FailPoint::Begin)?;
        self.record(Event::Begin);
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
        }))
    }

    async fn create_run_status(&self, chain_id: i64, _task_id: i64) -> Result<RunStatusId> {
        let run = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        *state.open_runs.entry(chain_id).or_default() += 1;
        state.run_chain.insert(run, chain_id);
        state.events.push(Event::RunCreated(chain_id));
        Ok(RunStatusId(run))
    }

    async fn update_status(
        &self,
        run: RunStatusId,
        subject: StatusSubject<'_>,
        status: RunStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Status(subject.command_id(), status));

        let closes = subject.command_id().is_none() || status == RunStatus::ChainFailed;
        if closes && status.is_terminal() {
            if let Some(chain_id) = state.run_chain.remove(&run.0) {
                if let Some(open) = state.open_runs.get_mut(&chain_id) {
                    *open -= 1;
                }
            }
        }
        Ok(())
    }

    async fn write_execution_log(
        &self,
        element: &ChainElement,
        result_code: i32,
        _output: &str,
    ) -> Result<()> {
        self.record(Event::Log(element.command_id, result_code));
        Ok(())
    }

    async fn delete_chain_config(&self, chain_id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Delete(chain_id));
        state.chains.retain(|_, chain| chain.chain_id != chain_id);
        Ok(())
    }
}

/// SQL statements succeed unless the script is `fail`
struct MemoryTransaction {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn fetch_elements(&mut self, task_id: i64) -> Result<Vec<ChainElement>> {
        let state = self.state.lock().unwrap();
        state.check(FailPoint::FetchElements)?;
        Ok(state
            .elements
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_param_values(&mut self, element: &ChainElement) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        state.check(FailPoint::FetchParams)?;
        Ok(state
            .params
            .get(&element.command_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_statement(
        &mut self,
        element: &ChainElement,
        _params: &[String],
    ) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .events
            .push(Event::Statement(element.command_id));
        if element.script == "fail" {
            return Err(ChainError::Execution("statement failed".to_string()));
        }
        Ok("1 row(s) affected".to_string())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().events.push(Event::Commit);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().events.push(Event::Rollback);
        Ok(())
    }
}

/// Program runner that records scripts instead of spawning processes
#[derive(Default)]
pub struct FakePrograms {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ProgramRunner for FakePrograms {
    async fn run(&self, script: &str, _params: &[String], _cancel: &CancellationToken) -> Result<String> {
        self.calls.lock().unwrap().push(script.to_string());
        Ok(String::new())
    }
}

/// Builtin recording `(label, start, end)` for `[label, millis]` parameters
#[derive(Default)]
pub struct Recorder {
    pub spans: Mutex<Vec<(String, tokio::time::Instant, tokio::time::Instant)>>,
}

#[async_trait]
impl BuiltinTask for Recorder {
    async fn invoke(&self, params: &[String], cancel: &CancellationToken) -> Result<String> {
        let label = params.first().cloned().unwrap_or_default();
        let millis: u64 = params.get(1).and_then(|p| p.parse().ok()).unwrap_or(0);
        let start = tokio::time::Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(millis)) => {}
            _ = cancel.cancelled() => return Err(ChainError::Cancelled),
        }
        let end = tokio::time::Instant::now();
        self.spans.lock().unwrap().push((label, start, end));
        Ok(String::new())
    }
}

pub fn executor(store: &Arc<MemoryStore>, builtins: BuiltinRegistry) -> Arc<ChainExecutor> {
    executor_with(store, builtins, Arc::new(FakePrograms::default()), false)
}

pub fn executor_with(
    store: &Arc<MemoryStore>,
    builtins: BuiltinRegistry,
    programs: Arc<FakePrograms>,
    no_program_tasks: bool,
) -> Arc<ChainExecutor> {
    let store: Arc<dyn ChainStore> = store.clone();
    let dispatcher = TaskDispatcher::new(
        Arc::clone(&store),
        programs,
        Arc::new(builtins),
        no_program_tasks,
    );
    Arc::new(ChainExecutor::new(store, dispatcher))
}
