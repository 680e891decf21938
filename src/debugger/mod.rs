//! The dialog debug adapter: engine facing step hook and turn lifecycle, session state shared
//! with the protocol dispatcher.

pub mod arena;
pub mod breakpoint;
pub mod code;
mod dispatch;
pub mod error;
pub mod events;
pub mod identifier;
pub mod source_map;
pub mod thread;
pub mod utils;
pub mod variable;

pub use error::Error;

use crate::config::Config;
use crate::dap::path_map::PathMap;
use crate::dap::protocol::{
    Breakpoint, BreakpointEventBody, ContinuedEventBody, DapEvent, OutputEventBody, Source,
    StoppedEventBody, ThreadEventBody,
};
use crate::dap::tracer::FileTracer;
use crate::dap::{DebugTransport, Listener};
use crate::debugger::arena::Arena;
use crate::debugger::code::{CodeModel, CodePoint, DefaultCodeModel, DialogContext, ItemRef, Turn};
use crate::debugger::events::EventFilters;
use crate::debugger::identifier::{decode, encode, Identifier};
use crate::debugger::source_map::{Breakpoints, DebuggerSourceMap, SourceMap};
use crate::debugger::thread::{Phase, ThreadModel};
use crate::debugger::utils::{ellipsis, lock};
use crate::debugger::variable::{Inspector, Value};
use crate::log::{DapLogger, LOGGER_SWITCHER};
use crate::{muted_error, weak_error};
use log::{debug, error, info};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Called on `terminate` (or `disconnect` with `terminateDebuggee`).
pub type TerminateFn = Arc<dyn Fn() + Send + Sync>;

const TURN_TEXT_WIDTH: usize = 18;
const TAG_WIDTH: usize = 16;

/// Options of the current debug session, set by `launch`/`attach`.
#[derive(Debug, Clone, Default)]
struct Options {
    break_on_start: bool,
    path_map: PathMap,
}

pub struct AdapterBuilder {
    code_model: Arc<dyn CodeModel>,
    terminate: TerminateFn,
    tracer: Option<FileTracer>,
    break_on_start: bool,
    output_cache: NonZeroUsize,
    event_filters: Vec<String>,
}

impl Default for AdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterBuilder {
    pub fn new() -> Self {
        let config = Config::default();
        Self {
            code_model: Arc::new(DefaultCodeModel),
            terminate: Arc::new(|| std::process::exit(0)),
            tracer: None,
            break_on_start: config.break_on_start,
            output_cache: NonZeroUsize::new(config.output_cache).unwrap_or(NonZeroUsize::MIN),
            event_filters: config.exception_filters,
        }
    }

    /// Builder preset from a loaded configuration, the trace file is opened here.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let tracer = match &config.trace_file {
            Some(path) => Some(FileTracer::open(path)?),
            None => None,
        };
        Ok(Self {
            tracer,
            break_on_start: config.break_on_start,
            output_cache: NonZeroUsize::new(config.output_cache).unwrap_or(NonZeroUsize::MIN),
            event_filters: config.exception_filters.clone(),
            ..Self::new()
        })
    }

    pub fn code_model(self, code_model: Arc<dyn CodeModel>) -> Self {
        Self { code_model, ..self }
    }

    pub fn terminate(self, terminate: TerminateFn) -> Self {
        Self { terminate, ..self }
    }

    pub fn tracer(self, tracer: FileTracer) -> Self {
        Self {
            tracer: Some(tracer),
            ..self
        }
    }

    /// Stop on the first step of every turn when the client does not say otherwise.
    pub fn break_on_start(self, break_on_start: bool) -> Self {
        Self {
            break_on_start,
            ..self
        }
    }

    pub fn output_cache(self, output_cache: NonZeroUsize) -> Self {
        Self {
            output_cache,
            ..self
        }
    }

    pub fn event_filters(self, event_filters: Vec<String>) -> Self {
        Self {
            event_filters,
            ..self
        }
    }

    pub fn build(self) -> Arc<DialogDebugAdapter> {
        let output = Arc::new(Arena::bounded(self.output_cache));
        let mut arenas = Identifier::new();
        arenas.add(output.clone());

        Arc::new(DialogDebugAdapter {
            transport: Arc::new(DebugTransport::new(self.tracer)),
            seq: AtomicI64::new(0),
            source_map: Arc::new(DebuggerSourceMap::new(self.code_model.clone())),
            code_model: self.code_model,
            events: EventFilters::new(&self.event_filters),
            options: Mutex::default(),
            default_break_on_start: self.break_on_start,
            threads: Mutex::default(),
            thread_by_turn: Mutex::default(),
            arenas: Mutex::new(arenas),
            output,
            terminate: self.terminate,
            listener: Mutex::default(),
            inspector: Inspector::global(),
        })
    }
}

/// Debug adapter shared by the engine (step hook, turn lifecycle) and the protocol dispatcher.
pub struct DialogDebugAdapter {
    transport: Arc<DebugTransport>,
    seq: AtomicI64,
    code_model: Arc<dyn CodeModel>,
    source_map: Arc<DebuggerSourceMap>,
    events: EventFilters,
    options: Mutex<Options>,
    default_break_on_start: bool,
    threads: Mutex<Identifier<ThreadModel>>,
    thread_by_turn: Mutex<HashMap<String, Arc<ThreadModel>>>,
    arenas: Mutex<Identifier<Arena>>,
    output: Arc<Arena>,
    terminate: TerminateFn,
    listener: Mutex<Option<Listener>>,
    inspector: &'static Inspector,
}

/// Keeps a turn registered as a debugger thread, the thread exits on drop.
pub struct TurnGuard {
    adapter: Arc<DialogDebugAdapter>,
    thread: Arc<ThreadModel>,
}

impl TurnGuard {
    /// Protocol id of the thread.
    pub fn thread_id(&self) -> Option<u64> {
        lock(&self.adapter.threads).code_of(&self.thread)
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.adapter.end_turn(&self.thread);
    }
}

impl DialogDebugAdapter {
    pub fn builder() -> AdapterBuilder {
        AdapterBuilder::new()
    }

    /// Registry the engine records item declarations into.
    pub fn source_map(&self) -> Arc<DebuggerSourceMap> {
        self.source_map.clone()
    }

    /// Accept debugger clients on `addr`, one at a time, until [`Self::shutdown`].
    ///
    /// An adapter listens once, a second call fails.
    pub fn listen(self: &Arc<Self>, addr: impl ToSocketAddrs) -> Result<SocketAddr, Error> {
        let mut current = lock(&self.listener);
        if current.is_some() || self.transport.is_cancelled() {
            return Err(Error::IO(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "debug adapter already listening",
            )));
        }

        let adapter = Arc::downgrade(self);
        let listener = self.transport.listen(addr, move || match adapter.upgrade() {
            Some(adapter) => adapter.serve(),
            None => Ok(()),
        })?;

        let local_addr = listener.local_addr();
        *current = Some(listener);
        Ok(local_addr)
    }

    /// Stop listening, forget the client configuration and release every paused turn.
    pub fn shutdown(&self) {
        let listener = lock(&self.listener).take();
        if let Some(mut listener) = listener {
            listener.shutdown();
        }
        self.reset_on_disconnect();
    }

    /// Mirror log records to the attached client as console output.
    pub fn install_logger(self: &Arc<Self>) {
        let adapter = Arc::downgrade(self);
        let logger = DapLogger::new(move |text: String| {
            if let Some(adapter) = adapter.upgrade() {
                adapter.emit(
                    "output",
                    OutputEventBody {
                        category: "console",
                        output: text,
                        source: None,
                        line: None,
                        variables_reference: 0,
                    },
                );
            }
        });
        let filter = logger.filter();
        LOGGER_SWITCHER.switch(logger, filter);
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Register `turn` as a debugger thread for the guard lifetime.
    pub fn begin_turn(self: &Arc<Self>, turn: Turn) -> TurnGuard {
        let turn_id = turn.id();
        let thread = Arc::new(ThreadModel::new(turn, self.code_model.clone()));

        lock(&self.arenas).add(thread.arena().clone());
        lock(&self.threads).add(thread.clone());
        lock(&self.thread_by_turn).insert(turn_id, thread.clone());

        thread.run().post(Phase::Started);
        self.report_phase(&thread, None);

        TurnGuard {
            adapter: self.clone(),
            thread,
        }
    }

    /// Run `f` as the turn `turn`.
    pub fn on_turn<R>(self: &Arc<Self>, turn: Turn, f: impl FnOnce() -> R) -> R {
        let _guard = self.begin_turn(turn);
        f()
    }

    fn end_turn(&self, thread: &Arc<ThreadModel>) {
        thread.run().post(Phase::Exited);
        self.report_phase(thread, None);

        {
            let mut by_turn = lock(&self.thread_by_turn);
            let turn_id = thread.turn().id();
            if by_turn
                .get(&turn_id)
                .map(|t| Arc::ptr_eq(t, thread))
                .unwrap_or(false)
            {
                by_turn.remove(&turn_id);
            }
        }
        lock(&self.threads).remove(thread);
        lock(&self.arenas).remove(thread.arena());
    }

    /// Step hook, called by the engine before it evaluates `item`.
    ///
    /// Blocks while the turn is stopped. Failures are logged, never returned to the engine.
    pub fn step(&self, context: &Arc<dyn DialogContext>, item: &ItemRef, more: &str) {
        weak_error!(self.step_inner(context, item, more), "step:");
    }

    fn step_inner(
        &self,
        context: &Arc<dyn DialogContext>,
        item: &ItemRef,
        more: &str,
    ) -> Result<(), Error> {
        let turn_id = context.turn_id();
        let thread = lock(&self.thread_by_turn).get(&turn_id).cloned();

        let turn_text = match &thread {
            Some(thread) => thread.turn().label().to_string(),
            None => turn_id.clone(),
        };
        self.output(
            &format!(
                "'{}' ==> {:<width$} ==> {}",
                ellipsis(&turn_text, TURN_TEXT_WIDTH),
                more,
                self.code_model.name_for(item),
                width = TAG_WIDTH,
            ),
            Some(item),
            &Value::Null,
        );

        self.update_breakpoints();

        let Some(thread) = thread else {
            error!(target: "debugger", "thread context not found for turn `{turn_id}`");
            return Ok(());
        };

        thread.set_last(context.clone(), item.clone(), more);

        let run = thread.run();
        let on_event = self.is_connected() && self.events.is_enabled(more);
        if self.source_map.is_breakpoint(item) || on_event {
            run.post(Phase::Breakpoint);
        }
        let first_step = thread.count_step() == 0;
        if first_step && lock(&self.options).break_on_start {
            run.post(Phase::Breakpoint);
        }

        self.report_phase(&thread, Some(item));
        run.wait();

        // `started` only announced the thread to the client
        run.transition(Phase::Started, Phase::Continue);
        self.report_phase(&thread, Some(item));

        // one step is allowed after `next`, the following one stops again
        run.transition(Phase::Next, Phase::Step);
        Ok(())
    }

    /// Print `text` on the client console, attributed to the declaration of `item`.
    ///
    /// A non scalar `value` can be expanded by the client.
    pub fn output(&self, text: &str, item: Option<&ItemRef>, value: &Value) {
        weak_error!(self.send_output(text, item, value), "output:");
    }

    fn send_output(&self, text: &str, item: Option<&ItemRef>, value: &Value) -> Result<(), Error> {
        let range = item.and_then(|item| self.source_map.try_get(item));
        let variables_reference = self.encode_value(&self.output, value)?;
        let body = OutputEventBody {
            category: "console",
            output: format!("{text}\n"),
            source: range.as_ref().map(|range| self.client_source(&range.path)),
            line: range.as_ref().map(|range| range.start.line),
            variables_reference,
        };
        self.emit("output", body);
        Ok(())
    }

    fn update_breakpoints(&self) {
        for breakpoint in self.source_map.apply_updates() {
            let item = self.source_map.item_for(&breakpoint);
            self.emit(
                "breakpoint",
                BreakpointEventBody {
                    reason: "changed",
                    breakpoint: self.client_breakpoint(breakpoint.clone()),
                },
            );
            if let (true, Some(item)) = (breakpoint.verified, item) {
                self.announce_breakpoint(&item);
            }
        }
    }

    fn announce_breakpoint(&self, item: &ItemRef) {
        self.output(
            &format!("Set breakpoint at {}", self.code_model.name_for(item)),
            Some(item),
            &Value::Null,
        );
    }

    /// Send events for the thread phase unless it was already reported.
    fn report_phase(&self, thread: &Arc<ThreadModel>, item: Option<&ItemRef>) {
        let Some(phase) = thread.run().take_unreported() else {
            return;
        };
        let Some(thread_id) = lock(&self.threads).code_of(thread) else {
            return;
        };

        let mut thread_text = ellipsis(&thread.name(), TURN_TEXT_WIDTH);
        if thread_text.chars().count() <= 2 {
            thread_text = thread.turn().activity_type.clone();
        }
        let suffix = item
            .map(|item| format!(" ==> {}", self.code_model.name_for(item)))
            .unwrap_or_default();
        let description = format!(
            "{thread_text} ==> {:<width$}{suffix}",
            phase.to_string(),
            width = TAG_WIDTH
        );
        self.output(&description, item, &Value::Null);

        let phase = if phase == Phase::Next {
            Phase::Continue
        } else {
            phase
        };
        match phase {
            Phase::Started | Phase::Exited => self.emit(
                "thread",
                ThreadEventBody {
                    reason: if phase == Phase::Started {
                        "started"
                    } else {
                        "exited"
                    },
                    thread_id,
                },
            ),
            Phase::Continue => self.emit(
                "continued",
                ContinuedEventBody {
                    thread_id,
                    all_threads_continued: false,
                },
            ),
            _ => self.emit(
                "stopped",
                StoppedEventBody {
                    reason: phase.to_string(),
                    description: description.clone(),
                    thread_id,
                    text: description,
                    preserve_focus_hint: false,
                    all_threads_stopped: false,
                },
            ),
        }
    }

    fn live_threads(&self) -> Vec<(u64, Arc<ThreadModel>)> {
        lock(&self.threads)
            .iter()
            .map(|(code, thread)| (code, thread.clone()))
            .collect()
    }

    fn continue_all(&self) {
        for (_, thread) in self.live_threads() {
            thread.run().post(Phase::Continue);
        }
    }

    /// Forget everything the last client configured and let paused turns run.
    fn reset_on_disconnect(&self) {
        *lock(&self.options) = Options::default();
        self.source_map.clear();
        self.output.clear();
        self.events.restore_defaults();
        self.continue_all();
        debug!(target: "debugger", "session state reset");
    }

    fn thread(&self, thread_id: u64) -> Result<Arc<ThreadModel>, Error> {
        lock(&self.threads)
            .get(thread_id)
            .ok_or(Error::ThreadNotFound(thread_id))
    }

    fn encode_value(&self, arena: &Arc<Arena>, value: &Value) -> Result<u64, Error> {
        let Some(object) = value.as_object() else {
            return Ok(0);
        };
        if self.inspector.is_scalar(value) {
            return Ok(0);
        }

        let arena_code = lock(&self.arenas)
            .code_of(arena)
            .ok_or(Error::ArenaNotFound(0))?;
        let value_code = arena.add(object.clone());
        encode(arena_code, value_code)
    }

    fn decode_value(&self, reference: u64) -> Result<(Arc<Arena>, Value), Error> {
        let (arena_code, value_code) = decode(reference)?;
        let arena = lock(&self.arenas)
            .get(arena_code)
            .ok_or(Error::ArenaNotFound(arena_code))?;
        let object = arena.get(value_code)?;
        Ok((arena, Value::Object(object)))
    }

    fn encode_frame(&self, thread: &Arc<ThreadModel>, frame: &Arc<CodePoint>) -> Result<u64, Error> {
        let thread_code = lock(&self.threads)
            .code_of(thread)
            .ok_or(Error::ThreadNotFound(0))?;
        encode(thread_code, thread.frame_code(frame))
    }

    fn decode_frame(&self, frame_id: u64) -> Result<(Arc<ThreadModel>, Arc<CodePoint>), Error> {
        let (thread_code, frame_code) = decode(frame_id)?;
        let thread = self.thread(thread_code)?;
        let frame = thread.frame(frame_code)?;
        Ok((thread, frame))
    }

    fn client_source(&self, engine_path: &str) -> Source {
        let options = lock(&self.options);
        Source::from_path(&options.path_map.to_client(engine_path))
    }

    fn client_breakpoint(&self, mut breakpoint: Breakpoint) -> Breakpoint {
        if let Some(path) = breakpoint.source.as_ref().and_then(|s| s.path.clone()) {
            breakpoint.source = Some(self.client_source(&path));
        }
        breakpoint
    }

    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn send_event(&self, event: &'static str, body: impl Serialize) -> Result<(), Error> {
        let body = serde_json::to_value(body)?;
        let event = DapEvent::new(self.next_seq(), event, Some(body));
        self.transport.send(&serde_json::to_value(event)?)?;
        Ok(())
    }

    /// Send an event from an engine thread, a failure is only logged.
    fn emit(&self, event: &'static str, body: impl Serialize) {
        muted_error!(self.send_event(event, body), "emit:");
    }

    fn log_session(&self, message: &str) {
        info!(target: "debugger", "{message}");
    }
}
