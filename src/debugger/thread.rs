//! Per turn run state: the phase machine, the blocking gate and the frames of the last step.

use crate::debugger::arena::Arena;
use crate::debugger::code::{CodeModel, CodePoint, DialogContext, ItemRef, Turn};
use crate::debugger::identifier::Identifier;
use crate::debugger::utils::lock;
use crate::debugger::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use strum_macros::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Started,
    Continue,
    Next,
    Step,
    Breakpoint,
    Pause,
    Exited,
}

impl Phase {
    /// Phases in which an engine thread may proceed.
    pub fn is_running(self) -> bool {
        matches!(self, Phase::Started | Phase::Continue | Phase::Next)
    }
}

struct RunState {
    phase: Phase,
    phase_sent: Option<Phase>,
}

/// Phase of a thread and the gate an engine thread waits on while stopped.
///
/// The phase under the lock is the source of truth, the channel only carries wake ups.
pub struct RunModel {
    state: Mutex<RunState>,
    wake_tx: Sender<()>,
    wake_rx: Mutex<Receiver<()>>,
}

impl Default for RunModel {
    fn default() -> Self {
        Self::new()
    }
}

impl RunModel {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = mpsc::channel();
        Self {
            state: Mutex::new(RunState {
                phase: Phase::Started,
                phase_sent: None,
            }),
            wake_tx,
            wake_rx: Mutex::new(wake_rx),
        }
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    /// Set the phase and wake a waiting engine thread.
    pub fn post(&self, phase: Phase) {
        lock(&self.state).phase = phase;
        _ = self.wake_tx.send(());
    }

    /// Move from `from` to `to`, return `false` if the phase is not `from`.
    pub fn transition(&self, from: Phase, to: Phase) -> bool {
        let mut state = lock(&self.state);
        if state.phase != from {
            return false;
        }
        state.phase = to;
        true
    }

    /// Block until the phase lets the engine thread proceed, return that phase.
    pub fn wait(&self) -> Phase {
        let wake_rx = lock(&self.wake_rx);
        loop {
            let phase = self.phase();
            if phase.is_running() {
                return phase;
            }
            if wake_rx.recv().is_err() {
                return phase;
            }
        }
    }

    /// Current phase if it differs from the last reported one, marks it reported.
    pub fn take_unreported(&self) -> Option<Phase> {
        let mut state = lock(&self.state);
        if state.phase_sent == Some(state.phase) {
            return None;
        }
        state.phase_sent = Some(state.phase);
        Some(state.phase)
    }
}

struct LastStep {
    context: Arc<dyn DialogContext>,
    item: ItemRef,
    more: String,
    frames: Option<Vec<Arc<CodePoint>>>,
}

/// Debugger view of one in-flight turn.
pub struct ThreadModel {
    turn: Turn,
    code_model: Arc<dyn CodeModel>,
    run: RunModel,
    arena: Arc<Arena>,
    frame_codes: Mutex<Identifier<CodePoint>>,
    last: Mutex<Option<LastStep>>,
    step_count: AtomicUsize,
}

impl ThreadModel {
    pub fn new(turn: Turn, code_model: Arc<dyn CodeModel>) -> Self {
        Self {
            turn,
            code_model,
            run: RunModel::new(),
            arena: Arc::new(Arena::new()),
            frame_codes: Mutex::default(),
            last: Mutex::default(),
            step_count: AtomicUsize::new(0),
        }
    }

    pub fn turn(&self) -> &Turn {
        &self.turn
    }

    pub fn name(&self) -> String {
        self.turn.text.clone()
    }

    pub fn run(&self) -> &RunModel {
        &self.run
    }

    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    /// Count a step, return the number of steps before it.
    pub fn count_step(&self) -> usize {
        self.step_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Remember the step the thread is at, frames of the previous step are forgotten.
    pub fn set_last(&self, context: Arc<dyn DialogContext>, item: ItemRef, more: &str) {
        let previous = lock(&self.last).replace(LastStep {
            context,
            item,
            more: more.to_string(),
            frames: None,
        });

        if let Some(frames) = previous.and_then(|step| step.frames) {
            let mut codes = lock(&self.frame_codes);
            for frame in &frames {
                codes.remove(frame);
            }
        }
    }

    /// Frames of the last step, computed once per step.
    pub fn frames(&self) -> Vec<Arc<CodePoint>> {
        let mut last = lock(&self.last);
        let Some(step) = last.as_mut() else {
            return vec![];
        };
        let code_model = &self.code_model;
        step.frames
            .get_or_insert_with(|| {
                code_model
                    .points_for(&step.context, &step.item, &step.more)
                    .into_iter()
                    .map(Arc::new)
                    .collect()
            })
            .clone()
    }

    pub fn frame_code(&self, frame: &Arc<CodePoint>) -> u64 {
        lock(&self.frame_codes).add(frame.clone())
    }

    pub fn frame(&self, code: u64) -> Result<Arc<CodePoint>, Error> {
        lock(&self.frame_codes)
            .get(code)
            .ok_or(Error::FrameNotFound(code))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::debugger::code::{DefaultCodeModel, DialogInstance, Item};
    use crate::debugger::variable::Value;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::Breakpoint.to_string(), "breakpoint");
        assert_eq!(Phase::Continue.as_ref(), "continue");
        assert!(Phase::Next.is_running());
        assert!(!Phase::Step.is_running());
    }

    #[test]
    fn test_report_dedup() {
        let run = RunModel::new();
        assert_eq!(run.take_unreported(), Some(Phase::Started));
        assert_eq!(run.take_unreported(), None);
        run.post(Phase::Pause);
        run.post(Phase::Pause);
        assert_eq!(run.take_unreported(), Some(Phase::Pause));
        assert_eq!(run.take_unreported(), None);
    }

    #[test]
    fn test_transition() {
        let run = RunModel::new();
        assert!(run.transition(Phase::Started, Phase::Continue));
        assert!(!run.transition(Phase::Next, Phase::Step));
        assert_eq!(run.phase(), Phase::Continue);
    }

    #[test]
    fn test_gate_stays_closed_across_pause() {
        let run = Arc::new(RunModel::new());
        run.post(Phase::Breakpoint);

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let run = run.clone();
            thread::spawn(move || {
                let phase = run.wait();
                tx.send(phase).unwrap();
            })
        };

        run.post(Phase::Pause);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        run.post(Phase::Continue);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Phase::Continue
        );
        waiter.join().unwrap();
    }

    #[test]
    fn test_next_releases_one_step() {
        let run = Arc::new(RunModel::new());
        run.post(Phase::Breakpoint);

        let (tx, rx) = mpsc::channel();
        let engine = {
            let run = run.clone();
            thread::spawn(move || {
                for _ in 0..2 {
                    let phase = run.wait();
                    run.transition(Phase::Next, Phase::Step);
                    tx.send(phase).unwrap();
                }
            })
        };

        run.post(Phase::Next);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Phase::Next);
        // second step re-pauses
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(run.phase(), Phase::Step);

        run.post(Phase::Continue);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Phase::Continue
        );
        engine.join().unwrap();
    }

    struct Named(&'static str);

    impl Item for Named {
        fn name(&self) -> String {
            self.0.to_string()
        }
    }

    struct Ctx;

    impl DialogContext for Ctx {
        fn turn_id(&self) -> String {
            "test-1".to_string()
        }

        fn parent(&self) -> Option<Arc<dyn DialogContext>> {
            None
        }

        fn stack(&self) -> Vec<DialogInstance> {
            vec![]
        }

        fn state(&self) -> Value {
            Value::Null
        }
    }

    #[test]
    fn test_frames_cached_per_step() {
        let thread = ThreadModel::new(Turn::new("test", "1", "hi"), Arc::new(DefaultCodeModel));
        assert!(thread.frames().is_empty());

        let ctx: Arc<dyn DialogContext> = Arc::new(Ctx);
        let item: ItemRef = Arc::new(Named("SendActivity"));
        thread.set_last(ctx.clone(), item.clone(), "actions[0]");

        let frames = thread.frames();
        assert_eq!(frames.len(), 1);
        assert!(Arc::ptr_eq(&frames[0], &thread.frames()[0]));

        let code = thread.frame_code(&frames[0]);
        assert_eq!(thread.frame(code).unwrap().more, "actions[0]");

        thread.set_last(ctx, item, "actions[1]");
        assert!(matches!(thread.frame(code), Err(Error::FrameNotFound(_))));
        assert_eq!(thread.frames()[0].more, "actions[1]");
    }
}
