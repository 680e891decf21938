//! Client request handling: one request at a time, read on the accept thread.

use super::{DialogDebugAdapter, Options};
use crate::dap::path_map::PathMap;
use crate::dap::protocol::{
    Capabilities, Command, DapEvent, DapRequest, DapResponse, DisconnectArguments, EvaluateArguments,
    LaunchAttachArguments, Scope, ScopesArguments, SetBreakpointsArguments,
    SetExceptionBreakpointsArguments, SetFunctionBreakpointsArguments, SetVariableArguments,
    Source, StackFrame, StackTraceArguments, Thread, ThreadArguments, Variable,
    VariablesArguments,
};
use crate::debugger::source_map::{Breakpoints, SourceMap};
use crate::debugger::thread::{Phase, ThreadModel};
use crate::debugger::utils::lock;
use crate::debugger::variable::Value;
use crate::debugger::Error;
use log::{debug, warn};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Action taken once the response is on the wire.
enum Then {
    Nothing,
    Initialized,
    Post(Arc<ThreadModel>, Phase),
    Reset,
    Terminate,
}

impl DialogDebugAdapter {
    /// Serve the attached client until it goes away.
    pub(super) fn serve(&self) -> Result<(), Error> {
        self.log_session("debugger client attached");
        let result = loop {
            let frame = match self.transport.read() {
                Ok(frame) => frame,
                Err(e) if e.is_disconnect() => break Ok(()),
                Err(e) => break Err(Error::from(e)),
            };

            let request: DapRequest = match serde_json::from_value(frame) {
                Ok(request) => request,
                Err(e) => {
                    warn!(target: "debugger", "skip invalid message: {e}");
                    continue;
                }
            };

            if let Err(e) = self.dispatch(request) {
                if e.is_fatal() {
                    break Err(e);
                }
                warn!(target: "debugger", "dispatch: {e:#}");
            }
        };

        self.reset_on_disconnect();
        self.log_session("debugger client detached");
        result
    }

    fn dispatch(&self, request: DapRequest) -> Result<(), Error> {
        debug!(target: "debugger", "request `{}` seq {}", request.label(), request.seq);

        let outcome = Command::parse(&request).and_then(|command| self.handle(command));
        let then = match outcome {
            Ok((body, then)) => {
                self.respond(DapResponse::success(self.next_seq(), &request, body))?;
                then
            }
            Err(e) => {
                warn!(target: "debugger", "`{}` failed: {e:#}", request.label());
                self.respond(DapResponse::failure(self.next_seq(), &request, e.to_string()))?;
                Then::Nothing
            }
        };

        match then {
            Then::Nothing => {}
            Then::Initialized => {
                let event = DapEvent::new(self.next_seq(), "initialized", None);
                self.transport.send(&serde_json::to_value(event)?)?;
            }
            Then::Post(thread, phase) => thread.run().post(phase),
            Then::Reset => self.reset_on_disconnect(),
            Then::Terminate => {
                self.reset_on_disconnect();
                (self.terminate)();
            }
        }
        Ok(())
    }

    fn respond(&self, response: DapResponse) -> Result<(), Error> {
        self.transport.send(&serde_json::to_value(response)?)?;
        Ok(())
    }

    fn handle(&self, command: Command) -> Result<(serde_json::Value, Then), Error> {
        match command {
            Command::Initialize(_) => Ok((self.capabilities()?, Then::Initialized)),
            Command::Launch(args) | Command::Attach(args) => {
                self.configure(args);
                Ok((json!({}), Then::Nothing))
            }
            Command::ConfigurationDone => Ok((json!({}), Then::Nothing)),
            Command::SetBreakpoints(args) => Ok((self.set_breakpoints(args)?, Then::Nothing)),
            Command::SetFunctionBreakpoints(args) => {
                Ok((self.set_function_breakpoints(args)?, Then::Nothing))
            }
            Command::SetExceptionBreakpoints(args) => {
                self.set_exception_breakpoints(args);
                Ok((json!({}), Then::Nothing))
            }
            Command::Threads => Ok((self.threads_body()?, Then::Nothing)),
            Command::StackTrace(args) => Ok((self.stack_trace(args)?, Then::Nothing)),
            Command::Scopes(args) => Ok((self.scopes(args)?, Then::Nothing)),
            Command::Variables(args) => Ok((self.variables(args)?, Then::Nothing)),
            Command::SetVariable(args) => Ok((self.set_variable(args)?, Then::Nothing)),
            Command::Evaluate(args) => Ok((self.evaluate(args)?, Then::Nothing)),
            Command::Continue(args) => Ok((
                json!({"allThreadsContinued": false}),
                self.post(args, Phase::Continue),
            )),
            Command::Pause(args) => Ok((json!({}), self.post(args, Phase::Pause))),
            Command::Next(args) | Command::StepIn(args) | Command::StepOut(args) => {
                Ok((json!({}), self.post(args, Phase::Next)))
            }
            Command::Terminate => Ok((json!({}), Then::Terminate)),
            Command::Disconnect(DisconnectArguments {
                terminate_debuggee, ..
            }) => {
                let then = if terminate_debuggee {
                    Then::Terminate
                } else {
                    Then::Reset
                };
                Ok((json!({}), then))
            }
            Command::Unknown(command) => {
                debug!(target: "debugger", "unsupported request `{command}`");
                Ok((json!({}), Then::Nothing))
            }
        }
    }

    /// The thread may have exited already, the request still succeeds.
    fn post(&self, args: ThreadArguments, phase: Phase) -> Then {
        match self.thread(args.thread_id) {
            Ok(thread) => Then::Post(thread, phase),
            Err(e) => {
                debug!(target: "debugger", "{phase} not posted: {e}");
                Then::Nothing
            }
        }
    }

    fn capabilities(&self) -> Result<serde_json::Value, Error> {
        let capabilities = Capabilities {
            supports_configuration_done_request: true,
            supports_set_variable: true,
            supports_evaluate_for_hovers: true,
            supports_function_breakpoints: true,
            exception_breakpoint_filters: self.events.filters(),
            support_terminate_debuggee: true,
            supports_terminate_request: true,
        };
        Ok(serde_json::to_value(capabilities)?)
    }

    fn configure(&self, args: LaunchAttachArguments) {
        let options = Options {
            break_on_start: args.break_on_start.unwrap_or(self.default_break_on_start),
            path_map: PathMap::from_launch(args.source_map.as_ref()),
        };
        self.log_session(&format!(
            "session configured, break on start: {}",
            options.break_on_start
        ));
        *lock(&self.options) = options;
    }

    fn engine_source(&self, source: &Source) -> Source {
        let options = lock(&self.options);
        match &source.path {
            Some(path) if !options.path_map.is_empty() => {
                Source::from_path(&options.path_map.to_engine(path))
            }
            _ => source.clone(),
        }
    }

    fn set_breakpoints(&self, args: SetBreakpointsArguments) -> Result<serde_json::Value, Error> {
        let file_name = args
            .source
            .path
            .as_deref()
            .and_then(|path| Path::new(path).file_name())
            .map(|name| name.to_string_lossy().to_string())
            .or_else(|| args.source.name.clone())
            .unwrap_or_default();
        self.output(&format!("Set breakpoints for {file_name}"), None, &Value::Null);

        let source = self.engine_source(&args.source);
        let breakpoints = self.source_map.set_breakpoints(&source, &args.breakpoints);
        for breakpoint in breakpoints.iter().filter(|bp| bp.verified) {
            if let Some(item) = self.source_map.item_for(breakpoint) {
                self.announce_breakpoint(&item);
            }
        }

        let breakpoints: Vec<_> = breakpoints
            .into_iter()
            .map(|bp| self.client_breakpoint(bp))
            .collect();
        Ok(json!({ "breakpoints": breakpoints }))
    }

    fn set_function_breakpoints(
        &self,
        args: SetFunctionBreakpointsArguments,
    ) -> Result<serde_json::Value, Error> {
        self.output("Set function breakpoints.", None, &Value::Null);

        let breakpoints = self.source_map.set_function_breakpoints(&args.breakpoints);
        for breakpoint in breakpoints.iter().filter(|bp| bp.verified) {
            if let Some(item) = self.source_map.item_for(breakpoint) {
                self.announce_breakpoint(&item);
            }
        }

        let breakpoints: Vec<_> = breakpoints
            .into_iter()
            .map(|bp| self.client_breakpoint(bp))
            .collect();
        Ok(json!({ "breakpoints": breakpoints }))
    }

    fn set_exception_breakpoints(&self, args: SetExceptionBreakpointsArguments) {
        self.events.reset(&args.filters);
    }

    fn threads_body(&self) -> Result<serde_json::Value, Error> {
        let threads: Vec<_> = self
            .live_threads()
            .into_iter()
            .map(|(id, thread)| Thread {
                id,
                name: thread.name(),
            })
            .collect();
        Ok(json!({ "threads": threads }))
    }

    fn stack_trace(&self, args: StackTraceArguments) -> Result<serde_json::Value, Error> {
        let thread = self.thread(args.thread_id)?;
        let frames = thread.frames();
        let total = frames.len();

        let start = args.start_frame.unwrap_or(0).min(total);
        let levels = match args.levels {
            Some(0) | None => total,
            Some(levels) => levels,
        };

        let mut stack_frames = vec![];
        for frame in frames.iter().skip(start).take(levels) {
            let id = self.encode_frame(&thread, frame)?;
            let range = self.source_map.try_get(&frame.item);

            let mut name = format!("{}:{}", frame.name, frame.more);
            if let Some(designer) = range.as_ref().and_then(|r| r.designer.as_deref()) {
                name.push_str(&format!(" [{designer}]"));
            }

            stack_frames.push(match range {
                Some(range) => StackFrame {
                    id,
                    name,
                    source: Some(self.client_source(&range.path)),
                    line: range.start.line,
                    column: range.start.column,
                    end_line: Some(range.end.line),
                    end_column: Some(range.end.column),
                },
                None => StackFrame {
                    id,
                    name,
                    source: None,
                    line: 0,
                    column: 0,
                    end_line: None,
                    end_column: None,
                },
            });
        }

        Ok(json!({ "stackFrames": stack_frames, "totalFrames": total }))
    }

    fn scopes(&self, args: ScopesArguments) -> Result<serde_json::Value, Error> {
        let (thread, frame) = self.decode_frame(args.frame_id)?;
        let scope = Scope {
            name: frame.name.clone(),
            variables_reference: self.encode_value(thread.arena(), &frame.data())?,
            expensive: false,
        };
        Ok(json!({ "scopes": [scope] }))
    }

    fn variables(&self, args: VariablesArguments) -> Result<serde_json::Value, Error> {
        let (arena, container) = self.decode_value(args.variables_reference)?;
        let variables = self
            .inspector
            .children(&container)
            .into_iter()
            .map(|(name, value)| {
                Ok::<_, Error>(Variable {
                    name,
                    value: self.inspector.display(&value),
                    variables_reference: self.encode_value(&arena, &value)?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(json!({ "variables": variables }))
    }

    fn set_variable(&self, args: SetVariableArguments) -> Result<serde_json::Value, Error> {
        let (arena, container) = self.decode_value(args.variables_reference)?;

        let json = serde_json::from_str(&args.value)
            .unwrap_or_else(|_| serde_json::Value::String(args.value.clone()));
        self.inspector
            .set(&container, &args.name, Value::from_json(&json))?;

        let value = self.inspector.get(&container, &args.name)?;
        Ok(json!({
            "value": self.inspector.display(&value),
            "variablesReference": self.encode_value(&arena, &value)?,
        }))
    }

    fn evaluate(&self, args: EvaluateArguments) -> Result<serde_json::Value, Error> {
        let frame_id = args.frame_id.ok_or(Error::FrameRequired)?;
        let (thread, frame) = self.decode_frame(frame_id)?;

        let expression = args.expression.trim().trim_matches('"');
        let value = frame.evaluate(expression)?;
        Ok(json!({
            "result": self.inspector.display(&value),
            "variablesReference": self.encode_value(thread.arena(), &value)?,
        }))
    }
}
