//! Wire level message envelopes, typed request arguments and response/event bodies.

use crate::debugger::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Any message received from the client.
///
/// Only requests are expected, anything else is rejected by the dispatcher.
#[derive(Debug, Deserialize)]
pub struct DapRequest {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub arguments: Value,
}

impl DapRequest {
    pub fn is_request(&self) -> bool {
        self.r#type == "request"
    }

    /// Name used to label the message in responses and logs.
    pub fn label(&self) -> &str {
        if self.is_request() {
            return &self.command;
        }
        self.event.as_deref().unwrap_or(&self.r#type)
    }
}

#[derive(Debug, Serialize)]
pub struct DapResponse {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl DapResponse {
    pub fn success(seq: i64, req: &DapRequest, body: Value) -> Self {
        Self {
            seq,
            r#type: "response",
            request_seq: req.seq,
            success: true,
            command: req.label().to_string(),
            message: None,
            body: Some(body),
        }
    }

    pub fn failure(seq: i64, req: &DapRequest, message: String) -> Self {
        Self {
            seq,
            r#type: "response",
            request_seq: req.seq,
            success: false,
            command: req.label().to_string(),
            message: Some(message),
            body: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DapEvent {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl DapEvent {
    pub fn new(seq: i64, event: &'static str, body: Option<Value>) -> Self {
        Self {
            seq,
            r#type: "event",
            event,
            body,
        }
    }
}

// ------------------------------------- requests ----------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeArguments {
    #[serde(rename = "clientID")]
    pub client_id: Option<String>,
    #[serde(rename = "adapterID")]
    pub adapter_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchAttachArguments {
    pub break_on_start: Option<bool>,
    pub no_debug: bool,
    pub source_map: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: u32,
    #[serde(default)]
    pub column: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFunctionBreakpointsArguments {
    #[serde(default)]
    pub breakpoints: Vec<FunctionBreakpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionBreakpoint {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetExceptionBreakpointsArguments {
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    pub thread_id: u64,
    #[serde(default)]
    pub start_frame: Option<usize>,
    #[serde(default)]
    pub levels: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableArguments {
    pub variables_reference: u64,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default)]
    pub frame_id: Option<u64>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadArguments {
    pub thread_id: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisconnectArguments {
    pub terminate_debuggee: bool,
    pub restart: bool,
}

/// Request decoded into its typed form.
#[derive(Debug)]
pub enum Command {
    Initialize(InitializeArguments),
    Launch(LaunchAttachArguments),
    Attach(LaunchAttachArguments),
    ConfigurationDone,
    SetBreakpoints(SetBreakpointsArguments),
    SetFunctionBreakpoints(SetFunctionBreakpointsArguments),
    SetExceptionBreakpoints(SetExceptionBreakpointsArguments),
    Threads,
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    SetVariable(SetVariableArguments),
    Evaluate(EvaluateArguments),
    Continue(ThreadArguments),
    Pause(ThreadArguments),
    Next(ThreadArguments),
    StepIn(ThreadArguments),
    StepOut(ThreadArguments),
    Terminate,
    Disconnect(DisconnectArguments),
    Unknown(String),
}

impl Command {
    pub fn parse(req: &DapRequest) -> Result<Self, Error> {
        if !req.is_request() {
            return Err(Error::UnexpectedMessage(req.label().to_string()));
        }

        let command = match req.command.as_str() {
            "initialize" => Command::Initialize(arguments(req)?),
            "launch" => Command::Launch(arguments(req)?),
            "attach" => Command::Attach(arguments(req)?),
            "configurationDone" => Command::ConfigurationDone,
            "setBreakpoints" => Command::SetBreakpoints(arguments(req)?),
            "setFunctionBreakpoints" => Command::SetFunctionBreakpoints(arguments(req)?),
            "setExceptionBreakpoints" => Command::SetExceptionBreakpoints(arguments(req)?),
            "threads" => Command::Threads,
            "stackTrace" => Command::StackTrace(arguments(req)?),
            "scopes" => Command::Scopes(arguments(req)?),
            "variables" => Command::Variables(arguments(req)?),
            "setVariable" => Command::SetVariable(arguments(req)?),
            "evaluate" => Command::Evaluate(arguments(req)?),
            "continue" => Command::Continue(arguments(req)?),
            "pause" => Command::Pause(arguments(req)?),
            "next" => Command::Next(arguments(req)?),
            "stepIn" => Command::StepIn(arguments(req)?),
            "stepOut" => Command::StepOut(arguments(req)?),
            "terminate" => Command::Terminate,
            "disconnect" => Command::Disconnect(arguments(req)?),
            other => Command::Unknown(other.to_string()),
        };
        Ok(command)
    }
}

fn arguments<T: DeserializeOwned>(req: &DapRequest) -> Result<T, Error> {
    let args = match &req.arguments {
        Value::Null => Value::Object(Default::default()),
        args => args.clone(),
    };
    serde_json::from_value(args).map_err(|source| Error::InvalidArguments {
        command: req.command.clone(),
        source,
    })
}

// -------------------------------------- bodies -----------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: bool,
    pub supports_set_variable: bool,
    pub supports_evaluate_for_hovers: bool,
    pub supports_function_breakpoints: bool,
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointsFilter>,
    pub support_terminate_debuggee: bool,
    pub supports_terminate_request: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExceptionBreakpointsFilter {
    pub filter: String,
    pub label: String,
    pub default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Source {
    pub fn from_path(path: &str) -> Self {
        let name = std::path::Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        Self {
            name,
            path: Some(path.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub id: u64,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: u64,
    pub expensive: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub variables_reference: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: String,
    pub description: String,
    pub thread_id: u64,
    pub text: String,
    pub preserve_focus_hint: bool,
    pub all_threads_stopped: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    pub thread_id: u64,
    pub all_threads_continued: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadEventBody {
    pub reason: &'static str,
    pub thread_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakpointEventBody {
    pub reason: &'static str,
    pub breakpoint: Breakpoint,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    pub category: &'static str,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub variables_reference: u64,
}
