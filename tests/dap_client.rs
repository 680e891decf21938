use anyhow::{anyhow, Context};
use dialog_dap::debugger::breakpoint::{SourcePoint, SourceRange};
use dialog_dap::debugger::code::{DialogContext, DialogInstance, Item, ItemRef, Turn};
use dialog_dap::debugger::source_map::SourceMap;
use dialog_dap::debugger::variable::Value as EngineValue;
use dialog_dap::debugger::DialogDebugAdapter;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(50);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(15);

pub const DIALOG_PATH: &str = "/bot/echo.dialog";
pub const SEND_LINE: u32 = 10;

pub struct DapClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    next_seq: i64,
    pending_events: VecDeque<Value>,
}

impl DapClient {
    pub fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let start = Instant::now();
        let stream = loop {
            match TcpStream::connect(addr) {
                Ok(stream) => break stream,
                Err(err) => {
                    if start.elapsed() > CONNECT_TIMEOUT {
                        return Err(anyhow!("failed to connect to {addr}: {err}"));
                    }
                    thread::sleep(CONNECT_RETRY_DELAY);
                }
            }
        };
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .context("set DAP read timeout")?;
        stream
            .set_write_timeout(Some(READ_TIMEOUT))
            .context("set DAP write timeout")?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            stream,
            reader,
            next_seq: 1,
            pending_events: VecDeque::new(),
        })
    }

    pub fn send_request(&mut self, command: &str, arguments: Value) -> anyhow::Result<i64> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let request = json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        });
        self.write_message(&request)?;
        Ok(seq)
    }

    /// Send a request and wait for its response.
    pub fn request(&mut self, command: &str, arguments: Value) -> anyhow::Result<Value> {
        let seq = self.send_request(command, arguments)?;
        self.read_response(seq)
    }

    pub fn read_response(&mut self, request_seq: i64) -> anyhow::Result<Value> {
        loop {
            let msg = self.read_message()?;
            match msg.get("type").and_then(Value::as_str) {
                Some("event") => self.pending_events.push_back(msg),
                Some("response") => {
                    if msg.get("request_seq").and_then(Value::as_i64) == Some(request_seq) {
                        return Ok(msg);
                    }
                }
                _ => {}
            }
        }
    }

    pub fn read_event(&mut self) -> anyhow::Result<Value> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(event);
        }
        loop {
            let msg = self.read_message()?;
            if msg.get("type").and_then(Value::as_str) == Some("event") {
                return Ok(msg);
            }
        }
    }

    pub fn wait_for_event(&mut self, name: &str) -> anyhow::Result<Value> {
        loop {
            let event = self.read_event()?;
            if event.get("event").and_then(Value::as_str) == Some(name) {
                return Ok(event);
            }
        }
    }

    /// Wait for an event `name` whose body satisfies `pred`.
    pub fn wait_for(
        &mut self,
        name: &str,
        pred: impl Fn(&Value) -> bool,
    ) -> anyhow::Result<Value> {
        loop {
            let event = self.wait_for_event(name)?;
            if pred(&event["body"]) {
                return Ok(event);
            }
        }
    }

    fn read_message(&mut self) -> anyhow::Result<Value> {
        let deadline = Instant::now() + MESSAGE_TIMEOUT;
        let mut content_length = None;
        loop {
            let mut line = String::new();
            let read_n = loop {
                match self.reader.read_line(&mut line) {
                    Ok(n) => break n,
                    Err(err)
                        if err.kind() == std::io::ErrorKind::WouldBlock
                            || err.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        if Instant::now() > deadline {
                            return Err(anyhow!("Timed out waiting for DAP header"));
                        }
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            };
            if read_n == 0 {
                return Err(anyhow!("DAP connection closed"));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if content_length.is_some() {
                    break;
                }
                continue;
            }
            if let Some(value) = line.strip_prefix("Content-Length:") {
                content_length = Some(value.trim().parse::<usize>()?);
            }
        }

        let len = content_length.ok_or_else(|| anyhow!("Missing Content-Length"))?;
        let mut buf = vec![0u8; len];
        self.read_exact_with_deadline(&mut buf, deadline)?;
        let msg = serde_json::from_slice(&buf)?;
        Ok(msg)
    }

    fn read_exact_with_deadline(
        &mut self,
        buf: &mut [u8],
        deadline: Instant,
    ) -> anyhow::Result<()> {
        let mut offset = 0;
        while offset < buf.len() {
            match self.reader.read(&mut buf[offset..]) {
                Ok(0) => return Err(anyhow!("DAP connection closed")),
                Ok(n) => offset += n,
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut =>
                {
                    if Instant::now() > deadline {
                        return Err(anyhow!("Timed out waiting for DAP body"));
                    }
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn write_message(&mut self, message: &Value) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(message)?;
        write!(self.stream, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.stream.write_all(&payload)?;
        self.stream.flush()?;
        Ok(())
    }
}

struct Declared(&'static str);

impl Item for Declared {
    fn name(&self) -> String {
        self.0.to_string()
    }
}

struct TurnContext {
    turn_id: String,
    root: ItemRef,
    memory: EngineValue,
}

impl DialogContext for TurnContext {
    fn turn_id(&self) -> String {
        self.turn_id.clone()
    }

    fn parent(&self) -> Option<Arc<dyn DialogContext>> {
        None
    }

    fn stack(&self) -> Vec<DialogInstance> {
        vec![DialogInstance {
            id: "EchoDialog".to_string(),
            dialog: Some(self.root.clone()),
        }]
    }

    fn state(&self) -> EngineValue {
        self.memory.clone()
    }
}

/// In-process engine: an echo dialog with two actions.
#[derive(Clone)]
pub struct FakeBot {
    root: ItemRef,
    actions: Vec<ItemRef>,
}

/// Record an item the engine loads from `path`.
pub fn declare_item(
    adapter: &Arc<DialogDebugAdapter>,
    name: &'static str,
    path: &str,
    lines: (u32, u32),
) -> ItemRef {
    let item: ItemRef = Arc::new(Declared(name));
    let range = SourceRange::new(path, SourcePoint::new(lines.0, 1), SourcePoint::new(lines.1, 2));
    adapter.source_map().add(item.clone(), range);
    item
}

impl FakeBot {
    pub fn declare(adapter: &Arc<DialogDebugAdapter>) -> Self {
        let at = |start: u32, end: u32| {
            SourceRange::new(DIALOG_PATH, SourcePoint::new(start, 1), SourcePoint::new(end, 2))
        };
        let bot = Self {
            root: Arc::new(Declared("EchoDialog")),
            actions: vec![
                Arc::new(Declared("SetProperty")),
                Arc::new(Declared("SendActivity")),
            ],
        };

        let source_map = adapter.source_map();
        source_map.add(bot.root.clone(), at(1, 20));
        source_map.add(bot.actions[0].clone(), at(5, 9));
        source_map.add(bot.actions[1].clone(), at(SEND_LINE, 14));
        bot
    }

    /// Run one turn on its own thread, the receiver yields once the turn is over.
    pub fn spawn_turn(
        &self,
        adapter: &Arc<DialogDebugAdapter>,
        n: usize,
        text: &str,
    ) -> (JoinHandle<()>, Receiver<()>) {
        self.spawn(adapter, n, text, None)
    }

    /// Like [`Self::spawn_turn`], but the engine holds after `beginDialog` until `gate` fires.
    pub fn spawn_gated_turn(
        &self,
        adapter: &Arc<DialogDebugAdapter>,
        n: usize,
        text: &str,
        gate: Receiver<()>,
    ) -> (JoinHandle<()>, Receiver<()>) {
        self.spawn(adapter, n, text, Some(gate))
    }

    fn spawn(
        &self,
        adapter: &Arc<DialogDebugAdapter>,
        n: usize,
        text: &str,
        gate: Option<Receiver<()>>,
    ) -> (JoinHandle<()>, Receiver<()>) {
        let (tx, rx) = mpsc::channel();
        let bot = self.clone();
        let adapter = adapter.clone();
        let text = text.to_string();

        let handle = thread::spawn(move || {
            let turn = Turn::new("test", &n.to_string(), &text);
            let memory = EngineValue::from_json(&json!({
                "turn": {"activity": {"type": "message", "text": text}},
                "user": {"messages": n},
            }));
            let context: Arc<dyn DialogContext> = Arc::new(TurnContext {
                turn_id: turn.id(),
                root: bot.root.clone(),
                memory: memory.clone(),
            });

            adapter.on_turn(turn, || {
                adapter.step(&context, &bot.root, "beginDialog");
                if let Some(gate) = gate {
                    _ = gate.recv_timeout(MESSAGE_TIMEOUT);
                }
                adapter.step(&context, &bot.actions[0], "actions[0]");
                adapter.step(&context, &bot.actions[1], "actions[1]");
                adapter.output(&format!("you said: {text}"), Some(&bot.actions[1]), &memory);
                adapter.step(&context, &bot.root, "endOfActions");
            });
            _ = tx.send(());
        });
        (handle, rx)
    }
}

/// Adapter listening on an ephemeral port with an attached and initialized client.
pub struct DapSession {
    pub adapter: Arc<DialogDebugAdapter>,
    pub bot: FakeBot,
    pub client: DapClient,
    pub addr: SocketAddr,
}

impl DapSession {
    pub fn start() -> anyhow::Result<Self> {
        let adapter = DialogDebugAdapter::builder()
            .terminate(Arc::new(|| {}))
            .build();
        let bot = FakeBot::declare(&adapter);
        let addr = adapter.listen("127.0.0.1:0")?;
        let mut client = DapClient::connect(addr)?;

        let response = client.request("initialize", json!({ "adapterID": "dialog" }))?;
        anyhow::ensure!(response["success"] == json!(true), "initialize failed");
        client.wait_for_event("initialized")?;

        Ok(Self {
            adapter,
            bot,
            client,
            addr,
        })
    }
}

impl Drop for DapSession {
    fn drop(&mut self) {
        self.adapter.shutdown();
    }
}
