use anyhow::Context;
use clap::Parser;
use dialog_dap::config::Config;
use dialog_dap::debugger::breakpoint::{SourcePoint, SourceRange};
use dialog_dap::debugger::code::{DialogContext, DialogInstance, Item, ItemRef, Turn};
use dialog_dap::debugger::source_map::SourceMap;
use dialog_dap::debugger::variable::{Inspector, Value};
use dialog_dap::debugger::{AdapterBuilder, DialogDebugAdapter};
use dialog_dap::log::LOGGER_SWITCHER;
use dialog_dap::weak_error;
use log::info;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on (default: 127.0.0.1:4712)
    #[clap(long, env = "DIALOG_DAP_LISTEN")]
    listen: Option<String>,

    /// Configuration file (default: ~/.config/dialog-dap/config.toml)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Stop on the first step of every turn unless the client says otherwise.
    #[clap(long)]
    break_on_start: bool,

    /// Trace protocol frames into this file.
    #[clap(long)]
    trace_file: Option<PathBuf>,

    /// Directory the demo dialog is declared in.
    #[clap(long, default_value = ".")]
    source_root: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let logger = env_logger::Logger::from_default_env();
    let filter = logger.filter();
    LOGGER_SWITCHER.switch(logger, filter);

    let mut config = Config::load(args.config.as_deref()).context("load configuration")?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if args.break_on_start {
        config.break_on_start = true;
    }
    if args.trace_file.is_some() {
        config.trace_file = args.trace_file;
    }

    let adapter = AdapterBuilder::from_config(&config)
        .context("configure adapter")?
        .build();
    adapter.install_logger();

    let local_addr = adapter
        .listen(config.listen.as_str())
        .with_context(|| format!("listen on {}", config.listen))?;
    info!(target: "debugger", "dialog debug adapter listening on {local_addr}");

    {
        let adapter = adapter.clone();
        ctrlc::set_handler(move || {
            adapter.shutdown();
            std::process::exit(0);
        })?;
    }

    let bot = EchoBot::declare(&adapter, &args.source_root);
    println!("type a message per line, ctrl-d to quit");
    for (n, line) in std::io::stdin().lock().lines().enumerate() {
        let line = line?;
        for reply in bot.turn(&adapter, n + 1, &line) {
            println!("bot: {reply}");
        }
    }

    adapter.shutdown();
    Ok(())
}

struct Declared(String);

impl Item for Declared {
    fn name(&self) -> String {
        self.0.clone()
    }
}

struct TurnContext {
    turn_id: String,
    root: ItemRef,
    memory: Value,
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

    fn state(&self) -> Value {
        self.memory.clone()
    }
}

/// Demo engine: one dialog echoing every message back.
struct EchoBot {
    root: ItemRef,
    actions: Vec<ItemRef>,
}

impl EchoBot {
    fn declare(adapter: &Arc<DialogDebugAdapter>, source_root: &std::path::Path) -> Self {
        let path = source_root.join("echo.dialog");
        let path = path.to_string_lossy();
        let at = |start: u32, end: u32| {
            SourceRange::new(&path, SourcePoint::new(start, 1), SourcePoint::new(end, 2))
        };

        let root: ItemRef = Arc::new(Declared("EchoDialog".to_string()));
        let actions: Vec<ItemRef> = vec![
            Arc::new(Declared("SetProperty".to_string())),
            Arc::new(Declared("SendActivity".to_string())),
        ];

        let source_map = adapter.source_map();
        source_map.add(root.clone(), at(1, 20).with_designer("echo-root"));
        source_map.add(actions[0].clone(), at(5, 9));
        source_map.add(actions[1].clone(), at(10, 14));
        Self { root, actions }
    }

    fn turn(&self, adapter: &Arc<DialogDebugAdapter>, n: usize, text: &str) -> Vec<String> {
        let turn = Turn::new("console", &n.to_string(), text);
        let memory = Value::from_json(&serde_json::json!({
            "turn": {"activity": {"type": "message", "text": text}},
            "user": {"messages": n},
            "dialog": {},
        }));
        let context: Arc<dyn DialogContext> = Arc::new(TurnContext {
            turn_id: turn.id(),
            root: self.root.clone(),
            memory: memory.clone(),
        });

        adapter.on_turn(turn, || {
            adapter.step(&context, &self.root, "beginDialog");

            adapter.step(&context, &self.actions[0], "actions[0]");
            let inspector = Inspector::global();
            let remembered = inspector
                .get(&memory, "dialog")
                .and_then(|dialog| inspector.set(&dialog, "echo", Value::from(text)));
            weak_error!(remembered, "remember echo:");

            adapter.step(&context, &self.actions[1], "actions[1]");
            let reply = format!("you said: {text}");
            adapter.output(&reply, Some(&self.actions[1]), &memory);

            adapter.step(&context, &self.root, "endOfActions");
            vec![reply]
        })
    }
}
