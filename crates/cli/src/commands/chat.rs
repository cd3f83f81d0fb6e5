//! The interactive session (and `-p` one-shot mode).

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use twin_agent::history::HistoryEntry;
use twin_agent::{
    modes, prompt, AgentCatalog, AgentProfile, DispatchEvent, DispatchState, Dispatcher,
    HistoryStore, SessionContext, TurnOutcome,
};
use twin_config::{AppConfig, LocalSettings};
use twin_core::{Mode, Provider};
use twin_tools::Workspace;

use super::aider;
use super::improvements;
use super::slash::{SlashCommand, HELP};

pub struct ChatArgs {
    pub mode: Option<Mode>,
    pub agent: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
}

enum Flow {
    Continue,
    Exit,
    Restart,
}

struct Repl {
    config: AppConfig,
    cwd: PathBuf,
    catalog: AgentCatalog,
    agent: AgentProfile,
    store: HistoryStore,
    recent: Vec<HistoryEntry>,
    provider: Arc<dyn Provider>,
    dispatcher: Dispatcher,
    events: mpsc::UnboundedReceiver<DispatchEvent>,
    session: SessionContext,
}

/// Returns the exit code of a restarted twin after `/reload`.
pub async fn run(args: ChatArgs) -> Result<Option<i32>, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let cwd = std::env::current_dir()?;
    let local = LocalSettings::load(&cwd).unwrap_or_else(|e| {
        warn!("Ignoring repository settings: {e}");
        LocalSettings::default()
    });

    let detection = modes::detect(&config, args.mode, &cwd).await;
    let mode = detection.mode;

    let catalog = AgentCatalog::load(&config.agents_dir());
    let agent = match args.agent.as_deref().or(local.agent.as_deref()) {
        Some(name) => catalog.get(name)?,
        None => {
            let default = catalog.default_for_mode(mode);
            match &args.prompt {
                Some(p) => catalog.select_with_reason(p, mode, &default).agent,
                None => default,
            }
        }
    };

    let requested = args
        .model
        .or(local.model)
        .unwrap_or_else(|| config.default_model.clone());
    let model = twin_providers::resolve_model(&requested, &config.models);

    let provider = twin_providers::build_from_config(&config);
    if let Err(e) = provider.health_check().await {
        eprintln!();
        eprintln!("  ERROR: cannot reach the model server ({})", provider.name());
        eprintln!("    {e}");
        eprintln!();
        eprintln!("  Start it with `ollama serve`, or check [ollama] base_url in");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err(twin_core::Error::from(e).into());
    }

    let tools = Arc::new(twin_tools::default_registry(&config, Workspace::new(&cwd)));
    let store = HistoryStore::new(config.context_dir());
    let recent = store.recent_sessions(&cwd, 2).unwrap_or_else(|e| {
        warn!("Could not read session history: {e}");
        Vec::new()
    });

    let system = prompt::system_prompt(&agent, mode, &tools.definitions(), &recent);
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(provider.clone(), tools)
        .with_system_prompt(system)
        .with_temperature(config.ollama.temperature)
        .with_num_ctx(config.ollama.num_ctx)
        .with_events(tx);
    let session = SessionContext::new(mode, &agent.name, &model);
    info!(session = %session.id(), mode = %mode, source = %detection.source, agent = %agent.name, model = %model, "Session started");

    let mut repl = Repl {
        config,
        cwd,
        catalog,
        agent,
        store,
        recent,
        provider,
        dispatcher,
        events: rx,
        session,
    };

    if let Some(question) = args.prompt {
        let Some(outcome) = repl.turn(&question).await? else {
            return Ok(None);
        };
        println!("{}", outcome.turn.final_answer);
        if let Err(e) = repl.store.append(&repl.cwd, &mut repl.session) {
            warn!("Could not save session: {e}");
        }
        return Ok(None);
    }

    repl.banner(&detection);
    repl.interactive().await
}

impl Repl {
    fn banner(&self, detection: &modes::Detection) {
        println!();
        println!("  ╔══════════════════════════════════════════════╗");
        println!("  ║            twin · interactive session        ║");
        println!("  ╚══════════════════════════════════════════════╝");
        println!();
        println!("  Mode:      {} ({})", self.session.mode(), detection.source);
        println!("  Agent:     {}", self.agent.name);
        println!("  Model:     {}", self.session.model());
        println!("  Tools:     {}", self.dispatcher.tools().names().join(", "));
        println!("  Session:   {}", self.session.id());
        if !self.recent.is_empty() {
            match self.store.summary(&self.cwd) {
                Ok(summary) => {
                    println!();
                    for line in summary.lines() {
                        println!("  {line}");
                    }
                }
                Err(e) => warn!("{e}"),
            }
        }
        println!();
        println!("  Type /help for commands, /exit to leave.");
        println!();
    }

    async fn interactive(&mut self) -> Result<Option<i32>, Box<dyn std::error::Error>> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let flow = loop {
            print!(">>> ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!("\n  Interrupted");
                    None
                }
            };
            let Some(line) = line else {
                break Flow::Exit;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(command) = SlashCommand::parse(line) {
                match self.handle(command).await {
                    Flow::Continue => continue,
                    flow => break flow,
                }
            }

            match self.turn(line).await {
                Ok(Some(outcome)) => {
                    println!();
                    println!("{}", outcome.turn.final_answer);
                    println!();
                }
                Ok(None) => {}
                Err(e) => eprintln!("\n  Error: {e}\n"),
            }
        };
        drop(lines);

        self.save();
        self.print_metrics();
        match flow {
            Flow::Restart => Ok(Some(restart().await?)),
            _ => {
                println!("  Goodbye!");
                Ok(None)
            }
        }
    }

    /// Run one turn, rendering tool progress as it happens.
    /// `Ok(None)` when Ctrl-C interrupted it.
    async fn turn(&mut self, input: &str) -> Result<Option<TurnOutcome>, twin_agent::AgentError> {
        eprint!("  Thinking...");
        let mut thinking = true;
        let run = self.dispatcher.run_turn(&mut self.session, input);
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let result = drive(run, &mut self.events, interrupt, |event| {
            if std::mem::take(&mut thinking) {
                eprint!("\r              \r");
            }
            render_event(event);
        })
        .await;
        if thinking {
            eprint!("\r              \r");
        }
        let Some(result) = result else {
            println!("\n  Interrupted");
            return Ok(None);
        };
        let outcome = result?;
        if let Some(e) = &outcome.reprompt_error {
            eprintln!("  ✗ follow-up request failed: {e}");
        }
        Ok(Some(outcome))
    }

    async fn handle(&mut self, command: SlashCommand) -> Flow {
        match command {
            SlashCommand::Help => println!("\n{HELP}\n"),
            SlashCommand::Mode(Some(arg)) => match arg.parse::<Mode>() {
                Ok(mode) => {
                    self.session.set_mode(mode);
                    self.refresh_prompt();
                    println!("\n  ✓ Switched to {} mode\n", mode.as_str().to_uppercase());
                }
                Err(e) => println!("\n  {e}\n"),
            },
            SlashCommand::Mode(None) => {
                println!("\n  Current mode: {}. Usage: /mode work|personal\n", self.session.mode())
            }
            SlashCommand::Agent(Some(name)) => match self.catalog.get(&name) {
                Ok(agent) => {
                    self.session.set_agent(&agent.name);
                    self.agent = agent;
                    self.refresh_prompt();
                    println!("\n  ✓ Switched to agent: {name}\n");
                }
                Err(e) => println!("\n  {e}\n"),
            },
            SlashCommand::Agent(None) => {
                let names = self.catalog.names();
                println!("\n  Current agent: {}", self.agent.name);
                if names.is_empty() {
                    println!("  No agents installed in {}\n", self.config.agents_dir().display());
                } else {
                    println!("  Available agents: {}\n", names.join(", "));
                }
            }
            SlashCommand::Model(Some(name)) => {
                let model = self.session.set_model(&name, &self.config.models);
                println!("\n  ✓ Switched to model: {model}\n");
            }
            SlashCommand::Model(None) => {
                println!("\n  Current model: {}", self.session.model());
                match self.provider.list_models().await {
                    Ok(models) if !models.is_empty() => println!("  Installed: {}", models.join(", ")),
                    Ok(_) => {}
                    Err(e) => println!("  Could not list models: {e}"),
                }
                let aliases: Vec<String> =
                    self.config.models.iter().map(|(a, m)| format!("{a} → {m}")).collect();
                println!("  Aliases: {}\n", aliases.join(", "));
            }
            SlashCommand::Context => match self.store.summary(&self.cwd) {
                Ok(summary) => println!("\n{summary}\n"),
                Err(e) => println!("\n  {e}\n"),
            },
            SlashCommand::Tools => {
                println!();
                for def in self.dispatcher.tools().definitions() {
                    println!("  {}\n      {}", prompt::signature(&def), def.description);
                }
                println!();
            }
            SlashCommand::Improvements => {
                println!();
                improvements::print_recent(&self.config, 10);
                println!();
            }
            SlashCommand::Save => self.save(),
            SlashCommand::Reload => return Flow::Restart,
            SlashCommand::Edit(files) => {
                self.save();
                if let Err(e) = aider::hand_off(&self.session, &files).await {
                    println!("\n  {e}\n");
                } else {
                    println!("\n  Returned from Aider\n");
                }
            }
            SlashCommand::Exit => return Flow::Exit,
            SlashCommand::Unknown(name) => {
                println!("\n  Unknown command: /{name}. Type /help for available commands\n")
            }
        }
        Flow::Continue
    }

    fn refresh_prompt(&mut self) {
        let system = prompt::system_prompt(
            &self.agent,
            self.session.mode(),
            &self.dispatcher.tools().definitions(),
            &self.recent,
        );
        self.dispatcher.set_system_prompt(system);
    }

    fn save(&mut self) {
        match self.store.append(&self.cwd, &mut self.session) {
            Ok(Some(path)) => println!("  ✓ Session saved to {}", path.display()),
            Ok(None) => {}
            Err(e) => eprintln!("  ✗ Could not save session: {e}"),
        }
    }

    fn print_metrics(&self) {
        let m = self.session.metrics();
        if m.queries == 0 {
            return;
        }
        println!(
            "  Session {}: {} queries, {} tool calls ({} failed), {:.1}s waiting on the model",
            self.session.id(),
            m.queries,
            m.tool_calls,
            m.tool_failures,
            m.model_time.as_secs_f64()
        );
    }
}

/// Poll `run` to completion while forwarding events, unless `interrupt`
/// fires first. Dropping `run` kills any child process it started.
async fn drive<T>(
    run: impl Future<Output = T>,
    events: &mut mpsc::UnboundedReceiver<DispatchEvent>,
    interrupt: impl Future<Output = ()>,
    mut on_event: impl FnMut(DispatchEvent),
) -> Option<T> {
    tokio::pin!(run);
    tokio::pin!(interrupt);
    let result = loop {
        tokio::select! {
            biased;
            _ = &mut interrupt => break None,
            Some(event) = events.recv() => on_event(event),
            result = &mut run => break Some(result),
        }
    };
    while let Ok(event) = events.try_recv() {
        on_event(event);
    }
    result
}

fn render_event(event: DispatchEvent) {
    match event {
        DispatchEvent::ToolStarted { index, total, name, arguments } => {
            eprintln!("  🔧 [{}/{total}] {name}({arguments})", index + 1);
        }
        DispatchEvent::ToolFinished { name, success: true, .. } => {
            eprintln!("  ✓ {name} completed");
        }
        DispatchEvent::ToolFinished { name, error, .. } => {
            eprintln!("  ✗ {name} failed: {}", error.unwrap_or_default());
        }
        DispatchEvent::State { state: DispatchState::Reprompting } => {
            eprintln!("  … reading the results");
        }
        DispatchEvent::State { .. } => {}
    }
}

/// Run a fresh twin with the same arguments and wait for it.
async fn restart() -> Result<i32, Box<dyn std::error::Error>> {
    let exe = std::env::current_exe()?;
    println!("  Reloading {}...\n", exe.display());
    let status = tokio::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .status()
        .await?;
    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropFlag(Option<tokio::sync::oneshot::Sender<()>>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    #[tokio::test]
    async fn interrupt_abandons_a_hung_turn() {
        let (_tx, mut events) = mpsc::unbounded_channel();
        let (dropped_tx, dropped_rx) = tokio::sync::oneshot::channel();
        let flag = DropFlag(Some(dropped_tx));
        let run = async move {
            let _flag = flag;
            std::future::pending::<()>().await;
        };

        let result = drive(run, &mut events, async {}, |_| {}).await;
        assert!(result.is_none());
        assert!(dropped_rx.await.is_ok(), "the turn future should be dropped");
    }

    #[tokio::test]
    async fn events_are_forwarded_until_the_turn_finishes() {
        let (tx, mut events) = mpsc::unbounded_channel();
        let run = async move {
            tx.send(DispatchEvent::State { state: DispatchState::Parsing }).unwrap();
            tx.send(DispatchEvent::State { state: DispatchState::Done }).unwrap();
            7
        };
        let mut seen = Vec::new();
        let result = drive(run, &mut events, std::future::pending(), |e| seen.push(e)).await;
        assert_eq!(result, Some(7));
        assert_eq!(seen.len(), 2);
    }
}
