use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use joyvox::config::Config;
use joyvox::console::{self, CommandResult};
use joyvox::dispatch;
use joyvox::host::Host;
use joyvox::navigation::{HostEvent, NavigationError, Navigator, StartOutcome};
use joyvox::sim::SimHost;
use joyvox::state::{InputBus, OperatorSettings, SharedBus, SharedSettings};
use joyvox::stats::{self, SharedStats};
use joyvox::status::{StatusDisplayStyle, StatusSnapshot};
use joyvox::telemetry::{self, TelemetryFrame, Tokens};
use joyvox::vocabulary::{Action, Vocabulary};
use joyvox::voice::{
    CpalMicrophone, MicTestReport, VoicePipeline, VoiceRequest, VoiceState, VoiceStateCell,
};

#[derive(Parser)]
#[command(name = "joyvox", version, about = "Joystick and voice control for a 3D viewport")]
struct Cli {
    /// Config file (default: ./config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller against the simulated viewport (default)
    Run {
        /// Do not start the voice pipeline
        #[arg(long)]
        no_voice: bool,
    },
    /// Emit controller datagrams, like the joystick firmware
    Send {
        #[arg(long, default_value = "127.0.0.1:8080")]
        target: String,
        #[arg(long, default_value_t = 2048)]
        vrx: u16,
        #[arg(long, default_value_t = 2048)]
        vry: u16,
        #[arg(long)]
        button: bool,
        #[arg(long)]
        zoom: bool,
        #[arg(long)]
        voice: bool,
        /// Number of datagrams, 0 sends until interrupted
        #[arg(long, default_value_t = 10)]
        count: u64,
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
    /// Record one phrase and print what the remote recognizer heard
    MicTest,
    /// Decode a datagram payload and print the snapshot
    Decode { payload: String },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("joyvox=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[hotpath::main]
fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    let root = CancellationToken::new();
    let token = root.clone();
    ctrlc::set_handler(move || token.cancel()).context("failed to install Ctrl-C handler")?;

    match cli.command.unwrap_or(Command::Run { no_voice: false }) {
        Command::Decode { payload } => decode(&config, &payload),
        Command::MicTest => mic_test(&config),
        Command::Send {
            target,
            vrx,
            vry,
            button,
            zoom,
            voice,
            count,
            interval_ms,
        } => {
            let frame = TelemetryFrame {
                vrx,
                vry,
                button,
                zoom,
                voice,
            };
            send(&target, frame, count, Duration::from_millis(interval_ms), &root)
        }
        Command::Run { no_voice } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run(config, no_voice, root)),
    }
}

fn decode(config: &Config, payload: &str) -> anyhow::Result<()> {
    let snapshot = telemetry::decode_with(payload, &Tokens::from_config(&config.telemetry))?;
    println!("{:#?}", snapshot);
    Ok(())
}

fn send(
    target: &str,
    frame: TelemetryFrame,
    count: u64,
    interval: Duration,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket
        .connect(target)
        .with_context(|| format!("invalid target {}", target))?;
    let payload = frame.encode();
    tracing::info!(addr = target, %payload, count, "sending telemetry");

    let mut sent = 0u64;
    while !token.is_cancelled() && (count == 0 || sent < count) {
        if let Err(e) = socket.send(payload.as_bytes()) {
            tracing::warn!(error = %e, "send failed");
        }
        sent += 1;
        thread::sleep(interval);
    }
    println!("sent {} datagrams to {}", sent, target);
    Ok(())
}

fn mic_test(config: &Config) -> anyhow::Result<()> {
    let bus = InputBus::new(Duration::from_millis(config.voice.activation_window_ms));
    let (action_tx, action_rx) = flume::unbounded();
    let pipeline = VoicePipeline::new(
        &config.voice,
        bus,
        Box::new(CpalMicrophone),
        Vocabulary::with_extra(&config.vocabulary.extra),
        action_tx,
    )
    .with_configured_recognizers(&config.voice);

    println!("{}", pipeline.mic_test());
    if let Ok(action) = action_rx.try_recv() {
        println!("Matched action: {}", action);
    }
    Ok(())
}

/// Readline thread feeding console lines to the main loop.
///
/// The editor owns the terminal while it waits, so Ctrl-C arrives here as
/// an error instead of through the signal handler and ends the session.
/// End of input only stops the reader. Never joined, since a pending
/// `readline` cannot be interrupted.
fn spawn_readline(
    input_tx: flume::Sender<String>,
    token: CancellationToken,
) -> std::io::Result<()> {
    thread::Builder::new().name("readline".into()).spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!(error = %e, "failed to create line editor");
                return;
            }
        };

        loop {
            match rl.readline("> ") {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        let _ = rl.add_history_entry(&line);
                    }
                    if input_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    token.cancel();
                    break;
                }
                Err(_) => break,
            }
        }
    })?;
    Ok(())
}

/// Handles held by the main loop for console commands
struct App {
    host: SimHost,
    navigator: Navigator,
    settings: SharedSettings,
    bus: SharedBus,
    vocabulary: Vocabulary,
    voice_state: Arc<VoiceStateCell>,
    voice_requests: Option<flume::Sender<VoiceRequest>>,
    stats: SharedStats,
}

async fn run(config: Config, no_voice: bool, root: CancellationToken) -> anyhow::Result<()> {
    let bus = InputBus::new(Duration::from_millis(config.voice.activation_window_ms));
    let settings = OperatorSettings::new(&config.navigation);
    let stats = stats::new_shared();
    let voice_state = Arc::new(VoiceStateCell::default());

    // Channel: voice thread -> main loop
    let (action_tx, action_rx) = flume::unbounded::<Action>();

    let voice_requests = if config.voice.enabled && !no_voice {
        let (request_tx, request_rx) = flume::unbounded::<VoiceRequest>();
        let voice_config = config.voice.clone();
        let extra = config.vocabulary.extra.clone();
        let bus = bus.clone();
        let stats = stats.clone();
        let cell = voice_state.clone();
        let token = root.clone();

        // recognizers use blocking http clients, so build them on their own thread
        thread::Builder::new().name("voice".into()).spawn(move || {
            let pipeline = VoicePipeline::new(
                &voice_config,
                bus,
                Box::new(CpalMicrophone),
                Vocabulary::with_extra(&extra),
                action_tx,
            )
            .with_configured_recognizers(&voice_config)
            .with_stats(stats)
            .with_state_cell(cell);
            pipeline.run(&token, &request_rx);
        })?;
        Some(request_tx)
    } else {
        tracing::info!("voice control disabled");
        drop(action_tx);
        None
    };

    let (input_tx, input_rx) = flume::unbounded::<String>();
    spawn_readline(input_tx, root.clone())?;

    let mut app = App {
        host: SimHost::new(),
        navigator: Navigator::new(
            &config.telemetry,
            &config.navigation,
            bus.clone(),
            settings.clone(),
            root.clone(),
        ),
        settings,
        bus,
        vocabulary: Vocabulary::with_extra(&config.vocabulary.extra),
        voice_state,
        voice_requests,
        stats,
    };

    if config.navigation.autostart {
        app.start_navigation();
    }
    println!("Type /help for commands.");

    let mut tick = tokio::time::interval(app.navigator.tick_interval());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let (report_tx, report_rx) = flume::unbounded::<MicTestReport>();

    loop {
        tokio::select! {
            biased;

            _ = root.cancelled() => break,

            Ok(action) = action_rx.recv_async() => {
                if dispatch::execute(&mut app.host, action) {
                    println!("✓ {} ({})", action, app.bus.last_command().unwrap_or_default());
                }
            }

            Ok(line) = input_rx.recv_async() => {
                if !app.handle_console(&line, &report_tx) {
                    root.cancel();
                    break;
                }
            }

            Ok(report) = report_rx.recv_async() => {
                println!("{}", report);
            }

            _ = tick.tick() => {
                app.navigator.handle_event(&HostEvent::Timer, &mut app.host);
            }
        }
    }

    app.navigator.stop(&mut app.host);
    let summary = app.stats.lock().map(|s| s.summary()).unwrap_or_default();
    eprint!("{}", summary);
    Ok(())
}

impl App {
    fn start_navigation(&mut self) {
        match self.navigator.start(&mut self.host) {
            Ok(StartOutcome::Running) => {}
            Ok(StartOutcome::Cancelled) => println!("Navigation cancelled: no viewport"),
            Err(NavigationError::AlreadyRunning) => println!("Navigation is already running"),
            Err(e) => {
                tracing::error!(error = %e, "navigation failed to start");
                println!("Navigation failed: {}", e);
            }
        }
    }

    /// Returns false when the operator asked to quit
    fn handle_console(&mut self, line: &str, reports: &flume::Sender<MicTestReport>) -> bool {
        let Some(result) = console::process_input(line, &self.settings) else {
            return true;
        };

        match result {
            CommandResult::Handled(Some(message)) => println!("{}", message),
            CommandResult::Handled(None) => {}
            CommandResult::StartNavigation => self.start_navigation(),
            CommandResult::StopNavigation => {
                if !self.navigator.stop(&mut self.host) {
                    println!("Navigation is not running");
                }
            }
            CommandResult::SetObjectMode(mode) => {
                dispatch::set_object_mode(&mut self.host, mode);
            }
            CommandResult::ResetView => {
                dispatch::reset_view(&mut self.host);
            }
            CommandResult::MicTest => self.request_mic_test(reports),
            CommandResult::Stats => {
                if let Ok(stats) = self.stats.lock() {
                    print!("{}", stats.summary());
                }
            }
            CommandResult::Status => {
                let width = crossterm::terminal::size()
                    .map(|(w, _)| w as usize)
                    .ok();
                let snapshot = StatusSnapshot::capture(
                    self.navigator.is_running(),
                    &self.settings,
                    &self.bus,
                    self.voice_state.get(),
                    self.host.object_mode(),
                );
                println!("{}", snapshot.render(StatusDisplayStyle::Emoji, width));
            }
            CommandResult::Transcript(text) => {
                let text = text.to_lowercase();
                self.bus.set_last_command(&text);
                match self.vocabulary.resolve(&text) {
                    Some(action) => {
                        if dispatch::execute(&mut self.host, action) {
                            println!("✓ {}", action);
                        }
                    }
                    None => {
                        stats::record_unmatched(&self.stats);
                        println!("Command not recognized: {}", text);
                    }
                }
            }
            CommandResult::Shutdown => return false,
        }
        true
    }

    fn request_mic_test(&self, reports: &flume::Sender<MicTestReport>) {
        let Some(requests) = &self.voice_requests else {
            println!("Voice control is disabled");
            return;
        };
        if self.voice_state.get() != VoiceState::Idle {
            println!("Microphone is busy, try again");
            return;
        }

        let (reply_tx, reply_rx) = flume::bounded(1);
        if requests.send(VoiceRequest::MicTest(reply_tx)).is_err() {
            println!("Voice pipeline is not running");
            return;
        }
        println!("Microphone test: adjusting for ambient noise, then speak...");

        let reports = reports.clone();
        tokio::spawn(async move {
            if let Ok(report) = reply_rx.recv_async().await {
                let _ = reports.send(report);
            }
        });
    }
}
