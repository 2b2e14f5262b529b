//! LanChat terminal client entry point.
//!
//! Connects to the coordinator, then loops over three sources until one of
//! them ends the chat:
//!
//! ```text
//! main()
//!  └─ ClientSession::connect()     -- TCP connect + key handshake
//!  └─ run_chat()
//!       ├─ typed line          -> ClientSession::send(), echo locally
//!       ├─ SessionEvent        -> show relayed line / note / exit
//!       └─ Ctrl+C              -> send `{quit}`, exit
//! ```
//!
//! Every line shown is also written to the transcript (`client_chat.log` by
//! default), which is deleted on exit unless `--keep-transcript` is given.
//!
//! Stdin is read on a dedicated thread: a blocking terminal read cannot be
//! cancelled, and inside the runtime it would hold up shutdown until the user
//! pressed Enter.

use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::lookup_host;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use lanchat_client::application::chat_feed::{ChatFeed, DisplayLine};
use lanchat_client::infrastructure::network::{
    ClientError, ClientSession, ClientSessionConfig, DisconnectReason, SessionEvent, SessionState,
};
use lanchat_client::infrastructure::transcript::{FileTranscript, DEFAULT_TRANSCRIPT_FILE};
use lanchat_core::protocol::{DEFAULT_PORT, QUIT_SENTINEL};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LanChat client.
///
/// Joins a coordinator on the local network; type a line and press Enter to
/// send it, or type `{quit}` to leave.
#[derive(Debug, Parser)]
#[command(name = "lanchat-client", version)]
struct Cli {
    /// Coordinator host name or IP address.
    #[arg(long, env = "LANCHAT_SERVER")]
    server: String,

    /// Coordinator TCP port.
    #[arg(long, env = "LANCHAT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Name shown before each of your messages.
    #[arg(long, env = "LANCHAT_NICKNAME")]
    nickname: String,

    /// Where to record the conversation.
    #[arg(long, env = "LANCHAT_TRANSCRIPT", default_value = DEFAULT_TRANSCRIPT_FILE)]
    transcript: PathBuf,

    /// Keep the transcript file after exiting.
    #[arg(long, env = "LANCHAT_KEEP_TRANSCRIPT")]
    keep_transcript: bool,

    /// Seconds to wait for the session key after connecting.
    #[arg(long, env = "LANCHAT_HANDSHAKE_TIMEOUT", default_value_t = 5)]
    handshake_timeout: u64,
}

impl Cli {
    fn session_config(&self) -> ClientSessionConfig {
        ClientSessionConfig {
            nickname: self.nickname.clone(),
            handshake_timeout: Duration::from_secs(self.handshake_timeout),
        }
    }
}

/// Resolves `host:port`, preferring IPv4 since the coordinator listens on IPv4.
async fn resolve_server(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let mut addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .with_context(|| format!("failed to resolve {host}"))?
        .collect();
    addrs.sort_by_key(|addr| !addr.is_ipv4());
    addrs
        .into_iter()
        .next()
        .with_context(|| format!("{host} did not resolve to any address"))
}

// ── Chat loop ─────────────────────────────────────────────────────────────────

/// Why [`run_chat`] returned.
#[derive(Debug, PartialEq, Eq)]
enum ExitCause {
    /// The user sent `{quit}`.
    Quit,
    /// Input ended (EOF on stdin).
    InputClosed,
    /// Ctrl+C.
    Interrupted,
    /// The session ended on its own.
    Disconnected(DisconnectReason),
}

fn describe_disconnect(reason: &DisconnectReason) -> String {
    match reason {
        DisconnectReason::Local => "disconnected".to_string(),
        DisconnectReason::RemoteClosed => "the server closed the connection".to_string(),
        DisconnectReason::Failed(e) => format!("connection lost: {e}"),
    }
}

fn show<W: Write>(out: &mut W, line: &DisplayLine) -> anyhow::Result<()> {
    writeln!(out, "{line}").context("failed to write to the terminal")?;
    out.flush().context("failed to write to the terminal")
}

/// Tells the room we are leaving, if still connected.
async fn leave(session: &ClientSession) {
    if session.state() != SessionState::Connected {
        return;
    }
    if let Err(e) = session.send(QUIT_SENTINEL).await {
        warn!("could not send {QUIT_SENTINEL}: {e}");
    }
}

/// Runs the conversation until the user leaves or the session ends.
async fn run_chat<W, F>(
    session: &ClientSession,
    mut events: mpsc::Receiver<SessionEvent>,
    mut input: mpsc::Receiver<String>,
    feed: &mut ChatFeed,
    out: &mut W,
    interrupt: F,
) -> anyhow::Result<ExitCause>
where
    W: Write,
    F: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            line = input.recv() => {
                let Some(line) = line else {
                    leave(session).await;
                    return Ok(ExitCause::InputClosed);
                };
                let text = line.trim_end_matches('\r');
                if text.is_empty() {
                    continue;
                }
                match session.send(text).await {
                    Ok(message) => {
                        show(out, &feed.local(&message))?;
                        if message.is_quit() {
                            return Ok(ExitCause::Quit);
                        }
                    }
                    // A failed write also ends the session; the event queue reports it.
                    Err(e @ (ClientError::Protocol(_) | ClientError::Io(_))) => {
                        show(out, &feed.system(format!("not sent: {e}")))?;
                    }
                    Err(e) => return Err(e).context("failed to send"),
                }
            }
            event = events.recv() => match event {
                Some(SessionEvent::Message(text)) => {
                    debug!("received {} bytes", text.len());
                    show(out, &feed.remote(text))?;
                }
                Some(SessionEvent::DecodeError(e)) => {
                    warn!("skipped unreadable message: {e}");
                    show(out, &feed.system("skipped an unreadable message"))?;
                }
                Some(SessionEvent::Disconnected(reason)) => {
                    show(out, &feed.system(describe_disconnect(&reason)))?;
                    return Ok(ExitCause::Disconnected(reason));
                }
                None => return Ok(ExitCause::Disconnected(DisconnectReason::Local)),
            },
            () = &mut interrupt => {
                leave(session).await;
                return Ok(ExitCause::Interrupted);
            }
        }
    }
}

/// Forwards stdin lines into a channel from a dedicated thread.
fn spawn_stdin_reader() -> anyhow::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("lanchat-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                }
            }
        })
        .context("failed to start the input thread")?;
    Ok(rx)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = resolve_server(&cli.server, cli.port).await?;
    let session = ClientSession::new(cli.session_config());
    let events = session
        .connect(addr)
        .await
        .with_context(|| format!("could not join the chat at {addr}"))?;

    let transcript = FileTranscript::create(&cli.transcript, cli.keep_transcript)
        .context("failed to create the transcript")?;
    let mut feed = ChatFeed::new(Some(Box::new(transcript)));
    let mut stdout = std::io::stdout();
    show(
        &mut stdout,
        &feed.system(format!(
            "connected to {addr} as {}; type {QUIT_SENTINEL} to leave",
            session.nickname()
        )),
    )?;

    let input = spawn_stdin_reader()?;
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    let outcome = run_chat(&session, events, input, &mut feed, &mut stdout, interrupt).await;

    session.disconnect().await;
    if let Err(e) = feed.close() {
        warn!("{e}");
    }
    let cause = outcome?;
    debug!("chat ended: {cause:?}");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
