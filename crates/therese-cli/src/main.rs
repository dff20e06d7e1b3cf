//! `therese`: stream chat answers and board deliberations from a running
//! THÉRÈSE backend into the terminal.

mod render;

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use therese_stream::prelude::*;
use tracing::warn;

use crate::render::{BoardPrinter, ChatPrinter, board_summary, chat_summary, drive, write_out};

#[derive(Parser)]
#[command(name = "therese")]
#[command(about = "Terminal client for the THÉRÈSE backend")]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides THERESE_BACKEND_URL)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the answer
    Chat {
        message: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation_id: Option<String>,

        /// Do not inject memory context
        #[arg(long)]
        no_memory: bool,
    },

    /// Ask the board of advisors to deliberate on a question
    Board {
        question: String,

        /// Extra context given to every advisor
        #[arg(long)]
        context: Option<String>,

        /// Restrict the board to these advisors (repeatable)
        #[arg(long = "advisor", value_name = "ROLE")]
        advisors: Vec<AdvisorRole>,
    },

    /// List the available advisors
    Advisors,

    /// Stop the generation running for a conversation
    Cancel { conversation_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    therese_stream::init_observability();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = BackendConfig::from_env().context("invalid backend configuration")?;
    if let Some(url) = cli.backend_url {
        config = config.base_url(url);
    }
    let client = ThereseClient::new(config)?;

    match cli.command {
        Commands::Chat {
            message,
            conversation_id,
            no_memory,
        } => {
            let mut request = ChatRequest::new(message).include_memory(!no_memory);
            if let Some(id) = conversation_id {
                request = request.conversation(id);
            }
            cmd_chat(&client, request).await
        }
        Commands::Board {
            question,
            context,
            advisors,
        } => {
            let mut request = BoardRequest::new(question);
            if let Some(context) = context {
                request = request.context(context);
            }
            if !advisors.is_empty() {
                request = request.advisors(advisors);
            }
            cmd_board(&client, request).await
        }
        Commands::Advisors => cmd_advisors(&client).await,
        Commands::Cancel { conversation_id } => {
            let outcome = client.cancel_generation(&conversation_id).await?;
            if outcome.cancelled {
                println!("cancelled generation for {}", outcome.conversation_id);
            } else {
                println!("nothing running for {}", outcome.conversation_id);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Aborts the stream on Ctrl-C. The returned task must be aborted once the
/// stream has ended.
fn abort_on_ctrl_c(abort: Option<AbortHandle>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok()
            && let Some(abort) = abort
        {
            abort.abort();
        }
    })
}

/// Asks the backend to stop generating once the local stream was dropped.
async fn stop_backend(client: &ThereseClient, state: &ChatState) {
    if let Some(id) = &state.conversation_id
        && let Err(e) = client.cancel_generation(id).await
    {
        warn!(error = %e, conversation_id = %id, "backend cancel failed");
    }
}

async fn cmd_chat(client: &ThereseClient, request: ChatRequest) -> Result<ExitCode> {
    let mut view = StreamView::<ChatState>::new();
    view.start(client.open_chat(request).await?);
    let abort = view.abort_handle();
    let interrupt = abort_on_ctrl_c(abort.clone());

    let mut printer = ChatPrinter::default();
    let output = drive(&mut view, &mut std::io::stdout(), |state| {
        if let Some(status) = printer.status_change(state) {
            eprintln!("[{status}]");
        }
        printer.delta(state).to_string()
    })
    .await;
    interrupt.abort();

    let state = view.snapshot();
    if let Err(e) = output {
        stop_backend(client, state).await;
        return Err(e).context("stdout closed while streaming");
    }
    write_out(&mut std::io::stdout(), "\n")?;
    if abort.is_some_and(|a| a.is_aborted()) {
        stop_backend(client, state).await;
        eprintln!("(interrupted)");
        return Ok(ExitCode::from(130));
    }
    if let Some(error) = &state.error {
        eprintln!("{error}");
        return Ok(ExitCode::from(1));
    }
    if state.cancelled {
        eprintln!("(generation cancelled)");
    }
    eprint!("{}", chat_summary(state));
    Ok(ExitCode::SUCCESS)
}

async fn cmd_board(client: &ThereseClient, request: BoardRequest) -> Result<ExitCode> {
    let mut view = StreamView::<DeliberationState>::new();
    view.start(client.open_deliberation(request).await?);
    let abort = view.abort_handle();
    let interrupt = abort_on_ctrl_c(abort.clone());

    let mut printer = BoardPrinter::default();
    let output = drive(&mut view, &mut std::io::stdout(), |state| printer.delta(state)).await;
    interrupt.abort();
    output.context("stdout closed while streaming")?;

    let state = view.snapshot();
    write_out(&mut std::io::stdout(), &format!("\n{}", board_summary(state)))?;
    if abort.is_some_and(|a| a.is_aborted()) {
        eprintln!("(interrupted)");
        return Ok(ExitCode::from(130));
    }
    if let Some(error) = &state.error {
        eprintln!("{error}");
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_advisors(client: &ThereseClient) -> Result<ExitCode> {
    for advisor in client.list_advisors().await? {
        println!(
            "{} {} ({}): {}",
            advisor.emoji, advisor.name, advisor.role, advisor.personality
        );
    }
    Ok(ExitCode::SUCCESS)
}
