use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use africon_gateway::api::ApiServerBuilder;
use africon_gateway::speech::console::{ConsoleRecognizer, ConsoleSynthesizer};
use africon_gateway::speech::{
    Hint, InputCommand, InputEvent, OutputCommand, run_speech_input, run_speech_output,
};
use africon_gateway::{
    ChatRequest, ChatService, Config, GeminiProvider, LanguageDetector, Provider,
};

/// Africon - voice and text assistant for African languages, history and culture
#[derive(Parser)]
#[command(name = "africon", version, about)]
struct Cli {
    /// Port to listen on (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding the web UI (overrides configuration)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Send one message and print the reply
    Ask {
        /// Message text
        message: String,
        /// Session to continue
        #[arg(short, long, default_value = "default")]
        session: String,
    },
    /// Detect the language of some text
    Detect {
        /// Text to classify
        text: String,
    },
    /// Voice loop on the terminal: typed lines in, printed speech out
    Console {
        /// Session to continue (a fresh one by default)
        #[arg(short, long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,africon_gateway=info",
        1 => "info,africon_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, cli.port, cli.static_dir).await,
        Command::Ask { message, session } => ask(&config, message, session).await,
        Command::Detect { text } => detect(&config, &text).await,
        Command::Console { session } => console(&config, session).await,
    }
}

fn provider(config: &Config) -> anyhow::Result<Arc<dyn Provider>> {
    let api_key = config.api_key()?.clone();
    let provider = GeminiProvider::new(
        api_key,
        config.provider.model.clone(),
        config.provider.base_url.clone(),
        config.provider.request_timeout,
    )?;
    Ok(Arc::new(provider))
}

async fn serve(
    config: Config,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let chat = Arc::new(ChatService::new(provider(&config)?, &config));
    let sweeper = Arc::clone(chat.sessions()).spawn_sweeper();

    let port = port.unwrap_or(config.server.port);
    tracing::info!(
        port,
        model = %config.provider.model,
        "starting africon gateway"
    );

    let server = ApiServerBuilder::new(chat)
        .port(port)
        .static_dir(static_dir.or(config.server.static_dir))
        .build();

    let result = tokio::select! {
        result = server.run() => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            signal.map_err(anyhow::Error::from)
        }
    };

    sweeper.abort();
    result
}

async fn ask(config: &Config, message: String, session: String) -> anyhow::Result<()> {
    let chat = ChatService::new(provider(config)?, config);

    match chat
        .handle_message(ChatRequest::new(message).session(session))
        .await
    {
        Ok(reply) => {
            println!("{}", reply.reply);
            tracing::info!(
                language = %reply.language.detected_language,
                has_context = reply.has_context,
                "reply received"
            );
            Ok(())
        }
        Err(failure) => {
            println!("{}", failure.reply);
            anyhow::bail!("{}", failure.error)
        }
    }
}

async fn detect(config: &Config, text: &str) -> anyhow::Result<()> {
    let detector = LanguageDetector::new(provider(config)?);
    let detected = detector.detect(text).await;
    println!("{}", serde_json::to_string_pretty(&detected)?);
    Ok(())
}

async fn console(config: &Config, session: Option<String>) -> anyhow::Result<()> {
    let chat = ChatService::new(provider(config)?, config);
    let session = session.unwrap_or_else(|| format!("console-{}", uuid::Uuid::new_v4()));

    let (recognition_tx, recognition_rx) = mpsc::unbounded_channel();
    let (input_cmd_tx, input_cmd_rx) = mpsc::unbounded_channel();
    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    let input = tokio::spawn(run_speech_input(
        ConsoleRecognizer::new(recognition_tx),
        input_cmd_rx,
        recognition_rx,
        input_tx,
    ));

    let (synthesis_tx, synthesis_rx) = mpsc::unbounded_channel();
    let (output_cmd_tx, output_cmd_rx) = mpsc::unbounded_channel();
    let output = tokio::spawn(run_speech_output(
        ConsoleSynthesizer::new(synthesis_tx),
        output_cmd_rx,
        synthesis_rx,
    ));

    println!("Africon console (session {session}). Type a message and press Enter; Ctrl-D quits.");
    input_cmd_tx.send(InputCommand::Start)?;

    while let Some(event) = input_rx.recv().await {
        match event {
            InputEvent::Submitted(text) => {
                println!("🎤 {text}");
                let (reply, language) = match chat
                    .handle_message(ChatRequest::new(text).session(session.as_str()))
                    .await
                {
                    Ok(reply) => (reply.reply, Some(reply.language.language_code)),
                    Err(failure) => (failure.reply, None),
                };
                output_cmd_tx.send(OutputCommand::Speak {
                    text: reply,
                    language,
                })?;
                input_cmd_tx.send(InputCommand::Start)?;
            }
            InputEvent::Hint(Hint::NoSpeech) => {
                tracing::debug!("no input heard, listening again");
                input_cmd_tx.send(InputCommand::Start)?;
            }
            InputEvent::Hint(Hint::PermissionDenied) => {
                anyhow::bail!("input permission denied");
            }
            InputEvent::Hint(Hint::Failed(reason)) => {
                tracing::info!(%reason, "input closed");
                break;
            }
        }
    }

    drop(input_cmd_tx);
    drop(output_cmd_tx);
    input.await?;
    output.await?;
    Ok(())
}
