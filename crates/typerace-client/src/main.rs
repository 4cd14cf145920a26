use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use rand::SeedableRng;

use typerace_client::api::TcpRoomApi;
use typerace_client::race::{RaceConfig, RaceMode};
use typerace_client::session::{FileStore, RoomEntry};
use typerace_client::typing::InputMode;
use typerace_client::{app, solo};

/// Multiplayer typing race client
#[derive(Parser, Debug)]
#[command(name = "typerace", version, about)]
struct Args {
    /// Room channel address
    #[arg(short = 's', long, default_value = "127.0.0.1:9870")]
    server: String,

    /// Request/response API address
    #[arg(long, default_value = "127.0.0.1:9871")]
    api: String,

    /// Nickname shown to the other players
    #[arg(short, long, default_value = "guest")]
    nickname: String,

    /// Create a new room
    #[arg(short, long)]
    create: bool,

    /// Join an existing room by code
    #[arg(short, long)]
    join: Option<String>,

    /// Race mode: words | time
    #[arg(long, default_value = "words")]
    mode: String,

    /// Round length in seconds (time mode)
    #[arg(long, default_value_t = 60)]
    seconds: i64,

    /// Passage length in words (created rooms and practice)
    #[arg(long, default_value_t = 50)]
    words: usize,

    /// Input gating: char | word
    #[arg(long, default_value = "char")]
    input: String,

    /// Practice offline, no server needed
    #[arg(long)]
    solo: bool,

    /// Where to remember the player identity per room
    #[arg(long, default_value = ".typerace-session.json")]
    session_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "typerace_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mode = match args.mode.as_str() {
        "words" => RaceMode::Words,
        "time" => RaceMode::Time,
        other => bail!("unknown mode: {other} (expected words or time)"),
    };
    let input = match args.input.as_str() {
        "char" => InputMode::CharStream,
        "word" => InputMode::WordCommitted,
        other => bail!("unknown input gating: {other} (expected char or word)"),
    };
    let config = RaceConfig {
        mode,
        input,
        round_secs: args.seconds,
    };

    enable_raw_mode()?;

    let result = if args.solo {
        solo::run_solo(args.nickname.clone(), config, args.words).await
    } else {
        let entry = if args.create {
            // generate the passage client-side so the room starts ready
            let mut rng = rand::rngs::StdRng::from_entropy();
            RoomEntry::Create {
                text: Some(typerace_common::words::generate_words(
                    args.words.max(1),
                    &mut rng,
                )),
            }
        } else if let Some(code) = args.join.clone() {
            RoomEntry::Join { code }
        } else {
            disable_raw_mode()?;
            bail!("pass --create, --join CODE, or --solo");
        };
        let api = TcpRoomApi::new(args.api.clone());
        let mut store = FileStore::open(args.session_file.clone());
        app::run(&api, &mut store, &args.server, &args.nickname, entry, config).await
    };

    disable_raw_mode()?;

    if let Err(e) = result {
        eprintln!("Error: {e}");
    }

    Ok(())
}
