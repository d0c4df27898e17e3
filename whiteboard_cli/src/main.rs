use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use serde::Deserialize;
use spinners::{Spinner, Spinners};
use std::io::{self, BufRead, Write};
use whiteboard_sync::connection::{self, Connection};
use whiteboard_sync::{Applied, Point, Raster, ResetOutcome, Rgba, SyncEngine, Tool};

// The base URL of the relay when --server is not given.
const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";
const CANVAS_WIDTH: u32 = 800;
const CANVAS_HEIGHT: u32 = 600;

/// A CLI for drawing on a shared whiteboard.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the relay.
    #[arg(long, global = true, default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the relay is up.
    Status,
    /// Draw one straight stroke on everyone's canvas.
    /// Example: whiteboard draw --from 10,10 --to 200,120 --color "#ff0000"
    Draw {
        #[arg(long, value_parser = parse_point)]
        from: Point,
        #[arg(long, value_parser = parse_point)]
        to: Point,
        #[arg(long, default_value = "#000000")]
        color: String,
        #[arg(long, default_value_t = 3.0)]
        width: f64,
        #[arg(long, value_enum, default_value_t = ToolArg::Pencil)]
        tool: ToolArg,
        /// Number of segments the stroke is split into.
        #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..))]
        steps: u32,
    },
    /// Clear the canvas for everyone.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Follow what everyone draws until Ctrl-C.
    Watch {
        #[arg(long, default_value_t = CANVAS_WIDTH)]
        width: u32,
        #[arg(long, default_value_t = CANVAS_HEIGHT)]
        height: u32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ToolArg {
    Pencil,
    Eraser,
}

impl From<ToolArg> for Tool {
    fn from(tool: ToolArg) -> Self {
        match tool {
            ToolArg::Pencil => Tool::Pencil,
            ToolArg::Eraser => Tool::Eraser,
        }
    }
}

// This struct is used to deserialize the JSON health response from the relay.
#[derive(Deserialize, Debug)]
struct HealthResponse {
    status: String,
    version: String,
    sessions: usize,
    started_at: DateTime<Utc>,
}

fn parse_point(raw: &str) -> Result<Point, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got {raw:?}"))?;
    let coord = |s: &str| {
        s.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("{s:?} is not a number"))
    };
    Ok(Point::new(coord(x)?, coord(y)?))
}

// The relay accepts sockets on its base path.
fn websocket_url(server: &str) -> String {
    let base = server.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}/")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}/")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        format!("{base}/")
    } else {
        format!("ws://{base}/")
    }
}

fn lerp(from: Point, to: Point, t: f64) -> Point {
    Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn ask(question: &str) -> bool {
    print!("{question} [y/N] ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(_) => false,
    }
}

async fn open(server: &str) -> Option<Connection> {
    let mut sp = Spinner::new(Spinners::Dots9, "Connecting to the relay...".into());
    match connection::connect(&websocket_url(server)).await {
        Ok(conn) => {
            sp.stop_with_message("✓ Connected.".into());
            Some(conn)
        }
        Err(e) => {
            sp.stop_with_message(format!("✗ Error: Could not connect to the relay: {}", e));
            None
        }
    }
}

async fn status(server: &str) -> anyhow::Result<()> {
    let mut sp = Spinner::new(Spinners::Dots9, "Checking the relay...".into());
    let client = reqwest::Client::new();
    let base = server.trim_end_matches('/');

    let res = match client.get(format!("{}/", base)).send().await {
        Ok(res) => res,
        Err(e) => {
            sp.stop_with_message(format!("✗ Error: Could not connect to the server: {}", e));
            return Ok(());
        }
    };
    if !res.status().is_success() {
        sp.stop_with_message(format!("✗ Error: Relay answered with status {}", res.status()));
        return Ok(());
    }
    let banner = res.text().await?;
    sp.stop_with_message(format!("✓ {}", banner.trim()));

    // Older relays only have the banner.
    if let Ok(res) = client.get(format!("{}/health", base)).send().await {
        if let Ok(health) = res.json::<HealthResponse>().await {
            let mut table = Table::new();
            table.set_header(vec!["Status", "Version", "Sessions", "Up since"]);
            table.add_row(vec![
                health.status,
                health.version,
                health.sessions.to_string(),
                health.started_at.with_timezone(&Local).to_rfc2822(),
            ]);
            println!("{table}");
        }
    }
    Ok(())
}

async fn draw(
    server: &str,
    from: Point,
    to: Point,
    color: String,
    width: f64,
    tool: Tool,
    steps: u32,
) -> anyhow::Result<()> {
    Rgba::parse(&color)?;
    if !(width.is_finite() && width > 0.0) {
        anyhow::bail!("width must be positive, got {width}");
    }
    let Some(conn) = open(server).await else {
        return Ok(());
    };

    let mut engine = SyncEngine::new(Raster::new(CANVAS_WIDTH, CANVAS_HEIGHT), conn.transport.clone());
    engine.select_color(color);
    engine.select_width(width)?;
    engine.select_tool(tool);

    engine.pointer_down(from);
    let drawn = (1..=steps)
        .filter_map(|i| engine.pointer_move(lerp(from, to, i as f64 / steps as f64)))
        .count();
    engine.pointer_up();

    conn.close().await;
    println!("✓ Drew a {}-segment stroke from ({}, {}) to ({}, {}).", drawn, from.x, from.y, to.x, to.y);
    Ok(())
}

async fn reset(server: &str, yes: bool) -> anyhow::Result<()> {
    let Some(conn) = open(server).await else {
        return Ok(());
    };

    let mut engine = SyncEngine::new(Raster::new(CANVAS_WIDTH, CANVAS_HEIGHT), conn.transport.clone());
    let outcome = engine.request_reset(|| yes || ask("Clear the canvas for everyone?"));
    conn.close().await;

    match outcome {
        ResetOutcome::Cancelled => println!("Reset cancelled."),
        ResetOutcome::Broadcast => println!("✓ Sent reset command."),
        ResetOutcome::LocalOnly => println!("✗ Connection was not open, reset was not sent."),
    }
    Ok(())
}

#[derive(Default)]
struct Tally {
    segments: usize,
    resets: usize,
    dropped: usize,
}

async fn watch(server: &str, width: u32, height: u32) -> anyhow::Result<()> {
    let Some(mut conn) = open(server).await else {
        return Ok(());
    };
    println!("Watching the canvas. Press Ctrl-C to stop.");

    let mut engine = SyncEngine::new(Raster::new(width, height), conn.transport.clone());
    let mut tally = Tally::default();

    loop {
        tokio::select! {
            frame = conn.incoming.recv() => {
                let Some(text) = frame else {
                    println!("✗ Disconnected from the relay.");
                    break;
                };
                let now = Local::now().format("%H:%M:%S");
                match engine.receive_text(&text) {
                    Ok(Applied::Segment) => {
                        tally.segments += 1;
                        println!("[{}] segment, {} pixels painted", now, engine.surface().painted_pixels());
                    }
                    Ok(Applied::Reset) => {
                        tally.resets += 1;
                        println!("[{}] reset, canvas cleared", now);
                    }
                    Err(e) => {
                        tally.dropped += 1;
                        println!("[{}] dropped: {}", now, e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    conn.close().await;

    let mut table = Table::new();
    table.set_header(vec!["Segments", "Resets", "Dropped", "Painted pixels"]);
    table.add_row(vec![
        tally.segments.to_string(),
        tally.resets.to_string(),
        tally.dropped.to_string(),
        engine.surface().painted_pixels().to_string(),
    ]);
    println!("{table}");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => status(&cli.server).await,
        Commands::Draw {
            from,
            to,
            color,
            width,
            tool,
            steps,
        } => draw(&cli.server, from, to, color, width, tool.into(), steps).await,
        Commands::Reset { yes } => reset(&cli.server, yes).await,
        Commands::Watch { width, height } => watch(&cli.server, width, height).await,
    }
}
