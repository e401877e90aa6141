//! CLI tool to build outreach sequences from a plan file and start them.
//!
//! Usage:
//!   heyoflow build --input plan.json [--output sequence.automerge] [--json]
//!   heyoflow start --input plan.json --base-url https://api.heyo.com [--token ...]

mod input;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use heyoflow::sequence::codec;
use heyoflow::{
    ExportConfig, HttpProcessStarter, SequenceDocument, SessionController, StepKind,
};
use input::{InputPlan, Intent};

#[derive(Parser, Debug)]
#[command(
    name = "heyoflow",
    about = "Build outreach sequences and start them on the execution service",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a plan and print the resulting chain
    Build(BuildArgs),
    /// Replay a plan and start the process on the execution service
    Start(StartArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Plan JSON file
    #[arg(short, long)]
    input: PathBuf,

    /// Write the sequence here (.automerge for a document, anything else for snapshot JSON)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the export payload as JSON instead of the chain
    #[arg(long, default_value = "false")]
    json: bool,
}

#[derive(Args)]
struct StartArgs {
    /// Plan JSON file
    #[arg(short, long)]
    input: PathBuf,

    /// Execution service base URL
    #[arg(short = 'b', long, env = "HEYO_API_URL")]
    base_url: String,

    /// Auth token (or set HEYO_AUTH_TOKEN env var)
    #[arg(short = 't', long, env = "HEYO_AUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Build and validate only, don't call the service
    #[arg(long)]
    dry_run: bool,
}

impl std::fmt::Debug for StartArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartArgs")
            .field("input", &self.input)
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// Initialize the tracing subscriber for logging.
///
/// `--debug` wins over `RUST_LOG`; the default is INFO for this crate.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("heyoflow=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("heyoflow=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    tracing::debug!("heyoflow starting with args: {:?}", cli);

    match cli.command {
        Command::Build(args) => build(args),
        Command::Start(args) => start(args).await,
    }
}

fn build(args: BuildArgs) -> Result<()> {
    let mut controller = replay(&args.input)?;

    if let Some(output) = &args.output {
        write_output(&controller, output)?;
        println!("Wrote {}", output.display());
    }

    if args.json {
        let payload = controller
            .begin_export()
            .context("Sequence is not ready for export")?;
        controller.finish_export();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_chain(&controller);
    }
    Ok(())
}

async fn start(args: StartArgs) -> Result<()> {
    let mut controller = replay(&args.input)?;
    print_chain(&controller);

    if args.dry_run {
        let payload = controller
            .begin_export()
            .context("Sequence is not ready for export")?;
        controller.finish_export();
        println!("Dry run: {} steps ready to start", payload.steps.len());
        return Ok(());
    }

    let mut config = ExportConfig::new(&args.base_url);
    if let Some(token) = args.token.filter(|t| !t.trim().is_empty()) {
        config = config.with_token(token.trim());
    }
    let starter = HttpProcessStarter::new(&config).context("Failed to create HTTP client")?;

    println!("Starting process at {}...", config.endpoint());
    controller
        .export_with(&starter)
        .await
        .context("Failed to start process")?;
    println!("✓ Process started successfully");
    Ok(())
}

/// Reads a plan and applies every intent through a session.
fn replay(path: &Path) -> Result<SessionController> {
    if !path.exists() {
        anyhow::bail!("Input file does not exist: {}", path.display());
    }
    let content = std::fs::read_to_string(path).context("Failed to read plan file")?;
    let plan: InputPlan = serde_json::from_str(&content).context("Failed to parse plan JSON")?;

    let mut controller = SessionController::new();
    for (index, intent) in plan.intents.into_iter().enumerate() {
        apply(&mut controller, intent).with_context(|| format!("Intent #{} failed", index + 1))?;
    }
    Ok(controller)
}

fn apply(controller: &mut SessionController, intent: Intent) -> Result<()> {
    match intent {
        Intent::Add { kind, fields } => {
            let kind: StepKind = kind.parse()?;
            let composition = controller.begin_add(kind)?;
            if composition.kind != kind {
                tracing::warn!(
                    requested = %kind,
                    "sequence is empty, adding a {} first",
                    composition.kind
                );
            }
            submit(controller, &fields)
        }
        Intent::Edit { id, kind, fields } => {
            controller.begin_edit(&id)?;
            if let Some(kind) = kind {
                if let Err(e) = controller.change_kind(kind.parse()?) {
                    controller.cancel()?;
                    return Err(e.into());
                }
            }
            submit(controller, &fields)
        }
        Intent::Delete { id } => {
            controller.begin_edit(&id)?;
            if let Err(e) = controller.submit_delete() {
                controller.cancel()?;
                return Err(e.into());
            }
            Ok(())
        }
        Intent::Layout { id, layout } => {
            controller.set_layout(&id, layout)?;
            Ok(())
        }
    }
}

fn submit(controller: &mut SessionController, fields: &heyoflow::FormFields) -> Result<()> {
    if let Err(e) = controller.submit(fields) {
        // A failed submit may leave the form open; plans are not interactive.
        controller.cancel()?;
        return Err(e.into());
    }
    Ok(())
}

fn write_output(controller: &SessionController, path: &Path) -> Result<()> {
    let bytes = if path.extension().is_some_and(|ext| ext == "automerge") {
        let mut doc = SequenceDocument::from_graph(controller.graph())
            .context("Failed to create sequence document")?;
        doc.save()
    } else {
        serde_json::to_vec_pretty(&controller.snapshot())?
    };
    std::fs::write(path, bytes).context("Failed to write output file")?;
    Ok(())
}

fn print_chain(controller: &SessionController) {
    let chain = controller.graph().chain();
    println!("Sequence ({} steps):", chain.len());
    for step in chain {
        let label = codec::encode(&step.content);
        let detail = label.lines().skip(1).collect::<Vec<_>>().join(" ");
        println!("  [{:>3}] {:<12} {}", step.id, step.kind().label(), detail);
    }
}
