//! CLI binary for verum-omnis.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use verum_omnis::{
    analyze, export_html, export_pdf, load_inputs, plan, verify_export, write_html,
    AnalysisConfig, Backend, ContentMode, EvidenceWarning, ExportOptions, LogoStore, PartSummary,
    RequestPlan, Verification,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

/// Spinner shown while the single model call is outstanding.
fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Verum Omnis");
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a question with evidence, print the report
  verum analyze "Did the landlord breach the lease?" -e lease.pdf -e photo.jpg

  # Ask for deeper reasoning and export a sealed PDF
  verum analyze "Timeline of the dispute" -e chat.txt --think --pdf reports/

  # See which model would be used and what would be sent (no API call)
  verum plan "Review" -e contract.pdf

  # Re-export a saved report as PDF or HTML
  verum export report.md --out-dir reports/ --keep-unsealed
  verum export report.md --format html --brightness 70

  # Check a seal against the kept pre-stamp document
  verum verify reports/Verum-Omnis-Report-1760000000000.unsealed.pdf \
               reports/Verum-Omnis-Report-1760000000000.pdf

  # Company logo drawn on exported reports
  verum logo set logo.png
  verum logo clear

MODEL SELECTION:
  Evidence            Thinking   Model              Budget
  ────────────────    ────────   ────────────────   ──────
  any image           any        gemini-2.5-flash   none
  PDF (no image)      any        gemini-2.5-pro     32768
  text only / none    on         gemini-2.5-pro     32768
  text only / none    off        gemini-2.5-flash   none

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (API_KEY also accepted)
  VERUM_PROVIDER          Use an edgequake-llm provider instead of Gemini REST
  VERUM_STATE_DIR         Directory of state.json (stored logo)
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory) for PDF export
  RUST_LOG                Override log filter
"#;

/// Forensic evidence analysis with sealed PDF reports.
#[derive(Parser, Debug)]
#[command(
    name = "verum",
    version,
    about = "Forensic evidence analysis with hosted language models and hash-sealed PDF reports",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding state.json (the stored logo).
    #[arg(long, global = true, env = "VERUM_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Disable the spinner.
    #[arg(long, global = true, env = "VERUM_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "VERUM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "VERUM_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send prompt and evidence to the model and print the report.
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        model: ModelArgs,

        /// Write the Markdown report to this file instead of stdout.
        #[arg(short, long, env = "VERUM_OUTPUT")]
        output: Option<PathBuf>,

        /// Print the report and request plan as JSON.
        #[arg(long)]
        json: bool,

        /// Also export a sealed PDF into this directory.
        #[arg(long, value_name = "DIR")]
        pdf: Option<PathBuf>,

        /// Also export a standalone HTML page into this directory.
        #[arg(long, value_name = "DIR")]
        html: Option<PathBuf>,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Show the model choice and request parts without calling the model.
    Plan {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        model: ModelArgs,

        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export a saved Markdown report as a sealed PDF or HTML page.
    Export {
        /// Markdown report file.
        report: PathBuf,

        /// Output directory.
        #[arg(long, default_value = ".", env = "VERUM_OUT_DIR")]
        out_dir: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value = "pdf")]
        format: FormatArg,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Check a sealed PDF against its pre-stamp document.
    Verify {
        /// The `.unsealed.pdf` written by `--keep-unsealed`.
        unsealed: PathBuf,
        /// The sealed export.
        sealed: PathBuf,
    },

    /// Manage the company logo drawn on exported reports.
    Logo {
        #[command(subcommand)]
        action: LogoAction,
    },
}

#[derive(Subcommand, Debug)]
enum LogoAction {
    /// Store a PNG as the logo (other formats are rejected).
    Set { path: PathBuf },
    /// Remove the stored logo.
    Clear,
    /// Show whether a logo is stored.
    Show {
        /// Print the stored data URL.
        #[arg(long)]
        data_url: bool,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Case description or question.
    prompt: Option<String>,

    /// Read the prompt from a file instead.
    #[arg(long, conflicts_with = "prompt")]
    prompt_file: Option<PathBuf>,

    /// Evidence file path or HTTP/HTTPS URL (repeatable, order is kept).
    #[arg(short, long = "evidence", value_name = "PATH|URL")]
    evidence: Vec<String>,

    /// Request deeper reasoning (ignored when images are present).
    #[arg(long, env = "VERUM_THINK")]
    think: bool,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Fast model variant (used whenever images are present).
    #[arg(long, env = "VERUM_FAST_MODEL")]
    fast_model: Option<String>,

    /// Heavy model variant (thinking mode or PDF evidence).
    #[arg(long, env = "VERUM_PRO_MODEL")]
    pro_model: Option<String>,

    /// Reasoning budget attached to heavy-variant requests.
    #[arg(long, env = "VERUM_THINKING_BUDGET")]
    thinking_budget: Option<u32>,

    /// edgequake-llm provider (openai, anthropic, ollama, ...) instead of Gemini REST.
    #[arg(long, env = "VERUM_PROVIDER")]
    provider: Option<String>,

    /// Gemini API key (else GEMINI_API_KEY / API_KEY).
    #[arg(long, env = "VERUM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini API base URL.
    #[arg(long, env = "VERUM_API_BASE")]
    api_base: Option<String>,

    /// Model call timeout in seconds (default: none).
    #[arg(long, env = "VERUM_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// HTTP download timeout for URL evidence, in seconds.
    #[arg(long, env = "VERUM_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Path to a text file replacing the built-in system instruction.
    #[arg(long, env = "VERUM_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Text brightness of the exported report (40–100).
    #[arg(long, env = "VERUM_BRIGHTNESS", default_value_t = 100,
          value_parser = clap::value_parser!(u8).range(40..=100))]
    brightness: u8,

    /// Lay out the report as literal text instead of Markdown.
    #[arg(long)]
    plain: bool,

    /// Keep the pre-stamp PDF next to the export so the seal can be verified.
    #[arg(long, env = "VERUM_KEEP_UNSEALED")]
    keep_unsealed: bool,

    /// Do not draw the stored logo.
    #[arg(long)]
    no_logo: bool,
}

impl ExportArgs {
    fn mode(&self) -> ContentMode {
        if self.plain {
            ContentMode::Plain
        } else {
            ContentMode::Markdown
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum FormatArg {
    Pdf,
    Html,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", red("error:"), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is visible.
    let show_progress = !cli.quiet && !cli.no_progress && spinner_command(&cli.command);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Analyze {
            input,
            model,
            output,
            json,
            pdf,
            html,
            export,
        } => {
            let config = build_config(&cli, model, export.brightness).await?;
            run_analyze(&cli, &config, input, output.as_deref(), *json, pdf.as_deref(), html.as_deref(), export, show_progress).await
        }
        Command::Plan { input, model, json } => {
            let config = build_config(&cli, model, 100).await?;
            let prompt = read_prompt(input).await?;
            let files = load_inputs(&input.evidence, &config)
                .await
                .context("Failed to load evidence")?;
            let plan = plan(&prompt, &files, input.think, &config)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&plan).context("Failed to serialise plan")?);
            } else {
                print_plan(&plan);
            }
            Ok(())
        }
        Command::Export {
            report,
            out_dir,
            format,
            export,
        } => {
            let config = state_config(&cli)?;
            let markdown = tokio::fs::read_to_string(report)
                .await
                .with_context(|| format!("Failed to read report from {:?}", report))?;
            match format {
                FormatArg::Pdf => run_export_pdf(&cli, &config, &markdown, out_dir, export).await,
                FormatArg::Html => run_export_html(&cli, &config, &markdown, out_dir, export).await,
            }
        }
        Command::Verify { unsealed, sealed } => {
            match verify_export(unsealed, sealed).await.context("Verification failed")? {
                Verification::Match { seal } => {
                    if !cli.quiet {
                        eprintln!("{} Seal matches", green("✔"));
                        eprintln!("   SHA-256    {}", seal.digest);
                        eprintln!("   Generated  {}", seal.timestamp());
                    }
                    Ok(())
                }
                Verification::Mismatch {
                    embedded,
                    recomputed,
                } => bail!(
                    "seal mismatch: stamped {} but pre-stamp document hashes to {}",
                    embedded.digest,
                    recomputed
                ),
                Verification::NoSeal => bail!("no seal found on the last page of {:?}", sealed),
            }
        }
        Command::Logo { action } => run_logo(&cli, action).await,
    }
}

fn spinner_command(command: &Command) -> bool {
    matches!(command, Command::Analyze { json: false, .. } | Command::Export { .. })
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli, args: &ModelArgs, brightness: u8) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .download_timeout_secs(args.download_timeout)
        .brightness(brightness);

    if let Some(ref m) = args.fast_model {
        builder = builder.fast_model(m);
    }
    if let Some(ref m) = args.pro_model {
        builder = builder.pro_model(m);
    }
    if let Some(b) = args.thinking_budget {
        builder = builder.thinking_budget(b);
    }
    if let Some(ref p) = args.provider {
        builder = builder.backend(Backend::Provider(p.clone()));
    }
    if let Some(ref k) = args.api_key {
        builder = builder.api_key(k);
    }
    if let Some(ref b) = args.api_base {
        builder = builder.api_base(b);
    }
    if let Some(t) = args.api_timeout {
        builder = builder.api_timeout_secs(t);
    }
    if let Some(ref dir) = cli.state_dir {
        builder = builder.state_dir(dir);
    }
    if let Some(ref path) = args.system_prompt {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_instruction(text);
    }

    builder.build().context("Invalid configuration")
}

/// Config for commands that only need the state location.
fn state_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder();
    if let Some(ref dir) = cli.state_dir {
        builder = builder.state_dir(dir);
    }
    builder.build().context("Invalid configuration")
}

async fn read_prompt(input: &InputArgs) -> Result<String> {
    match (&input.prompt, &input.prompt_file) {
        (_, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path)),
        (Some(p), None) => Ok(p.clone()),
        (None, None) => Ok(String::new()),
    }
}

fn print_warnings(warnings: &[EvidenceWarning]) {
    for w in warnings {
        eprintln!("{} {}", yellow("⚠"), w);
    }
}

fn print_plan(plan: &RequestPlan) {
    println!("Model:        {}", plan.model);
    match plan.thinking_budget {
        Some(b) => println!("Thinking:     budget {b}"),
        None => println!("Thinking:     off"),
    }
    if let verum_omnis::pipeline::compose::ModelSelection::Fast {
        thinking_overridden: true,
    } = plan.selection
    {
        println!("              {}", dim("(requested, but images force the fast model)"));
    }
    println!("Parts:");
    for (i, part) in plan.parts.iter().enumerate() {
        match part {
            PartSummary::Text { chars, preview } => {
                println!("  {:>2}. text        {:>8} chars  {}", i + 1, chars, dim(preview))
            }
            PartSummary::InlineData {
                mime_type,
                base64_len,
            } => println!("  {:>2}. inlineData  {:>8} b64    {}", i + 1, base64_len, mime_type),
        }
    }
    print_warnings(&plan.warnings);
}

#[allow(clippy::too_many_arguments)]
async fn run_analyze(
    cli: &Cli,
    config: &AnalysisConfig,
    input: &InputArgs,
    output: Option<&Path>,
    json: bool,
    pdf_dir: Option<&Path>,
    html_dir: Option<&Path>,
    export: &ExportArgs,
    show_progress: bool,
) -> Result<()> {
    let prompt = read_prompt(input).await?;
    let files = load_inputs(&input.evidence, config)
        .await
        .context("Failed to load evidence")?;

    let bar = show_progress.then(|| spinner("Analyzing evidence…"));
    let result = analyze(&prompt, files, input.think, config).await;
    if let Some(ref bar) = bar {
        bar.finish_and_clear();
    }
    let out = result.context("Analysis failed")?;

    if !cli.quiet {
        print_warnings(&out.warnings);
    }

    if json {
        let value = serde_json::json!({
            "report": out.report,
            "plan": out.plan,
            "durationMs": out.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&value).context("Failed to serialise output")?);
    } else if let Some(path) = output {
        tokio::fs::write(path, &out.report.markdown)
            .await
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        if !cli.quiet {
            eprintln!(
                "{}  {}  {}ms  →  {}",
                green("✔"),
                out.report.model,
                out.duration_ms,
                bold(&path.display().to_string())
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(out.report.markdown.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if let Some(dir) = pdf_dir {
        run_export_pdf(cli, config, &out.report.markdown, dir, export).await?;
    }
    if let Some(dir) = html_dir {
        run_export_html(cli, config, &out.report.markdown, dir, export).await?;
    }
    Ok(())
}

async fn stored_logo(config: &AnalysisConfig, export: &ExportArgs) -> Result<Option<verum_omnis::StoredLogo>> {
    if export.no_logo {
        return Ok(None);
    }
    let store = LogoStore::from_config(config)?;
    Ok(store.load().await.context("Failed to read stored logo")?)
}

async fn run_export_pdf(
    cli: &Cli,
    config: &AnalysisConfig,
    markdown: &str,
    out_dir: &Path,
    export: &ExportArgs,
) -> Result<()> {
    let logo = match stored_logo(config, export).await? {
        Some(stored) => Some(stored.to_image().context("Stored logo is unusable")?),
        None => None,
    };
    let options = ExportOptions {
        brightness: verum_omnis::Brightness::new(export.brightness),
        mode: export.mode(),
        logo,
        keep_unsealed: export.keep_unsealed,
    };

    let bar = (!cli.quiet && !cli.no_progress).then(|| spinner("Sealing PDF…"));
    let result = export_pdf(markdown, out_dir, options).await;
    if let Some(ref bar) = bar {
        bar.finish_and_clear();
    }
    let outcome = result.context("PDF export failed")?;

    if !cli.quiet {
        eprintln!(
            "{}  {} pages  →  {}",
            green("✔"),
            outcome.page_count,
            bold(&outcome.path.display().to_string())
        );
        eprintln!("   SHA-256  {}", dim(&outcome.seal.digest));
        if let Some(ref p) = outcome.unsealed_path {
            eprintln!("   pre-stamp document  {}", dim(&p.display().to_string()));
        }
    }
    Ok(())
}

async fn run_export_html(
    cli: &Cli,
    config: &AnalysisConfig,
    markdown: &str,
    out_dir: &Path,
    export: &ExportArgs,
) -> Result<()> {
    let logo = stored_logo(config, export).await?;
    let html = export_html(
        markdown,
        export.mode(),
        verum_omnis::Brightness::new(export.brightness),
        logo.as_ref(),
    )?;
    let path = write_html(&html, out_dir, chrono::Utc::now())
        .await
        .context("HTML export failed")?;
    if !cli.quiet {
        eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
    }
    Ok(())
}

async fn run_logo(cli: &Cli, action: &LogoAction) -> Result<()> {
    let config = state_config(cli)?;
    let store = LogoStore::from_config(&config)?;
    match action {
        LogoAction::Set { path } => {
            store.set_from_file(path).await?;
            if !cli.quiet {
                eprintln!("{} Logo stored in {}", green("✔"), store.path().display());
            }
        }
        LogoAction::Clear => {
            let had = store.clear().await?;
            if !cli.quiet {
                if had {
                    eprintln!("{} Logo cleared", green("✔"));
                } else {
                    eprintln!("{}", dim("No logo was stored"));
                }
            }
        }
        LogoAction::Show { data_url } => match store.load().await? {
            Some(logo) if *data_url => println!("{}", logo.data_url()),
            Some(logo) => {
                let image = logo.to_image()?;
                println!(
                    "Logo:   {}x{} px PNG ({} bytes)",
                    image.width_px,
                    image.height_px,
                    image.png.len()
                );
                println!("Store:  {}", store.path().display());
            }
            None => println!("No logo stored ({})", store.path().display()),
        },
    }
    Ok(())
}
