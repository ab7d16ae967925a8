//! Instruction compiler CLI.
//!
//! Reads newline-delimited instructions and prints one compiled action per
//! instruction as a JSON line on stdout.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use compiler::core::action::first_action;
use compiler::core::prompt::{
    DEFAULT_BASE_PROMPT, build_find_element_prompt, build_instruction_prompt, is_no_response,
};
use compiler::core::state::SequencerState;
use compiler::error::CompilerError;
use compiler::exit_codes;
use compiler::gateway::CompletionGateway;
use compiler::io::completion::HttpCompletionService;
use compiler::io::config::{CompilerConfig, load_config, write_config};
use compiler::io::transcript::append_record;
use compiler::logging;
use compiler::sequencer::SequencerBuilder;

const PROMPT_SEPARATOR: &str = "\n=====\n";

#[derive(Parser)]
#[command(
    name = "compiler",
    version,
    about = "Compile natural-language instructions into automation actions"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "compiler.toml")]
    config: PathBuf,

    /// Log prompts and completions.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the prompt for every non-blank instruction without calling the service.
    Prompt {
        /// Instruction file (reads stdin when omitted).
        #[arg(long)]
        instructions: Option<PathBuf>,
        /// Replace the built-in base prompt.
        #[arg(long)]
        base_prompt: Option<PathBuf>,
    },
    /// Compile every instruction and print one JSON record per action.
    Run {
        /// Instruction file (reads stdin when omitted).
        #[arg(long)]
        instructions: Option<PathBuf>,
        /// Replace the built-in base prompt.
        #[arg(long)]
        base_prompt: Option<PathBuf>,
        /// Also append records to this JSON-lines file.
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
    /// Ask the model for a locator matching a description in a page's HTML.
    FindElement {
        /// What the element looks like or does.
        #[arg(long)]
        description: String,
        /// File holding the cleaned page HTML.
        #[arg(long)]
        html: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Prompt {
            instructions,
            base_prompt,
        } => cmd_prompt(instructions.as_deref(), base_prompt.as_deref()),
        Command::Run {
            instructions,
            base_prompt,
            transcript,
        } => {
            let cfg = load_config(&cli.config)?;
            cmd_run(
                &cfg,
                instructions.as_deref(),
                base_prompt.as_deref(),
                transcript.as_deref(),
                cli.verbose,
            )
        }
        Command::FindElement { description, html } => {
            let cfg = load_config(&cli.config)?;
            cmd_find_element(&cfg, &description, &html)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("config exists: {}", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &CompilerConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("config written: {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_prompt(instructions: Option<&Path>, base_prompt: Option<&Path>) -> Result<i32> {
    let text = read_instructions(instructions)?;
    let base = read_base_prompt(base_prompt)?;
    let state = SequencerState::from_input(&text);
    let prompts: Vec<String> = state
        .pending()
        .iter()
        .filter(|instruction| !instruction.trim().is_empty())
        .map(|instruction| build_instruction_prompt(&base, instruction))
        .collect();
    println!("{}", prompts.join(PROMPT_SEPARATOR));
    Ok(exit_codes::OK)
}

fn cmd_run(
    cfg: &CompilerConfig,
    instructions: Option<&Path>,
    base_prompt: Option<&Path>,
    transcript: Option<&Path>,
    verbose: bool,
) -> Result<i32> {
    let text = read_instructions(instructions)?;
    let base = read_base_prompt(base_prompt)?;
    let service = HttpCompletionService::new(&cfg.base_url, api_key(cfg)?);
    let gateway = CompletionGateway::new(service, cfg.completion_settings(), cfg.backoff_policy());
    let mut sequencer = SequencerBuilder::new()
        .instructions(text)
        .base_prompt(base)
        .verbose(verbose)
        .build(gateway)?;

    let produced = sequencer.compile_all(|record| -> Result<()> {
        println!(
            "{}",
            serde_json::to_string(record).context("serialize action record")?
        );
        if let Some(path) = transcript {
            append_record(path, record)?;
        }
        Ok(())
    })?;
    info!(produced, "run complete");
    Ok(exit_codes::OK)
}

fn cmd_find_element(cfg: &CompilerConfig, description: &str, html: &Path) -> Result<i32> {
    let cleaned_html =
        fs::read_to_string(html).with_context(|| format!("read {}", html.display()))?;
    let prompt = build_find_element_prompt(description, &cleaned_html, cfg.html_budget_bytes)
        .context("render find-element prompt")?;
    let service = HttpCompletionService::new(&cfg.base_url, api_key(cfg)?);
    let gateway = CompletionGateway::new(service, cfg.completion_settings(), cfg.backoff_policy());
    let locator = first_action(&gateway.complete(&prompt).context("find element")?);
    if is_no_response(&locator) {
        eprintln!("no element matches: {description}");
        return Ok(exit_codes::NOT_FOUND);
    }
    println!("{locator}");
    Ok(exit_codes::OK)
}

fn api_key(cfg: &CompilerConfig) -> Result<String> {
    std::env::var(&cfg.api_key_env)
        .with_context(|| format!("missing API key: set {}", cfg.api_key_env))
}

fn read_instructions(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read instructions from stdin")?;
            Ok(buf)
        }
    }
}

fn read_base_prompt(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        None => Ok(DEFAULT_BASE_PROMPT.to_string()),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CompilerError>() {
        Some(CompilerError::Completion(_) | CompilerError::RetryExhausted { .. }) => {
            exit_codes::SERVICE
        }
        _ => exit_codes::INVALID,
    }
}
