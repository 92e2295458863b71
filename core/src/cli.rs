use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::interpreter::{self, compile_program, ir, Engine, Error, Program};

/// Exit code for I/O and configuration failures
pub const EXIT_ENVIRONMENT: i32 = 3;

#[derive(Parser)]
#[command(name = "vibelang")]
#[command(about = "VibeLang - run and inspect JSON-IR programs", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that a program is well formed and binds
    Validate {
        /// Program file (`.json` IR or `.vbl` surface syntax)
        file: PathBuf,
    },

    /// Run a program and print its result as JSON
    Run {
        file: PathBuf,

        /// JSON object of input values
        #[arg(short = 'i', long = "inputs")]
        inputs: Option<PathBuf>,

        /// Print the full execution report JSON instead of the result
        #[arg(long)]
        report: bool,
    },

    /// Run a program and print only its execution report
    Report {
        file: PathBuf,

        /// JSON object of input values
        #[arg(short = 'i', long = "inputs")]
        inputs: Option<PathBuf>,
    },

    /// Render a program as a Python-flavoured listing
    Compile {
        file: PathBuf,

        /// Write the listing here instead of stdout
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },

    /// Print the canonical JSON IR of a program
    Parse { file: PathBuf },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

/// Handle one command, writing its output to stdout
///
/// Output produced before a failure (a failed run's report) is still printed.
pub async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let mut out = Vec::new();
    let result = execute(cli, &mut out).await;
    std::io::stdout()
        .write_all(&out)
        .context("failed to write output")?;
    result
}

/// Exit status for a command failure: the engine's own code for program
/// errors, [`EXIT_ENVIRONMENT`] for everything else
pub fn exit_code(err: &anyhow::Error) -> i32 {
    engine_error(err).map_or(EXIT_ENVIRONMENT, Error::exit_code)
}

/// Render a failure chain, program errors as `Kind: message`
pub fn error_message(err: &anyhow::Error) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        match cause.downcast_ref::<Error>() {
            Some(error) => {
                parts.push(error.describe());
                break;
            }
            None => parts.push(cause.to_string()),
        }
    }
    parts.join(": ")
}

fn engine_error(err: &anyhow::Error) -> Option<&Error> {
    err.chain().find_map(|cause| cause.downcast_ref::<Error>())
}

async fn execute(cli: Cli, out: &mut Vec<u8>) -> Result<()> {
    // Apply CLI overrides to environment before loading settings
    if let Some(config_path) = &cli.config {
        std::env::set_var("VIBELANG_CONFIG_PATH", config_path);
    }

    // Eagerly load and validate configuration before executing any command
    let config = Config::load()?;
    let engine = Engine::from_config(&config);

    match cli.command {
        Commands::Validate { file } => {
            let program = load_program(&file)?;
            engine
                .bind(&program)
                .with_context(|| format!("failed to bind {}", file.display()))?;
            writeln!(out, "OK")?;
        }

        Commands::Run {
            file,
            inputs,
            report,
        } => {
            let program = load_program(&file)?;
            let inputs = load_inputs(inputs.as_deref())?;

            match engine.run(&program, inputs).await {
                Ok(outcome) if report => {
                    writeln!(out, "{}", serde_json::to_string_pretty(&outcome.report.to_json())?)?;
                }
                Ok(outcome) => {
                    writeln!(out, "{}", serde_json::to_string_pretty(&outcome.value.to_json())?)?;
                }
                Err(failure) => {
                    if report {
                        writeln!(out, "{}", serde_json::to_string_pretty(&failure.report.to_json())?)?;
                    }
                    return Err(anyhow::Error::new(failure.error))
                        .with_context(|| format!("run of {} failed", file.display()));
                }
            }
        }

        Commands::Report { file, inputs } => {
            let program = load_program(&file)?;
            let inputs = load_inputs(inputs.as_deref())?;

            let (report, error) = match engine.run(&program, inputs).await {
                Ok(outcome) => (outcome.report, None),
                Err(failure) => (failure.report, Some(failure.error)),
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&report.to_json())?)?;
            if let Some(error) = error {
                return Err(anyhow::Error::new(error))
                    .with_context(|| format!("run of {} failed", file.display()));
            }
        }

        Commands::Compile { file, out: target } => {
            let program = load_program(&file)?;
            let listing = compile_program(&program);
            match target {
                Some(path) => {
                    std::fs::write(&path, listing)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!(path = %path.display(), "listing written");
                }
                None => write!(out, "{}", listing)?,
            }
        }

        Commands::Parse { file } => {
            let program = load_program(&file)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&ir::encode(&program))?)?;
        }
    }

    Ok(())
}

fn load_program(path: &Path) -> Result<Program> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let program = interpreter::parse_source(path, &text)
        .with_context(|| format!("failed to load {}", path.display()))?;
    tracing::debug!(path = %path.display(), steps = program.steps.len(), "program loaded");
    Ok(program)
}

fn load_inputs(path: Option<&Path>) -> Result<IndexMap<String, JsonValue>> {
    let Some(path) = path else {
        return Ok(IndexMap::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: JsonValue = serde_json::from_str(&text)
        .with_context(|| format!("invalid inputs JSON in {}", path.display()))?;
    match value {
        JsonValue::Object(map) => Ok(map.into_iter().collect()),
        other => anyhow::bail!(
            "inputs in {} must be a JSON object, got {}",
            path.display(),
            json_type(&other)
        ),
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ECHO: &str = r#"
        (input message "hello")
        (step shout (params text) (guard "OFF") (return (text.upper)))
        (run (shout message))
    "#;

    fn workspace(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().expect("temp dir");
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).expect("write fixture");
        }
        dir
    }

    async fn invoke(dir: &TempDir, args: &[&str]) -> (String, Result<()>) {
        let mut argv = vec!["vibelang".to_string()];
        for arg in args {
            argv.push(match arg.strip_prefix('@') {
                Some(name) => dir.path().join(name).display().to_string(),
                None => arg.to_string(),
            });
        }
        let mut out = Vec::new();
        let result = execute(Cli::parse_from(argv), &mut out).await;
        (String::from_utf8(out).expect("utf-8 output"), result)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_prints_result() {
        let dir = workspace(&[("echo.vbl", ECHO), ("inputs.json", r#"{"message": "hey"}"#)]);

        let (out, result) = invoke(&dir, &["run", "@echo.vbl"]).await;
        result.expect("Should run");
        assert_eq!(out.trim(), "\"HELLO\"");

        let (out, result) = invoke(&dir, &["run", "@echo.vbl", "--inputs", "@inputs.json"]).await;
        result.expect("Should run");
        assert_eq!(out.trim(), "\"HEY\"");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_with_report_flag_prints_only_the_report() {
        let dir = workspace(&[("one.vbl", "(run 1)")]);
        let (out, result) = invoke(&dir, &["run", "@one.vbl", "--report"]).await;
        result.expect("Should run");

        let report: JsonValue = serde_json::from_str(&out).expect("stdout is one JSON report");
        assert_eq!(report["status"], "ok");
        assert_eq!(report["result"], 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_report_command_prints_report() {
        let dir = workspace(&[("echo.vbl", ECHO)]);
        let (out, result) = invoke(&dir, &["report", "@echo.vbl"]).await;
        result.expect("Should run");

        let report: JsonValue = serde_json::from_str(&out).expect("report JSON");
        assert_eq!(report["status"], "ok");
        assert_eq!(report["result"], "HELLO");
        assert_eq!(report["steps"][0]["name"], "shout");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_run_exit_code_and_report() {
        let dir = workspace(&[("echo.vbl", ECHO), ("inputs.json", r#"{"message": "100% off"}"#)]);
        let (out, result) = invoke(&dir, &["report", "@echo.vbl", "--inputs", "@inputs.json"]).await;

        let err = result.expect_err("Should fail");
        assert_eq!(exit_code(&err), 1);
        assert!(error_message(&err).contains("RetryExhausted: step 'shout' failed after 1 attempt(s)"));

        let report: JsonValue = serde_json::from_str(&out).expect("report JSON");
        assert_eq!(report["status"], "error");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_validate() {
        let dir = workspace(&[("echo.vbl", ECHO), ("unbound.vbl", "(run (missing 1))"), ("bad.vbl", "(run (")]);

        let (out, result) = invoke(&dir, &["validate", "@echo.vbl"]).await;
        result.expect("Should validate");
        assert_eq!(out.trim(), "OK");

        let (_, result) = invoke(&dir, &["validate", "@unbound.vbl"]).await;
        let err = result.expect_err("Should fail to bind");
        assert_eq!(exit_code(&err), 2);
        assert!(error_message(&err).contains("BindError"));

        let (_, result) = invoke(&dir, &["validate", "@bad.vbl"]).await;
        assert_eq!(exit_code(&result.expect_err("Should fail to parse")), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_parse_emits_canonical_ir() {
        let dir = workspace(&[("one.vbl", "(run 1)")]);
        let (out, result) = invoke(&dir, &["parse", "@one.vbl"]).await;
        result.expect("Should parse");

        let ir: JsonValue = serde_json::from_str(&out).expect("IR JSON");
        fs::write(dir.path().join("one.json"), &out).expect("write IR");
        let (again, result) = invoke(&dir, &["parse", "@one.json"]).await;
        result.expect("Should decode");
        assert_eq!(serde_json::from_str::<JsonValue>(&again).expect("IR JSON"), ir);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_compile_to_file() {
        let dir = workspace(&[("one.vbl", "(run 1)")]);
        let (out, result) = invoke(&dir, &["compile", "@one.vbl", "--out", "@one.py"]).await;
        result.expect("Should compile");

        assert!(out.is_empty());
        let listing = fs::read_to_string(dir.path().join("one.py")).expect("listing");
        assert!(listing.ends_with("__vbl_result__ = 1\n"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_environment_failures() {
        let dir = workspace(&[("echo.vbl", ECHO), ("inputs.json", "[1, 2]")]);

        let (_, result) = invoke(&dir, &["run", "@missing.vbl"]).await;
        assert_eq!(exit_code(&result.expect_err("Should fail")), EXIT_ENVIRONMENT);

        let (_, result) = invoke(&dir, &["run", "@echo.vbl", "--inputs", "@inputs.json"]).await;
        let err = result.expect_err("Should fail");
        assert_eq!(exit_code(&err), EXIT_ENVIRONMENT);
        assert!(error_message(&err).contains("must be a JSON object, got array"));
    }
}
