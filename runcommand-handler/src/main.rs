use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use reqwest::Client;
use runcommand_core::config::{HandlerEnvironment, HandlerSettings, IDENTITY_ENDPOINT};
use runcommand_core::extensions::{
    Handler, ImdsTokenSource, LifecycleOperation, ScriptAcquirer, StatusReport,
};
use runcommand_core::{HandlerError, InvocationOutcome};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Verb {
    Install,
    Enable,
    Disable,
    Uninstall,
    Update,
}

impl From<Verb> for LifecycleOperation {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Install => Self::Install,
            Verb::Enable => Self::Enable,
            Verb::Disable => Self::Disable,
            Verb::Uninstall => Self::Uninstall,
            Verb::Update => Self::Update,
        }
    }
}

/// Run-command extension handler invoked by the guest agent
#[derive(Debug, Parser)]
#[command(name = "runcommand-handler", version)]
struct Cli {
    /// Lifecycle operation to perform
    #[arg(value_enum)]
    verb: Verb,

    /// Handler configuration file (runtimeSettings JSON)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Sequence number of this invocation
    #[arg(long, env = "ConfigSequenceNumber", default_value_t = 0)]
    seq_no: u64,

    /// Extension instance name, used for the default data directory
    #[arg(long, default_value = "RunCommandLinux")]
    extension_name: String,

    /// Directory holding the sequence state and script work dirs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory receiving `<seq>.status` files
    #[arg(long)]
    status_dir: Option<PathBuf>,

    /// Managed identity token endpoint
    #[arg(long, env = "IDENTITY_ENDPOINT", default_value = IDENTITY_ENDPOINT)]
    identity_endpoint: String,
}

impl Cli {
    fn environment(&self) -> HandlerEnvironment {
        let defaults = HandlerEnvironment::for_extension(&self.extension_name);
        let data_dir = self.data_dir.clone().unwrap_or(defaults.data_dir);
        let status_dir = self
            .status_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("status"));
        HandlerEnvironment::new(data_dir, status_dir)
    }

    fn load_settings(&self) -> anyhow::Result<HandlerSettings> {
        let Some(path) = &self.settings else {
            return Ok(HandlerSettings::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        HandlerSettings::from_config_json(&json)
            .with_context(|| format!("parsing settings from {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let op = LifecycleOperation::from(cli.verb);
    let env = cli.environment();
    let client = Client::new();
    let tokens = ImdsTokenSource::with_endpoint(client.clone(), &cli.identity_endpoint);
    let handler = Handler::new(env.clone(), ScriptAcquirer::with_token_source(client, tokens));

    let outcome = match cli.load_settings() {
        Ok(settings) => handler.invoke(op, cli.seq_no, &settings).await,
        Err(e) if op.should_report_status() => {
            let message = format!("{e:#}");
            report(op, cli.seq_no, &env, &Err(HandlerError::InvalidSettings(message)))?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    if let Ok(InvocationOutcome::Skipped { seq_no }) = &outcome {
        info!(seq_no, "invocation already processed, exiting");
        return Ok(());
    }

    if op.should_report_status() {
        report(op, cli.seq_no, &env, &outcome)?;
    }

    outcome.map(|_| ()).with_context(|| format!("{op} failed"))
}

fn report(
    op: LifecycleOperation,
    seq_no: u64,
    env: &HandlerEnvironment,
    outcome: &runcommand_core::Result<InvocationOutcome>,
) -> anyhow::Result<()> {
    let work_dir = env.work_dir(seq_no);
    let capture_dir = (op == LifecycleOperation::Enable).then_some(work_dir.as_path());
    let path = StatusReport::from_outcome(op, outcome, capture_dir)
        .write_to(&env.status_dir, seq_no)
        .context("writing status file")?;
    info!(path = %path.display(), "status written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbs_map_to_operations() {
        let cli = Cli::try_parse_from(["runcommand-handler", "uninstall", "--seq-no", "4"]).unwrap();
        assert_eq!(LifecycleOperation::from(cli.verb), LifecycleOperation::Uninstall);
        assert_eq!(cli.seq_no, 4);
        assert!(Cli::try_parse_from(["runcommand-handler", "restart"]).is_err());
    }

    #[test]
    fn negative_sequence_number_is_rejected() {
        assert!(Cli::try_parse_from(["runcommand-handler", "enable", "--seq-no=-1"]).is_err());
        assert!(Cli::try_parse_from(["runcommand-handler", "enable", "--seq-no", "abc"]).is_err());
    }

    #[test]
    fn status_dir_defaults_under_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = dir.path().join("data");
        let cli = Cli::try_parse_from([
            "runcommand-handler",
            "enable",
            "--data-dir",
            data.to_str().unwrap(),
        ])
        .unwrap();

        let env = cli.environment();
        assert_eq!(env.data_dir, data);
        assert_eq!(env.status_dir, data.join("status"));
    }

    #[tokio::test]
    async fn enable_writes_status_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = dir.path().join("0.settings");
        std::fs::write(
            &settings,
            r#"{"runtimeSettings":[{"handlerSettings":{"publicSettings":{"source":{"script":"echo hi"}}}}]}"#,
        )
        .unwrap();
        let data = dir.path().join("data");
        let cli = Cli::try_parse_from([
            "runcommand-handler",
            "enable",
            "--seq-no",
            "0",
            "--settings",
            settings.to_str().unwrap(),
            "--data-dir",
            data.to_str().unwrap(),
        ])
        .unwrap();

        run(&cli).await.expect("enable");

        let status = std::fs::read_to_string(data.join("status").join("0.status")).unwrap();
        assert!(status.contains("\"status\": \"success\""), "{status}");
        assert!(status.contains("hi"), "{status}");
    }
}
