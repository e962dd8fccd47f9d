use std::fmt;
use std::io::ErrorKind;
use std::str::FromStr;

use tracing::info;

use super::acquirer::ScriptAcquirer;
use super::credentials::{ImdsTokenSource, TokenSource};
use super::runner::run_script;
use super::seqnum::check_and_save_seq_num;
use crate::config::{HandlerEnvironment, HandlerSettings};
use crate::types::{HandlerError, InvocationOutcome, Result};

/// The five verbs a guest agent invokes an extension with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOperation {
    Install,
    Enable,
    Disable,
    Uninstall,
    Update,
}

impl LifecycleOperation {
    pub const ALL: [Self; 5] = [
        Self::Install,
        Self::Enable,
        Self::Disable,
        Self::Uninstall,
        Self::Update,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Uninstall => "uninstall",
            Self::Update => "update",
        }
    }

    /// Whether the agent expects a `<seq>.status` file for this verb
    pub fn should_report_status(self) -> bool {
        match self {
            Self::Install | Self::Uninstall => false,
            Self::Enable | Self::Disable | Self::Update => true,
        }
    }
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LifecycleOperation {
    type Err = HandlerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| HandlerError::InvalidSettings(format!("unknown operation '{s}'")))
    }
}

/// Binds the pipeline to one extension instance
pub struct Handler<T = ImdsTokenSource> {
    env: HandlerEnvironment,
    acquirer: ScriptAcquirer<T>,
}

impl<T: TokenSource> Handler<T> {
    pub fn new(env: HandlerEnvironment, acquirer: ScriptAcquirer<T>) -> Self {
        Self { env, acquirer }
    }

    pub fn environment(&self) -> &HandlerEnvironment {
        &self.env
    }

    /// Run one lifecycle operation; never writes status or exits the process
    pub async fn invoke(
        &self,
        op: LifecycleOperation,
        seq_no: u64,
        settings: &HandlerSettings,
    ) -> Result<InvocationOutcome> {
        info!(operation = %op, seq_no, "handling operation");
        match op {
            LifecycleOperation::Install => {
                self.ensure_data_dir()?;
                Ok(InvocationOutcome::Completed(None))
            }
            LifecycleOperation::Enable => self.enable(seq_no, settings).await,
            LifecycleOperation::Disable | LifecycleOperation::Update => {
                info!(operation = %op, "nothing to do");
                Ok(InvocationOutcome::Completed(None))
            }
            LifecycleOperation::Uninstall => {
                self.remove_data_dir()?;
                Ok(InvocationOutcome::Completed(None))
            }
        }
    }

    async fn enable(&self, seq_no: u64, settings: &HandlerSettings) -> Result<InvocationOutcome> {
        self.ensure_data_dir()?;
        if check_and_save_seq_num(seq_no, &self.env.mrseq_path())? {
            return Ok(InvocationOutcome::Skipped { seq_no });
        }

        let work_dir = self.env.work_dir(seq_no);
        let script = self.acquirer.resolve(settings, &work_dir).await?;
        let result = run_script(&script, &work_dir)?;
        Ok(InvocationOutcome::Completed(Some(result)))
    }

    fn ensure_data_dir(&self) -> Result<()> {
        let dir = &self.env.data_dir;
        std::fs::create_dir_all(dir).map_err(|e| HandlerError::filesystem(dir, e))
    }

    fn remove_data_dir(&self) -> Result<()> {
        let dir = &self.env.data_dir;
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {
                info!(path = %dir.display(), "removed extension data");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HandlerError::filesystem(dir, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagedIdentity;
    use reqwest::Client;
    use tempfile::tempdir;

    struct NoToken;

    impl TokenSource for NoToken {
        async fn bearer_token(&self, _identity: &ManagedIdentity) -> Result<String> {
            Err(HandlerError::InvalidSettings("no identity in tests".into()))
        }
    }

    fn handler(root: &std::path::Path) -> Handler<NoToken> {
        let env = HandlerEnvironment::new(root.join("data"), root.join("status"));
        Handler::new(env, ScriptAcquirer::with_token_source(Client::new(), NoToken))
    }

    #[test]
    fn all_commands_are_handled() {
        for verb in ["install", "enable", "disable", "uninstall", "update"] {
            let op: LifecycleOperation = verb.parse().expect("known verb");
            assert_eq!(op.to_string(), verb);
        }
        assert!("restart".parse::<LifecycleOperation>().is_err());
    }

    #[test]
    fn status_reporting_flags() {
        assert!(!LifecycleOperation::Install.should_report_status());
        assert!(!LifecycleOperation::Uninstall.should_report_status());
        assert!(LifecycleOperation::Enable.should_report_status());
        assert!(LifecycleOperation::Disable.should_report_status());
        assert!(LifecycleOperation::Update.should_report_status());
    }

    #[tokio::test]
    async fn enable_runs_inline_script_once_per_sequence_number() {
        let root = tempdir().expect("tempdir");
        let handler = handler(root.path());
        let settings = HandlerSettings::inline("date");

        let outcome = handler
            .invoke(LifecycleOperation::Enable, 0, &settings)
            .await
            .expect("enable");
        let InvocationOutcome::Completed(Some(result)) = outcome else {
            panic!("expected an execution result, got {outcome:?}");
        };
        assert_eq!(result.exit_code, 0);

        let work_dir = handler.environment().work_dir(0);
        assert!(work_dir.join("stdout").exists());
        assert!(work_dir.join("stderr").exists());
        assert_eq!(std::fs::read_to_string(work_dir.join("script.sh")).unwrap(), "date");

        let repeat = handler
            .invoke(LifecycleOperation::Enable, 0, &settings)
            .await
            .expect("repeat enable");
        assert_eq!(repeat, InvocationOutcome::Skipped { seq_no: 0 });
    }

    #[tokio::test]
    async fn enable_reports_failed_command() {
        let root = tempdir().expect("tempdir");
        let handler = handler(root.path());

        let err = handler
            .invoke(LifecycleOperation::Enable, 1, &HandlerSettings::inline("non-existing-cmd"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to execute command"));

        let work_dir = handler.environment().work_dir(1);
        assert!(work_dir.join("stdout").exists());
        assert!(work_dir.join("stderr").exists());
    }

    #[tokio::test]
    async fn enable_rejects_settings_without_source() {
        let root = tempdir().expect("tempdir");
        let err = handler(root.path())
            .invoke(LifecycleOperation::Enable, 2, &HandlerSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidSettings(_)));
    }

    #[tokio::test]
    async fn install_and_uninstall_manage_data_dir() {
        let root = tempdir().expect("tempdir");
        let handler = handler(root.path());
        let settings = HandlerSettings::default();

        handler
            .invoke(LifecycleOperation::Install, 0, &settings)
            .await
            .expect("install");
        assert!(handler.environment().data_dir.is_dir());

        handler
            .invoke(LifecycleOperation::Uninstall, 0, &settings)
            .await
            .expect("uninstall");
        assert!(!handler.environment().data_dir.exists());

        // uninstalling twice is fine
        handler
            .invoke(LifecycleOperation::Uninstall, 0, &settings)
            .await
            .expect("second uninstall");
    }

    #[tokio::test]
    async fn disable_and_update_do_not_touch_sequence_state() {
        let root = tempdir().expect("tempdir");
        let handler = handler(root.path());
        let settings = HandlerSettings::default();

        for op in [LifecycleOperation::Disable, LifecycleOperation::Update] {
            let outcome = handler.invoke(op, 5, &settings).await.expect("no-op");
            assert_eq!(outcome, InvocationOutcome::Completed(None));
        }
        assert!(!handler.environment().mrseq_path().exists());
    }
}
