//! packr subprocess invocation
//!
//! Runs the packaging tool against the generated descriptor and forwards its
//! output into the log while it runs. Both pipes are drained by their own
//! tasks so a chatty tool can never block on a full pipe.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{Level, debug, info, log, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{InstallError, Result};

/// Default upper bound on a packr run
pub const DEFAULT_PACKAGER_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How long the output drains may run on once packr has exited or been killed
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Program and leading arguments; the descriptor file name is appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for PackagerCommand {
    fn default() -> Self {
        Self::new("java", ["-jar", super::manifest::PACKAGER_ARTIFACT])
    }
}

impl PackagerCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a full argv into program and arguments
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }

    fn resolve_program(&self) -> PathBuf {
        which::which(&self.program).unwrap_or_else(|_| PathBuf::from(&self.program))
    }
}

/// Bounds on a single packr run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackagerLimits {
    /// `None` waits for as long as the tool runs
    pub timeout: Option<Duration>,
}

impl Default for PackagerLimits {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_PACKAGER_TIMEOUT),
        }
    }
}

impl PackagerLimits {
    pub fn unbounded() -> Self {
        Self { timeout: None }
    }
}

/// Run the packaging tool in `working_dir` and wait for it to exit
///
/// The exit status is returned as-is; deciding whether it is a failure is up
/// to the caller. On unix packr runs in its own process group; on timeout or
/// cancellation the whole group is killed before the error is returned. The
/// output drains get [`DRAIN_GRACE`] to finish and are aborted after that, so
/// a leftover process holding the pipes cannot stall the caller.
pub async fn invoke(
    command: &PackagerCommand,
    descriptor: &Path,
    working_dir: &Path,
    limits: PackagerLimits,
    cancel: &CancellationToken,
) -> Result<ExitStatus> {
    let program = command.resolve_program();
    let descriptor_arg = descriptor
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| descriptor.to_path_buf());

    debug!(
        "Running {} {:?} {}",
        program.display(),
        command.args,
        descriptor_arg.display()
    );

    let mut cmd = Command::new(&program);
    cmd.args(&command.args)
        .arg(&descriptor_arg)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|source| InstallError::PackagerSpawn {
            program: command.program.clone(),
            source,
        })?;

    let pid = child.id();
    let pid_str = pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!("Packager started (PID: {pid_str})");

    // take the pipes before waiting, wait() only needs &mut child
    let drains: Vec<JoinHandle<()>> = [
        child.stdout.take().map(|out| tokio::spawn(drain(out, Level::Info))),
        child.stderr.take().map(|err| tokio::spawn(drain(err, Level::Warn))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let deadline = async {
        match limits.timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    let outcome = tokio::select! {
        status = child.wait() => status.map_err(|e| InstallError::io(&program, e)),
        _ = cancel.cancelled() => Err(InstallError::Cancelled { stage: "packaging" }),
        _ = deadline => Err(InstallError::PackagerTimeout {
            duration: limits.timeout.unwrap_or_default(),
        }),
    };

    if let Err(e) = &outcome {
        warn!("Stopping packager: {e}");
        if let Some(pid) = pid {
            kill_group(pid);
        }
        if let Err(kill_err) = child.kill().await {
            warn!("Failed to kill packager (PID: {pid_str}): {kill_err}");
        }
    }

    for mut handle in drains {
        match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
            Ok(joined) => joined?,
            Err(_) => {
                handle.abort();
                warn!("packr output still open {DRAIN_GRACE:?} after exit (PID: {pid_str}), detaching");
            }
        }
    }

    let status = outcome?;
    info!("Packager exited with {status}");
    Ok(status)
}

/// SIGKILL every process in the group led by `pid`
#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = signal::killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        warn!("Failed to kill packager process group {pid}: {e}");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

/// Forward every line of `stream` to the log until EOF
async fn drain<R: AsyncRead + Unpin>(stream: R, level: Level) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                log!(level, "[packr] {}", text.trim_end());
            }
            Err(e) => {
                warn!("Failed to read packager output: {e}");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn shell(script: &str) -> PackagerCommand {
        // the appended descriptor name becomes $0
        PackagerCommand::new("sh", ["-c", script])
    }

    async fn run(command: &PackagerCommand, limits: PackagerLimits) -> Result<ExitStatus> {
        let tmp = tempfile::tempdir().unwrap();
        invoke(
            command,
            &tmp.path().join("options.json"),
            tmp.path(),
            limits,
            &CancellationToken::new(),
        )
        .await
    }

    #[test]
    fn test_default_command() {
        let command = PackagerCommand::default();
        assert_eq!(command.program, "java");
        assert_eq!(command.args, vec!["-jar", "packr.jar"]);
    }

    #[test]
    fn test_from_argv() {
        let argv = vec!["sh".to_string(), "-c".to_string(), "true".to_string()];
        assert_eq!(PackagerCommand::from_argv(&argv), Some(shell("true")));
        assert_eq!(PackagerCommand::from_argv(&[]), None);
    }

    #[tokio::test]
    async fn test_exit_code_is_surfaced() {
        let status = run(&shell("exit 3"), PackagerLimits::default()).await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_descriptor_name_and_working_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let command = shell(r#"test "$0" = options.json && touch ran-here"#);

        let status = invoke(
            &command,
            &tmp.path().join("options.json"),
            tmp.path(),
            PackagerLimits::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(status.success());
        assert!(tmp.path().join("ran-here").exists());
    }

    #[tokio::test]
    async fn test_large_output_does_not_stall() {
        let script = "yes packr-line | head -n 200000; yes packr-err | head -n 200000 >&2; \
                      printf '\\377\\376 not utf8\\n'";
        let limits = PackagerLimits {
            timeout: Some(Duration::from_secs(60)),
        };

        let status = run(&shell(script), limits).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let limits = PackagerLimits {
            timeout: Some(Duration::from_millis(200)),
        };
        let started = Instant::now();

        let err = run(&shell("exec sleep 30"), limits).await.unwrap_err();
        assert!(matches!(err, InstallError::PackagerTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancellation_kills_child() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = invoke(
            &shell("exec sleep 30"),
            &tmp.path().join("options.json"),
            tmp.path(),
            PackagerLimits::unbounded(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, InstallError::Cancelled { stage: "packaging" }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    // sh forks sleep instead of exec'ing it, so the grandchild holds the pipes
    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let limits = PackagerLimits {
            timeout: Some(Duration::from_millis(200)),
        };
        let started = Instant::now();

        let err = run(&shell("sleep 8; echo done"), limits).await.unwrap_err();
        assert!(matches!(err, InstallError::PackagerTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_cancellation_kills_grandchildren() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = invoke(
            &shell("sleep 8; echo done"),
            &tmp.path().join("options.json"),
            tmp.path(),
            PackagerLimits::unbounded(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, InstallError::Cancelled { stage: "packaging" }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_background_process_does_not_hold_exit() {
        let started = Instant::now();

        let status = run(&shell("sleep 20 & exit 0"), PackagerLimits::unbounded())
            .await
            .unwrap();
        assert!(status.success());
        assert!(started.elapsed() < DRAIN_GRACE + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let command = PackagerCommand::new("dchess-no-such-packager", Vec::<String>::new());
        let err = run(&command, PackagerLimits::default()).await.unwrap_err();
        assert!(matches!(err, InstallError::PackagerSpawn { .. }));
    }
}
