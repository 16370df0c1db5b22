//! Supervised launching of external tools.
//!
//! Every invocation runs through the platform shell and gets two reader
//! tasks, one per output stream. Each reader forwards lines to the runner's
//! [`OutputSink`] and/or a per-invocation callback. In blocking mode
//! ([`ProcessRunner::run`]) both readers are joined after the child exits,
//! so no trailing output is lost before the exit code is reported.
//!
//! ```ignore
//! use build_launch::process::{Invocation, LogSink, ProcessRunner};
//!
//! let runner = ProcessRunner::new(Arc::new(LogSink));
//! let code = runner.run(Invocation::new("python3", "-m pip list")).await?;
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Exit code reported when the child was terminated without one (e.g. by a signal).
pub const NO_EXIT_CODE: i32 = -1;

/// How long a reader waits for more output once the child has exited.
///
/// Output the child wrote before exiting is already in the pipe; anything
/// slower comes from a descendant that inherited the stream.
pub const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Which of the child's output streams a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Receives forwarded output lines from supervised processes.
///
/// Implement this to route tool output somewhere other than the `log` crate.
pub trait OutputSink: Send + Sync {
    fn on_line(&self, stream: OutputStream, line: &str);
}

/// Log-only sink: stdout at info level, stderr at error level.
pub struct LogSink;

impl OutputSink for LogSink {
    fn on_line(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => log::info!("{line}"),
            OutputStream::Stderr => log::error!("{line}"),
        }
    }
}

/// Per-invocation line callback. Called for every non-blank line, whether or
/// not the line is also forwarded to the sink.
pub type LineCallback = Arc<dyn Fn(OutputStream, &str) + Send + Sync>;

/// Errors raised while supervising a process.
///
/// A non-zero exit code is not an error at this layer.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to launch {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Output reader task failed: {0}")]
    Reader(#[from] tokio::task::JoinError),
}

/// One external tool launch.
pub struct Invocation {
    executable: OsString,
    args: String,
    forward_output: bool,
    on_line: Option<LineCallback>,
    current_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl Invocation {
    /// `args` is passed verbatim to the shell after the executable.
    pub fn new(executable: impl Into<OsString>, args: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: args.into(),
            forward_output: true,
            on_line: None,
            current_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// Whether lines are forwarded to the runner's sink (default: true).
    pub fn forward_output(mut self, forward: bool) -> Self {
        self.forward_output = forward;
        self
    }

    pub fn on_line(mut self, callback: LineCallback) -> Self {
        self.on_line = Some(callback);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The full command line handed to the shell.
    pub fn command_line(&self) -> String {
        let executable = quote_arg(&self.executable.to_string_lossy());
        if self.args.trim().is_empty() {
            executable
        } else {
            format!("{} {}", executable, self.args.trim())
        }
    }
}

/// Launches and supervises external processes.
///
/// The runner owns the sink and a set of extra environment variables that
/// are layered on top of the inherited environment for every child. The
/// parent's environment is never modified.
#[derive(Clone)]
pub struct ProcessRunner {
    sink: Arc<dyn OutputSink>,
    env: BTreeMap<String, String>,
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

impl ProcessRunner {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            sink,
            env: BTreeMap::new(),
        }
    }

    /// Add an environment variable applied to every invocation.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Run to completion and return the exit code.
    ///
    /// Returns only after the child has exited and both readers have drained
    /// their streams.
    pub async fn run(&self, invocation: Invocation) -> Result<i32, LaunchError> {
        self.spawn(invocation)?.wait().await
    }

    /// Start the process and return immediately.
    ///
    /// The readers keep forwarding output until the child's streams close or
    /// [`InvocationHandle::close`] is called.
    pub fn spawn(&self, invocation: Invocation) -> Result<InvocationHandle, LaunchError> {
        let command_line = invocation.command_line();
        debug!("[process] Launching: {}", command_line);

        let mut cmd = shell_command(&command_line);
        cmd.envs(&self.env)
            .envs(&invocation.env)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            executable: invocation.executable.to_string_lossy().to_string(),
            source,
        })?;

        let (signal_tx, signal_rx) = watch::channel(ReaderSignal::default());
        let sink = invocation.forward_output.then(|| self.sink.clone());
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(
                stdout,
                OutputStream::Stdout,
                sink.clone(),
                invocation.on_line.clone(),
                signal_rx.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(
                stderr,
                OutputStream::Stderr,
                sink,
                invocation.on_line,
                signal_rx,
            ));
        }

        Ok(InvocationHandle {
            child,
            readers,
            signals: signal_tx,
        })
    }
}

/// State broadcast from an [`InvocationHandle`] to its readers.
#[derive(Debug, Clone, Copy, Default)]
struct ReaderSignal {
    /// Stop forwarding; keep draining.
    closed: bool,
    /// The child has been reaped; stop once the stream goes idle.
    child_exited: bool,
}

/// A running invocation.
///
/// Dropping the handle neither kills the child nor stops the readers; they
/// run until the child's output streams close.
pub struct InvocationHandle {
    child: Child,
    readers: Vec<JoinHandle<()>>,
    signals: watch::Sender<ReaderSignal>,
}

impl InvocationHandle {
    /// OS process id, if the child has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stop forwarding output. The child keeps running and its output is
    /// drained and discarded.
    pub fn close(&self) {
        self.signals.send_modify(|signal| signal.closed = true);
    }

    /// Exit code if the child has already exited.
    pub fn try_wait(&mut self) -> Result<Option<i32>, LaunchError> {
        Ok(self
            .child
            .try_wait()
            .map_err(LaunchError::Wait)?
            .map(exit_code))
    }

    /// Wait for the child to exit, then for both readers to finish.
    ///
    /// Readers stop at end of stream, or once no further line arrives
    /// within [`EXIT_DRAIN_GRACE`] after the exit. A background descendant
    /// holding the pipes open does not keep this waiting.
    pub async fn wait(mut self) -> Result<i32, LaunchError> {
        let status = self.child.wait().await.map_err(LaunchError::Wait)?;
        self.signals.send_modify(|signal| signal.child_exited = true);
        for reader in self.readers.drain(..) {
            reader.await?;
        }
        let code = exit_code(status);
        debug!("[process] Exited with code {}", code);
        Ok(code)
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(NO_EXIT_CODE)
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    // Passed raw: the default argument escaping turns `"` into `\"`, which
    // cmd does not understand.
    cmd.raw_arg(cmd_arguments(command_line));
    cmd
}

/// Arguments for `cmd`. With `/S`, cmd strips exactly the outer pair of
/// quotes and keeps every quote inside the command line.
#[cfg_attr(not(windows), allow(dead_code))]
fn cmd_arguments(command_line: &str) -> String {
    format!("/S /C \"{}\"", command_line)
}

#[cfg(not(windows))]
fn shell_command(command_line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line);
    cmd
}

/// Characters the shells treat as redirection or command separators.
const SHELL_SPECIAL: &[char] = &['<', '>', '|', '&', ';', '(', ')', '^'];

/// Double-quote an argument containing whitespace or shell operators (such
/// as the `>` in `demo>=1.0`). Both `sh` and `cmd` accept this form.
pub fn quote_arg(arg: &str) -> String {
    let needs_quotes = arg.chars().any(char::is_whitespace) || arg.contains(SHELL_SPECIAL);
    if needs_quotes && !arg.starts_with('"') {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

fn spawn_reader<R>(
    reader: R,
    stream: OutputStream,
    sink: Option<Arc<dyn OutputSink>>,
    on_line: Option<LineCallback>,
    mut signals: watch::Receiver<ReaderSignal>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut signal = ReaderSignal::default();
        // Set when the handle is gone; no signal can arrive any more.
        let mut detached = false;

        let emit = |signal: &ReaderSignal, buf: &[u8]| {
            let line = decode_line(buf);
            // Once closed, keep draining so the child never blocks on a full pipe.
            if signal.closed || line.is_empty() {
                return;
            }
            if let Some(sink) = &sink {
                sink.on_line(stream, &line);
            }
            if let Some(callback) = &on_line {
                callback(stream, &line);
            }
        };

        loop {
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read,
                changed = signals.changed(), if !detached => {
                    match changed {
                        Ok(()) => signal = *signals.borrow_and_update(),
                        Err(_) => detached = true,
                    }
                    continue;
                }
                _ = tokio::time::sleep(EXIT_DRAIN_GRACE), if signal.child_exited => {
                    debug!("[process] {} still open after exit, detaching", stream);
                    if !buf.is_empty() {
                        emit(&signal, &buf);
                    }
                    break;
                }
            };

            match read {
                Ok(0) => break,
                Ok(_) => {
                    emit(&signal, &buf);
                    buf.clear();
                }
                Err(e) => {
                    warn!("[process] Failed reading {}: {}", stream, e);
                    break;
                }
            }
        }
    })
}

fn decode_line(buf: &[u8]) -> String {
    let line = String::from_utf8_lossy(buf);
    line.trim_end_matches(['\n', '\r']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        lines: Mutex<Vec<(OutputStream, String)>>,
    }

    impl OutputSink for CollectingSink {
        fn on_line(&self, stream: OutputStream, line: &str) {
            self.lines.lock().unwrap().push((stream, line.to_string()));
        }
    }

    fn collector() -> (LineCallback, Arc<Mutex<Vec<(OutputStream, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: LineCallback = Arc::new(move |stream, line| {
            sink.lock().unwrap().push((stream, line.to_string()));
        });
        (callback, seen)
    }

    fn lines_of(seen: &[(OutputStream, String)], stream: OutputStream) -> Vec<String> {
        seen.iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, l)| l.clone())
            .collect()
    }

    #[test]
    fn test_decode_line_trims_newlines() {
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{fffd} byte");
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("/usr/bin/python3"), "/usr/bin/python3");
        assert_eq!(quote_arg("/my env/bin/python"), "\"/my env/bin/python\"");
        assert_eq!(quote_arg("\"already quoted\""), "\"already quoted\"");
        assert_eq!(quote_arg("demo>=1.0"), "\"demo>=1.0\"");
        assert_eq!(quote_arg("demo==1.0"), "demo==1.0");
    }

    #[test]
    fn test_cmd_arguments_keep_inner_quotes() {
        let line = r#""C:\Program Files\Python312\python.exe" -m pip install "demo>=1.0""#;
        assert_eq!(cmd_arguments(line), format!("/S /C \"{}\"", line));
        assert!(cmd_arguments(line).starts_with(r#"/S /C ""C:\Program Files"#));
    }

    #[test]
    fn test_command_line() {
        assert_eq!(Invocation::new("git", "clone x y").command_line(), "git clone x y");
        assert_eq!(Invocation::new("git", "  ").command_line(), "git");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_blocking_run_observes_every_line_in_order() {
        let (callback, seen) = collector();
        let runner = ProcessRunner::new(Arc::new(CollectingSink::default()));
        let invocation = Invocation::new(
            "sh",
            "-c 'echo out1; echo err1 >&2; echo out2; echo err2 >&2; echo out3'",
        )
        .on_line(callback);

        let code = runner.run(invocation).await.unwrap();
        assert_eq!(code, 0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(
            lines_of(&seen, OutputStream::Stdout),
            vec!["out1", "out2", "out3"]
        );
        assert_eq!(lines_of(&seen, OutputStream::Stderr), vec!["err1", "err2"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_code_is_returned() {
        let runner = ProcessRunner::default();
        let code = runner.run(Invocation::new("sh", "-c 'exit 3'")).await.unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_forwarding_toggle() {
        let sink = Arc::new(CollectingSink::default());
        let runner = ProcessRunner::new(sink.clone());

        runner
            .run(Invocation::new("echo", "forwarded"))
            .await
            .unwrap();
        let (callback, seen) = collector();
        runner
            .run(
                Invocation::new("echo", "silent")
                    .forward_output(false)
                    .on_line(callback),
            )
            .await
            .unwrap();

        let forwarded = sink.lines.lock().unwrap();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0], (OutputStream::Stdout, "forwarded".to_string()));
        // The callback still sees lines that were not forwarded.
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_environment_is_layered_per_invocation() {
        let (callback, seen) = collector();
        let runner = ProcessRunner::default().with_env("PYBUILD_RUNNER_VAR", "runner");
        let invocation = Invocation::new(
            "sh",
            "-c 'echo $PYBUILD_RUNNER_VAR $PYBUILD_CALL_VAR $PYTHONUNBUFFERED'",
        )
        .env("PYBUILD_CALL_VAR", "call")
        .on_line(callback);

        runner.run(invocation).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1, "runner call 1");
        assert!(std::env::var("PYBUILD_CALL_VAR").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let (callback, seen) = collector();
        let runner = ProcessRunner::default();
        runner
            .run(Invocation::new("printf", "'a\\n\\nb\\n'").on_line(callback))
            .await
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(lines_of(&seen, OutputStream::Stdout), vec!["a", "b"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonblocking_handle_waits_for_exit() {
        let (callback, seen) = collector();
        let runner = ProcessRunner::default();
        let handle = runner
            .spawn(Invocation::new("sh", "-c 'sleep 0.2; echo done'").on_line(callback))
            .unwrap();
        assert!(handle.id().is_some());

        let code = handle.wait().await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(seen.lock().unwrap()[0].1, "done");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_stops_forwarding_but_not_the_child() {
        let (callback, seen) = collector();
        let runner = ProcessRunner::default();
        let handle = runner
            .spawn(Invocation::new("sh", "-c 'sleep 0.3; echo late'").on_line(callback))
            .unwrap();
        handle.close();

        let code = handle.wait().await.unwrap();
        assert_eq!(code, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::default();
        runner
            .run(Invocation::new("touch", "marker").current_dir(dir.path()))
            .await
            .unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_descendant_does_not_block_run() {
        let (callback, seen) = collector();
        let runner = ProcessRunner::default();
        let started = std::time::Instant::now();

        let code = runner
            .run(Invocation::new("sh", "-c 'sleep 5 & echo hi; printf tail'").on_line(callback))
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert!(started.elapsed() < Duration::from_secs(3));
        let seen = seen.lock().unwrap();
        assert_eq!(lines_of(&seen, OutputStream::Stdout), vec!["hi", "tail"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_try_wait_reports_exit_of_nonblocking_handle() {
        let runner = ProcessRunner::default();
        let mut handle = runner
            .spawn(Invocation::new("sh", "-c 'sleep 0.3; exit 4'"))
            .unwrap();
        assert_eq!(handle.try_wait().unwrap(), None);

        let mut code = None;
        for _ in 0..100 {
            code = handle.try_wait().unwrap();
            if code.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(code, Some(4));
        assert_eq!(handle.wait().await.unwrap(), 4);
    }
}
