//! Copy and remove tests against a recording in-memory transport.
//!
//! The mock session records every command, every byte written to its
//! standard input and every close, so the tests can check exactly what
//! went over the wire.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use remote_runner::config::RunnerSection;
use remote_runner::session::{PipeReader, PipeWriter};
use remote_runner::transfer::ContentReader;
use remote_runner::{
    CapturedOutput, CopyableFile, MemoryAsset, RemoteSession, Runner, RunnerError, SessionFactory,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the transport saw.
#[derive(Debug, Default)]
struct Record {
    opens: usize,
    commands: Vec<String>,
    stdin: Vec<u8>,
    closes: usize,
}

/// How each mock session behaves.
#[derive(Debug, Clone)]
struct Behavior {
    /// Read standard input to end-of-stream before exiting.
    read_stdin: bool,
    exit_code: i32,
    stderr: String,
    fail_open: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            read_stdin: true,
            exit_code: 0,
            stderr: String::new(),
            fail_open: false,
        }
    }
}

#[derive(Clone, Default)]
struct MockFactory {
    record: Arc<Mutex<Record>>,
    behavior: Behavior,
}

impl MockFactory {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            record: Arc::default(),
            behavior,
        }
    }

    fn record(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap()
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn open(&self) -> io::Result<Box<dyn RemoteSession>> {
        if self.behavior.fail_open {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "transport down",
            ));
        }
        self.record().opens += 1;
        Ok(Box::new(MockSession {
            record: Arc::clone(&self.record),
            behavior: self.behavior.clone(),
            stdin: None,
            stdout: None,
            stderr: None,
        }))
    }
}

struct MockSession {
    record: Arc<Mutex<Record>>,
    behavior: Behavior,
    stdin: Option<DuplexStream>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
}

fn pipe(slot: &mut Option<DuplexStream>) -> DuplexStream {
    let (caller, session) = tokio::io::duplex(256);
    *slot = Some(session);
    caller
}

#[async_trait]
impl RemoteSession for MockSession {
    fn stdin(&mut self) -> io::Result<PipeWriter> {
        Ok(Box::new(pipe(&mut self.stdin)))
    }

    fn stdout(&mut self) -> io::Result<PipeReader> {
        Ok(Box::new(pipe(&mut self.stdout)))
    }

    fn stderr(&mut self) -> io::Result<PipeReader> {
        Ok(Box::new(pipe(&mut self.stderr)))
    }

    async fn run(&mut self, command: &str) -> remote_runner::Result<()> {
        self.record.lock().unwrap().commands.push(command.to_string());

        if let Some(mut stdin) = self.stdin.take() {
            if self.behavior.read_stdin {
                let mut received = Vec::new();
                stdin
                    .read_to_end(&mut received)
                    .await
                    .map_err(RunnerError::Transport)?;
                self.record.lock().unwrap().stdin = received;
            }
            // Dropped here: a receiver that never reads closes its input.
        }

        if let Some(mut stderr) = self.stderr.take() {
            stderr
                .write_all(self.behavior.stderr.as_bytes())
                .await
                .map_err(RunnerError::Transport)?;
        }
        self.stdout = None;

        match self.behavior.exit_code {
            0 => Ok(()),
            code => Err(RunnerError::ExitStatus { code }),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.record.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// File that announces more bytes than it has.
struct ShortFile;

impl CopyableFile for ShortFile {
    fn length(&self) -> u64 {
        10
    }
    fn permissions(&self) -> &str {
        "0644"
    }
    fn target_dir(&self) -> &str {
        "/var/tmp"
    }
    fn target_name(&self) -> &str {
        "short"
    }
    fn content(&self) -> io::Result<ContentReader> {
        Ok(Box::new(io::Cursor::new(b"abcd".to_vec())))
    }
}

fn runner(factory: MockFactory) -> Runner<MockFactory> {
    Runner::new(factory)
}

// ============================================================================
// Copy
// ============================================================================

#[tokio::test]
async fn test_copy_sends_exact_bytes() {
    let factory = MockFactory::default();
    let runner = runner(factory.clone());
    let file = MemoryAsset::new("hello", "/etc/app", "greeting.txt");

    runner.copy(&file).await.unwrap();

    let record = factory.record();
    assert_eq!(record.opens, 1);
    assert_eq!(
        record.commands,
        vec!["sudo mkdir -p /etc/app && sudo scp -t /etc/app".to_string()]
    );
    assert_eq!(record.stdin, b"C0644 5 greeting.txt\nhello\x00");
    assert_eq!(record.closes, 1);
}

#[tokio::test]
async fn test_copy_large_file_through_small_pipes() {
    let factory = MockFactory::default();
    let runner = runner(factory.clone());
    let content = vec![0xA5u8; 100_000];
    let file = MemoryAsset::new(content.clone(), "/srv", "blob").with_permissions("0600");

    tokio::time::timeout(TEST_TIMEOUT, runner.copy(&file))
        .await
        .expect("copy deadlocked")
        .unwrap();

    let record = factory.record();
    let header = b"C0600 100000 blob\n";
    assert_eq!(&record.stdin[..header.len()], header);
    assert_eq!(&record.stdin[header.len()..header.len() + content.len()], &content[..]);
    assert_eq!(record.stdin.len(), header.len() + content.len() + 1);
    assert_eq!(record.stdin.last(), Some(&0));
}

#[tokio::test]
async fn test_copy_zero_length() {
    let factory = MockFactory::default();
    let runner = runner(factory.clone());
    let file = MemoryAsset::new("", "/etc/app", "empty.conf");

    runner.copy(&file).await.unwrap();

    assert_eq!(factory.record().stdin, b"C0644 0 empty.conf\n\x00");
}

#[tokio::test]
async fn test_copy_without_elevation() {
    let factory = MockFactory::default();
    let runner = runner(factory.clone()).with_config(RunnerSection {
        elevate: false,
        ..RunnerSection::default()
    });
    let file = MemoryAsset::new("x", "/home/user/", "x.txt");

    runner.copy(&file).await.unwrap();

    assert_eq!(
        factory.record().commands,
        vec!["mkdir -p /home/user/ && scp -t /home/user/".to_string()]
    );
}

#[tokio::test]
async fn test_copy_short_source_is_size_mismatch() {
    let factory = MockFactory::default();
    let runner = runner(factory.clone());

    // Completing at all proves the receiver saw its input closed.
    let err = tokio::time::timeout(TEST_TIMEOUT, runner.copy(&ShortFile))
        .await
        .expect("copy hung waiting for the receiver")
        .unwrap_err();

    assert!(err.is_size_mismatch(), "{}", err);
    assert_eq!(
        err.to_string(),
        "short: expected to copy 10 bytes, but copied 4 instead"
    );

    let record = factory.record();
    assert_eq!(record.stdin, b"C0644 10 short\nabcd");
    assert_eq!(record.closes, 1);
}

#[tokio::test]
async fn test_copy_receiver_failure_carries_output() {
    let factory = MockFactory::with_behavior(Behavior {
        exit_code: 1,
        stderr: "scp: /etc/app: Permission denied\n".to_string(),
        ..Behavior::default()
    });
    let runner = runner(factory.clone());
    let file = MemoryAsset::new("data", "/etc/app", "app.conf");

    let err = runner.copy(&file).await.unwrap_err();

    assert_eq!(err.exit_code(), Some(1));
    match &err {
        RunnerError::Execution {
            command, output, ..
        } => {
            assert!(command.contains("scp -t /etc/app"));
            assert_eq!(
                output,
                &CapturedOutput::Combined("scp: /etc/app: Permission denied\n".to_string())
            );
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(factory.record().closes, 1);
}

#[tokio::test]
async fn test_copy_receiver_never_reads() {
    let factory = MockFactory::with_behavior(Behavior {
        read_stdin: false,
        exit_code: 127,
        stderr: "sh: scp: not found\n".to_string(),
        ..Behavior::default()
    });
    let runner = runner(factory.clone());
    let file = MemoryAsset::new(vec![1u8; 64 * 1024], "/etc/app", "big.bin");

    let err = tokio::time::timeout(TEST_TIMEOUT, runner.copy(&file))
        .await
        .expect("copy blocked on a receiver that never reads")
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(127));
    assert!(err.to_string().contains("not found"));
}

// ============================================================================
// Remove
// ============================================================================

#[tokio::test]
async fn test_remove_runs_one_command() {
    let factory = MockFactory::default();
    let runner = runner(factory.clone());
    let file = MemoryAsset::new("x", "/etc/kubernetes/addons", "dashboard.yaml");

    runner.remove(&file).await.unwrap();

    let record = factory.record();
    assert_eq!(record.opens, 1);
    assert_eq!(
        record.commands,
        vec!["sudo rm /etc/kubernetes/addons/dashboard.yaml".to_string()]
    );
    assert_eq!(record.closes, 1);
}

#[tokio::test]
async fn test_remove_failure_is_execution_error() {
    let factory = MockFactory::with_behavior(Behavior {
        exit_code: 1,
        stderr: "rm: cannot remove: No such file or directory\n".to_string(),
        ..Behavior::default()
    });
    let runner = runner(factory.clone());
    let file = MemoryAsset::new("x", "/tmp", "gone");

    let err = runner.remove(&file).await.unwrap_err();

    match err.captured_output() {
        Some(CapturedOutput::Separate { stderr, .. }) => {
            assert!(stderr.contains("No such file"));
        }
        other => panic!("unexpected output: {:?}", other),
    }
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_session_creation_failure() {
    let factory = MockFactory::with_behavior(Behavior {
        fail_open: true,
        ..Behavior::default()
    });
    let runner = runner(factory.clone());

    let err = runner
        .copy(&MemoryAsset::new("x", "/tmp", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::SessionCreation(_)));

    let err = runner.run("true").await.unwrap_err();
    assert!(matches!(err, RunnerError::SessionCreation(_)), "{}", err);
    assert!(err.to_string().contains("transport down"));

    let err = runner.combined_output("uname").await.unwrap_err();
    assert!(matches!(err, RunnerError::SessionCreation(_)), "{}", err);
    assert!(err.captured_output().is_none());

    let err = runner
        .remove(&MemoryAsset::new("x", "/tmp", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::SessionCreation(_)), "{}", err);

    assert!(factory.record().commands.is_empty());
}

#[tokio::test]
async fn test_one_session_per_operation() {
    let factory = MockFactory::default();
    let runner = runner(factory.clone());
    let file = MemoryAsset::new("abc", "/opt", "abc");

    runner.run("true").await.unwrap();
    runner.combined_output("uname -a").await.unwrap();
    runner.copy(&file).await.unwrap();
    runner.remove(&file).await.unwrap();

    let record = factory.record();
    assert_eq!(record.opens, 4);
    assert_eq!(record.closes, 4);
    assert_eq!(record.commands.len(), 4);
}
