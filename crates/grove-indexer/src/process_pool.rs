//! Bounded pool of interpreter processes
//!
//! A fixed number of worker threads pull invocations from a shared channel.
//! Each invocation runs as a child process with piped stdout/stderr; the
//! worker polls for exit and kills the child on timeout or cancellation.

use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use grove_core::CancellationFlag;
use thiserror::Error;

use crate::backend::Availability;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timeout for availability probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One process to run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("could not start process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("cancelled")]
    Cancelled,

    #[error("worker thread exited before responding")]
    WorkerLost,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_output(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run one invocation to completion and return its stdout.
pub fn run_with_timeout(
    invocation: &Invocation,
    timeout: Duration,
    cancel: &CancellationFlag,
) -> Result<Vec<u8>, ProcessError> {
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled);
    }

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &invocation.current_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(ProcessError::Spawn)?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                kill(&mut child);
                return Err(ProcessError::Spawn(e));
            }
        }
        if cancel.is_cancelled() {
            kill(&mut child);
            return Err(ProcessError::Cancelled);
        }
        if started.elapsed() >= timeout {
            tracing::debug!("Killing {} after {:?}", invocation.program.display(), timeout);
            kill(&mut child);
            return Err(ProcessError::Timeout(timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = join_output(stdout);
    let stderr = join_output(stderr);
    if status.success() {
        Ok(stdout)
    } else {
        Err(ProcessError::Failed {
            status,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        })
    }
}

/// Run a probe command and report whether it exited successfully.
pub fn run_probe(program: &std::path::Path, args: &[&str], timeout: Duration) -> Availability {
    let mut invocation = Invocation::new(program);
    for arg in args {
        invocation = invocation.arg(*arg);
    }
    match run_with_timeout(&invocation, timeout, &CancellationFlag::new()) {
        Ok(_) => Availability::Available,
        Err(ProcessError::Spawn(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            Availability::unavailable(format!("`{}` not found on PATH", program.display()))
        }
        Err(e) => Availability::unavailable(format!("`{}` {}", program.display(), e)),
    }
}

struct Job {
    index: usize,
    invocation: Invocation,
    response: Sender<(usize, Result<Vec<u8>, ProcessError>)>,
}

/// Fixed-size pool of worker threads that each run one process at a time.
pub struct ProcessPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ProcessPool {
    pub fn new(num_workers: usize, timeout: Duration, cancel: CancellationFlag) -> Self {
        let (sender, receiver) = std::sync::mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..num_workers.max(1))
            .map(|i| {
                let receiver = receiver.clone();
                let cancel = cancel.clone();
                std::thread::spawn(move || Self::worker_thread(i, receiver, timeout, cancel))
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    fn worker_thread(
        worker_id: usize,
        receiver: Arc<Mutex<Receiver<Job>>>,
        timeout: Duration,
        cancel: CancellationFlag,
    ) {
        tracing::debug!("Process worker {} started", worker_id);

        loop {
            let job = {
                let Ok(guard) = receiver.lock() else {
                    break;
                };
                match guard.recv() {
                    Ok(job) => job,
                    Err(_) => break,
                }
            };

            let result = run_with_timeout(&job.invocation, timeout, &cancel);
            if job.response.send((job.index, result)).is_err() {
                tracing::warn!("Failed to send process result back to caller");
            }
        }

        tracing::debug!("Process worker {} shutting down", worker_id);
    }

    /// Run every invocation and return the results in submission order.
    pub fn run_all(&self, invocations: Vec<Invocation>) -> Vec<Result<Vec<u8>, ProcessError>> {
        let count = invocations.len();
        let mut results: Vec<Option<Result<Vec<u8>, ProcessError>>> =
            (0..count).map(|_| None).collect();

        let (response, responses) = std::sync::mpsc::channel();
        if let Some(sender) = &self.sender {
            for (index, invocation) in invocations.into_iter().enumerate() {
                let job = Job {
                    index,
                    invocation,
                    response: response.clone(),
                };
                if sender.send(job).is_err() {
                    break;
                }
            }
        }
        drop(response);

        for (index, result) in responses {
            if let Some(slot) = results.get_mut(index) {
                *slot = Some(result);
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or(Err(ProcessError::WorkerLost)))
            .collect()
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
