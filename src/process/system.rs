use super::debug_channel::{message_lines, DebugChannel, DebugMessage};
use super::sanitize::sanitize_args;
use super::{CaptureOutput, Encoding, Invocation, LineSink, ProcessRunner, StreamOrigin};
use crate::error::{Error, Result};
use log::{debug, info};
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Runs real child processes with `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn spawn(invocation: &Invocation) -> Result<Child> {
        let mut command = Command::new(invocation.program());
        command
            .args(sanitize_args(invocation.arguments()))
            .current_dir(invocation.working_dir())
            .envs(invocation.env_overrides().iter().map(|(k, v)| (k, v)))
            .stdin(if invocation.stdin_data().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command.spawn().map_err(|e| Error::ProcessSpawnFailed {
            program: invocation.program().to_string(),
            message: e.to_string(),
        })
    }

    /// Writes the stdin payload from its own thread so a child filling its
    /// output pipes cannot deadlock against us.
    fn feed_stdin(child: &mut Child, invocation: &Invocation) -> Option<JoinHandle<()>> {
        let data = invocation.stdin_data()?;
        let mut pipe = child.stdin.take()?;
        let bytes = invocation.stream_encoding().encode(data);
        Some(std::thread::spawn(move || {
            if let Err(e) = pipe.write_all(&bytes) {
                debug!("Failed to write child stdin: {}", e);
            }
        }))
    }

    fn announce(invocation: &Invocation) -> bool {
        let cwd = invocation.working_dir();
        let cwd = std::fs::canonicalize(cwd).unwrap_or_else(|_| cwd.to_path_buf());
        if invocation.is_dry_run() {
            info!(
                "[DRY-RUN] \"{}\" in \"{}\"",
                invocation.command_line(),
                cwd.display()
            );
        } else {
            debug!("Running \"{}\" in \"{}\"", invocation.command_line(), cwd.display());
        }
        invocation.is_dry_run()
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn drain<R: Read>(pipe: R, origin: StreamOrigin, encoding: Encoding, sink: &dyn LineSink) {
    for chunk in BufReader::new(pipe).split(b'\n') {
        match chunk {
            Ok(bytes) => {
                let line = encoding.decode(&bytes);
                sink.line(origin, line.trim_end_matches('\r'));
            }
            Err(e) => {
                debug!("Stopped reading child {}: {}", origin, e);
                break;
            }
        }
    }
}

/// Forwards the debug messages of process `pid`; earlier writers that the
/// listener kept before the child existed are dropped here.
fn forward_debug(messages: Receiver<DebugMessage>, pid: u32, encoding: Encoding, sink: &dyn LineSink) {
    for (writer, message) in messages {
        if writer != pid {
            continue;
        }
        for line in message_lines(&message, encoding) {
            sink.line(StreamOrigin::Debug, &line);
        }
    }
}

fn heartbeat(program: &str, interval: Duration, done: &AtomicBool) {
    let mut last = Instant::now();
    while !done.load(Ordering::Relaxed) {
        if last.elapsed() >= interval {
            info!("Keepalive for {}", program);
            last += interval;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

impl ProcessRunner for SystemRunner {
    fn capture(&self, invocation: &Invocation) -> Result<CaptureOutput> {
        if Self::announce(invocation) {
            return Ok(CaptureOutput::default());
        }

        let mut child = Self::spawn(invocation)?;
        let writer = Self::feed_stdin(&mut child, invocation);
        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }

        let encoding = invocation.stream_encoding();
        Ok(CaptureOutput::new(
            exit_code(output.status),
            encoding.decode(&output.stdout),
            encoding.decode(&output.stderr),
        ))
    }

    fn stream(&self, invocation: &Invocation, sink: &dyn LineSink) -> Result<i32> {
        if Self::announce(invocation) {
            return Ok(0);
        }

        let (listener, messages) = invocation
            .wants_debug_channel()
            .then(DebugChannel::open)
            .flatten()
            .map(DebugChannel::listen)
            .unzip();

        let mut child = Self::spawn(invocation)?;
        let pid = child.id();
        if let Some(listener) = &listener {
            listener.attach(pid);
        }
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let writer = Self::feed_stdin(&mut child, invocation);
        let encoding = invocation.stream_encoding();
        let done = AtomicBool::new(false);

        let status = std::thread::scope(|scope| {
            if let Some(messages) = messages {
                scope.spawn(move || forward_debug(messages, pid, encoding, sink));
            }

            if let Some(pipe) = stdout {
                scope.spawn(move || drain(pipe, StreamOrigin::Stdout, encoding, sink));
            }
            if let Some(pipe) = stderr {
                scope.spawn(move || drain(pipe, StreamOrigin::Stderr, encoding, sink));
            }
            if let Some(interval) = invocation.heartbeat_interval() {
                let done = &done;
                scope.spawn(move || heartbeat(invocation.program(), interval, done));
            }

            let status = child.wait();
            done.store(true, Ordering::Relaxed);
            drop(listener);
            status
        })?;

        if let Some(writer) = writer {
            let _ = writer.join();
        }

        let code = exit_code(status);
        debug!("Finished with exit code {} (0x{:08x})", code, code);
        Ok(code)
    }
}
