//! `p4` executable adapter.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use super::ztag::ZtagParser;
use super::{P4Command, Record, RecordStream, Vcs, VcsError};
use crate::config::Connection;

/// Runs commands through the `p4` command line client.
#[derive(Debug, Clone)]
pub struct P4Cli {
    connection: Connection,
}

impl P4Cli {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn global_args(&self, command: &P4Command, tagged: bool) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(client) = command.client().or(self.connection.client.as_deref()) {
            args.push("-c".to_string());
            args.push(client.to_string());
        }
        if let Some(port) = &self.connection.port {
            args.push("-p".to_string());
            args.push(port.clone());
        }
        if let Some(user) = &self.connection.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }
        if tagged {
            args.push("-ztag".to_string());
        }
        if command.args_from_stdin() {
            args.push("-x".to_string());
            args.push("-".to_string());
        }
        args
    }

    fn command(&self, command: &P4Command, tagged: bool) -> (Command, String) {
        let global = self.global_args(command, tagged);
        let mut parts = vec![self.connection.program.clone()];
        parts.extend(global.iter().cloned());
        parts.push(command.line().trim_start_matches("-x - ").to_string());
        let description = parts.join(" ");

        let mut cmd = Command::new(&self.connection.program);
        cmd.args(&global).arg(command.name()).args(command.arguments());
        (cmd, description)
    }

    fn spawn(&self, mut cmd: Command) -> Result<Child, VcsError> {
        cmd.spawn().map_err(|source| VcsError::Spawn {
            program: self.connection.program.clone(),
            source,
        })
    }
}

impl Vcs for P4Cli {
    fn run(&self, command: &P4Command) -> Result<RecordStream<'_>, VcsError> {
        let (mut cmd, description) = self.command(command, true);
        debug!("{}", description);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = self.spawn(cmd)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("p4 stdout was not captured"))?;
        let stderr = child.stderr.take();

        // Drain stderr on the side so a chatty command cannot block on a full pipe.
        let drain = thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text);
            }
            text
        });

        Ok(Box::new(ProcessRecords {
            command: description,
            child: Some(child),
            reader: BufReader::new(stdout),
            drain: Some(drain),
            parser: ZtagParser::new(),
            done: false,
        }))
    }

    fn run_raw(&self, command: &P4Command, input: Option<&str>) -> Result<String, VcsError> {
        let (mut cmd, description) = self.command(command, false);
        debug!("{}", description);

        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
        let mut child = self.spawn(cmd)?;

        // `-x -` answers each batch of arguments as it reads them, so stdout
        // has to be drained while the input is still being written.
        let feeder = match (input, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => {
                let input = input.to_string();
                Some(thread::spawn(move || stdin.write_all(input.as_bytes())))
            }
            _ => None,
        };

        let output = child.wait_with_output()?;
        if let Some(feeder) = feeder {
            match feeder.join() {
                Ok(Ok(())) => {}
                // Exit status decides success when the process stops reading.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("{}: stdin closed early", description);
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(std::io::Error::other("stdin writer panicked").into()),
            }
        }

        if !output.status.success() {
            return Err(VcsError::ExecutionFailed {
                command: description,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Records parsed from a running `p4` process as its output arrives.
struct ProcessRecords {
    command: String,
    child: Option<Child>,
    reader: BufReader<ChildStdout>,
    drain: Option<JoinHandle<String>>,
    parser: ZtagParser,
    done: bool,
}

impl ProcessRecords {
    /// Wait for the process and turn a non-zero exit into an error.
    fn reap(&mut self) -> Result<(), VcsError> {
        let status = match self.child.take() {
            Some(mut child) => child.wait()?,
            None => return Ok(()),
        };
        let stderr = self
            .drain
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            if !stderr.trim().is_empty() {
                debug!("{}: {}", self.command, stderr.trim());
            }
            Ok(())
        } else {
            Err(VcsError::ExecutionFailed {
                command: self.command.clone(),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

impl Iterator for ProcessRecords {
    type Item = Result<Record, VcsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut line = Vec::new();
        loop {
            line.clear();
            match self.reader.read_until(b'\n', &mut line) {
                Ok(0) => {
                    if let Some(record) = self.parser.finish() {
                        return Some(Ok(record));
                    }
                    self.done = true;
                    return self.reap().err().map(Err);
                }
                Ok(_) => {
                    if let Some(record) = self.parser.feed(&String::from_utf8_lossy(&line)) {
                        return Some(Ok(record));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

impl Drop for ProcessRecords {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                warn!("Failed to stop `{}`: {}", self.command, e);
            }
            let _ = child.wait();
        }
    }
}
