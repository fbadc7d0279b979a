use std::{
    ffi::{OsStr, OsString},
    io::Read,
    process::{Command, Stdio},
    thread,
};

use tracing::debug;

use crate::core::errors::{HarnessError, Result};

const DEFAULT_MAX_CAPTURE_BYTES: usize = 16 * 1024 * 1024;

fn max_capture_bytes() -> usize {
    std::env::var("PYBOX_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Renders `program args...` the way it is reported in failure output.
#[must_use]
pub fn command_line(program: &OsStr, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Execute a program and capture stdout/stderr.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams cannot
/// be read entirely. A non-zero exit is not an error here.
pub fn run_command(
    program: &OsStr,
    args: &[OsString],
    envs: &[(String, OsString)],
) -> Result<RunOutput> {
    let mut command = configured_command(program, args, envs);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let display = program.to_string_lossy().to_string();
    debug!(command = %command_line(program, args), "spawning captured command");
    let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
        program: display.clone(),
        source,
    })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let limit = max_capture_bytes();
    let stdout_handle = thread::spawn(move || read_to_string_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_to_string_limited(stderr, limit));

    let status = child
        .wait()
        .map_err(|err| HarnessError::io(format!("failed to wait for {display}"), err))?;
    let code = status.code().unwrap_or(-1);
    let (mut stdout, stdout_truncated) = join_reader(stdout_handle, &display, "stdout")?;
    let (mut stderr, stderr_truncated) = join_reader(stderr_handle, &display, "stderr")?;
    if stdout_truncated {
        stdout.push_str("\n[...truncated...]\n");
    }
    if stderr_truncated {
        stderr.push_str("\n[...truncated...]\n");
    }
    Ok(RunOutput {
        code,
        stdout,
        stderr,
    })
}

/// Execute a program with inherited stdio.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or waited on.
pub fn run_command_passthrough(
    program: &OsStr,
    args: &[OsString],
    envs: &[(String, OsString)],
) -> Result<RunOutput> {
    let mut command = configured_command(program, args, envs);
    command.stdin(Stdio::inherit());
    command.stdout(Stdio::inherit());
    command.stderr(Stdio::inherit());

    debug!(command = %command_line(program, args), "spawning passthrough command");
    let status = command.status().map_err(|source| HarnessError::Spawn {
        program: program.to_string_lossy().to_string(),
        source,
    })?;
    Ok(RunOutput {
        code: status.code().unwrap_or(-1),
        stdout: String::new(),
        stderr: String::new(),
    })
}

fn configured_command(
    program: &OsStr,
    args: &[OsString],
    envs: &[(String, OsString)],
) -> Command {
    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in envs {
        command.env(key, value);
    }
    command
}

type ReaderResult = std::io::Result<(String, bool)>;

fn join_reader(
    handle: thread::JoinHandle<ReaderResult>,
    program: &str,
    stream: &str,
) -> Result<(String, bool)> {
    let joined = handle.join().map_err(|_| {
        HarnessError::io(
            format!("{stream} reader for {program} panicked"),
            std::io::Error::other("reader thread panicked"),
        )
    })?;
    joined.map_err(|err| HarnessError::io(format!("failed to read {stream} of {program}"), err))
}

fn read_to_string_limited(reader: Option<impl Read>, limit: usize) -> ReaderResult {
    let Some(mut reader) = reader else {
        return Ok((String::new(), false));
    };
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    Ok((String::from_utf8_lossy(&buffer).to_string(), truncated))
}

/// Keeps the tail of the stream once `limit` is exceeded.
fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    if limit == 0 {
        return;
    }
    if buffer.len().saturating_add(chunk.len()) <= limit {
        buffer.extend_from_slice(chunk);
        return;
    }
    *truncated = true;
    let old_len = buffer.len();
    let excess = old_len.saturating_add(chunk.len()).saturating_sub(limit);
    if excess >= old_len {
        buffer.clear();
        let drop_from_chunk = excess.saturating_sub(old_len).min(chunk.len());
        buffer.extend_from_slice(&chunk[drop_from_chunk..]);
    } else {
        buffer.drain(0..excess);
        buffer.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[cfg(unix)]
    #[test]
    fn run_command_captures_output_and_status_unix() -> anyhow::Result<()> {
        let output = run_command(
            OsStr::new("/bin/sh"),
            &os_args(&["-c", "printf out && printf err >&2; exit 7"]),
            &[],
        )?;
        assert_eq!(output.code, 7);
        assert!(!output.success());
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_command_applies_env_unix() -> anyhow::Result<()> {
        let output = run_command(
            OsStr::new("/bin/sh"),
            &os_args(&["-c", "printf '%s|%s' \"$PYBOX_MARKER\" \"$PYBOX_OTHER\""]),
            &[
                ("PYBOX_MARKER".into(), OsString::from("value")),
                ("PYBOX_OTHER".into(), OsString::from("second")),
            ],
        )?;
        assert_eq!(output.stdout, "value|second");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_command_passthrough_returns_status_unix() -> anyhow::Result<()> {
        let output = run_command_passthrough(
            OsStr::new("/bin/sh"),
            &os_args(&["-c", "exit 3"]),
            &[],
        )?;
        assert_eq!(output.code, 3);
        assert!(output.stdout.is_empty());
        assert!(output.stderr.is_empty());
        Ok(())
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_command(OsStr::new("pybox-definitely-missing-program"), &[], &[])
            .unwrap_err();
        assert!(matches!(err, HarnessError::Spawn { .. }), "{err:?}");
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let line = command_line(OsStr::new("/venv/bin/python"), &os_args(&["-m", "pip", "list"]));
        assert_eq!(line, "/venv/bin/python -m pip list");
    }

    #[test]
    fn append_limited_keeps_tail() {
        let mut buffer = Vec::new();
        let mut truncated = false;
        append_limited(&mut buffer, b"abcdef", 4, &mut truncated);
        assert!(truncated);
        assert_eq!(buffer, b"cdef");
        append_limited(&mut buffer, b"gh", 4, &mut truncated);
        assert_eq!(buffer, b"efgh");
    }
}
