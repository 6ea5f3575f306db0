//! External command execution.
//!
//! Programs are looked up on `PATH` and spawned with `tokio::process`. The
//! byte input port feeds the child's stdin, its stdout is copied to the byte
//! output port, and stderr goes straight to the terminal.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::interpreter::EvalResult;
use crate::scheduler::Ports;
use crate::value::{Status, Value};

/// Exit code for a program that cannot be found or started.
pub const NOT_FOUND_CODE: i32 = 127;

const COPY_CHUNK: usize = 8192;

/// Resolve a command name to an executable in `path_var`.
pub fn resolve_in_path(name: &str, path_var: &str) -> Option<String> {
    for dir in path_var.split(':') {
        if dir.is_empty() {
            continue;
        }

        let full_path = format!("{}/{}", dir, name);
        let path = Path::new(&full_path);

        if path.is_file() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(metadata) = path.metadata() {
                    if metadata.permissions().mode() & 0o111 != 0 {
                        return Some(full_path);
                    }
                }
            }

            #[cfg(not(unix))]
            {
                return Some(full_path);
            }
        }
    }

    None
}

/// Run an external program as a pipeline stage.
///
/// Failing to find or start the program is a status, not an error.
#[tracing::instrument(level = "debug", skip(args, ports), fields(argc = args.len()))]
pub async fn run_external(name: &str, args: &[Value], ports: &Ports) -> EvalResult<Status> {
    let executable = if name.contains('/') {
        name.to_string()
    } else {
        let path_var = std::env::var("PATH").unwrap_or_default();
        match resolve_in_path(name, &path_var) {
            Some(path) => path,
            None => {
                eprintln!("rill: {}: command not found", name);
                return Ok(Status::Failure(NOT_FOUND_CODE));
            }
        }
    };
    tracing::debug!(executable = %executable, "resolved external command");

    let mut command = Command::new(&executable);
    command
        .args(args.iter().map(Value::to_string))
        .stdin(if ports.byte_in.is_connected() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            eprintln!("rill: {}: {}", name, e);
            return Ok(Status::Failure(NOT_FOUND_CODE));
        }
    };

    let feeder = child.stdin.take().map(|mut stdin| {
        let input = ports.byte_in.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; COPY_CHUNK];
            loop {
                match input.read_chunk(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stdin.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    });

    if let Some(mut stdout) = child.stdout.take() {
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if !ports.byte_out.write_checked(&buf[..n]).await? {
                tracing::debug!(executable = %executable, "output reader gone, closing child stdout");
                break;
            }
        }
        // Dropping stdout here lets the child see EPIPE or SIGPIPE.
    }

    let status = child.wait().await?;
    if let Some(feeder) = feeder {
        // The child is gone; nothing left to feed.
        feeder.abort();
    }
    Ok(Status::from_code(exit_code(status)))
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
