// Quill - Narrative Script Language Server
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Message transports between the server and a compiler worker.
//!
//! Both ends are plain unbounded channels of [`Message`]. The in-memory
//! pair connects an in-process worker task; [`spawn_process`] bridges the
//! same channels to a child process speaking newline-delimited JSON over
//! its stdio.

use crate::protocol::Message;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// The server's half: sends requests, receives responses.
pub struct HostEnd {
    pub outgoing: mpsc::UnboundedSender<Message>,
    pub incoming: mpsc::UnboundedReceiver<Message>,
}

/// The worker's half: receives requests, sends responses.
pub struct WorkerEnd {
    pub incoming: mpsc::UnboundedReceiver<Message>,
    pub outgoing: mpsc::UnboundedSender<Message>,
}

/// Connected in-memory pair.
pub fn channel_pair() -> (HostEnd, WorkerEnd) {
    let (to_worker, from_host) = mpsc::unbounded_channel();
    let (to_host, from_worker) = mpsc::unbounded_channel();
    (
        HostEnd {
            outgoing: to_worker,
            incoming: from_worker,
        },
        WorkerEnd {
            incoming: from_host,
            outgoing: to_host,
        },
    )
}

/// Spawn `command` and bridge its stdio to a [`HostEnd`].
///
/// The child is killed when the returned handle is dropped. When its stdout
/// closes, the host's incoming channel closes too, which the RPC channel
/// reports as a disconnect.
pub fn spawn_process(command: &str, args: &[String]) -> io::Result<(HostEnd, Child)> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "compiler stdin unavailable"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "compiler stdout unavailable"))?;

    let (host, mut worker) = channel_pair();
    debug!("Spawned compiler process: {} {:?}", command, args);

    tokio::spawn(async move {
        while let Some(message) = worker.incoming.recv().await {
            let mut line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to encode compiler message: {}", e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                warn!("Compiler stdin closed: {}", e);
                break;
            }
        }
    });

    let outgoing = worker.outgoing;
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match serde_json::from_str::<Message>(&line) {
                    Ok(message) => {
                        if outgoing.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Discarding malformed compiler output: {}", e),
                },
                Ok(None) => {
                    debug!("Compiler stdout closed");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read compiler output: {}", e);
                    break;
                }
            }
        }
    });

    Ok((host, child))
}
