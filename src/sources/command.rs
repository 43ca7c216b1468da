//! Certificates produced by a shell command.

use crate::core::LoadedCertificate;
use crate::error::{CertError, Result};
use crate::sources::X509KeyPair;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Runs `sh -c <command>` and reads certificates from its standard output.
///
/// The command must write a sequence of JSON [`X509KeyPair`] values, e.g.
/// `{"CertPEMBlock":"...","KeyPEMBlock":"..."}`. Values may span lines and
/// need no separator.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_tls::CancellationToken;
/// use hotswap_tls::sources::CommandSource;
///
/// # async fn example() -> hotswap_tls::error::Result<()> {
/// let mut stream = CommandSource::new("vault-agent-render --json").spawn(CancellationToken::new())?;
/// while let Some(cert) = stream.next().await {
///     println!("chain length {}", cert.cert_chain().len());
/// }
/// stream.wait().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CommandSource {
    command: String,
}

impl CommandSource {
    /// Create a source for a shell command line.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// The shell command line.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Start the command and begin decoding its output.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Spawn`] if the shell cannot be started.
    pub fn spawn(&self, shutdown: CancellationToken) -> Result<CommandStream> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CertError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| CertError::Spawn {
            command: self.command.clone(),
            source: std::io::Error::other("stdout was not captured"),
        })?;
        debug!(command = %self.command, pid = ?child.id(), "started certificate command");

        let (tx, rx) = mpsc::channel(1);
        let stop = shutdown.child_token();
        let decoder = tokio::spawn(decode(stdout, tx, stop.clone()));

        Ok(CommandStream {
            command: self.command.clone(),
            rx,
            child,
            decoder,
            shutdown,
            stop,
        })
    }
}

/// Certificates from a running [`CommandSource`].
///
/// Call [`wait`](Self::wait) once done to reap the child and learn how it
/// ended. Dropping the stream without waiting kills the child.
pub struct CommandStream {
    command: String,
    rx: mpsc::Receiver<LoadedCertificate>,
    child: Child,
    decoder: JoinHandle<Result<()>>,
    shutdown: CancellationToken,
    /// Stops the decoder; a child of `shutdown`.
    stop: CancellationToken,
}

impl CommandStream {
    /// Wait for the next certificate.
    ///
    /// Returns `None` once the output ended, could not be decoded, or
    /// shutdown was requested.
    pub async fn next(&mut self) -> Option<LoadedCertificate> {
        self.rx.recv().await
    }

    /// Stop reading, wait for the child and report how it ended.
    ///
    /// The child is killed if reading stopped before its output ended,
    /// including when it is still running and has written nothing new.
    /// Closing the stream from this side before the output ended is not an
    /// error.
    ///
    /// # Errors
    ///
    /// - [`CertError::Shutdown`] if the shutdown token fired
    /// - [`CertError::CommandExit`] if the child exited unsuccessfully or its
    ///   output was unusable, with the decoding error as the cause
    pub async fn wait(mut self) -> Result<()> {
        drop(self.rx);
        self.stop.cancel();

        let decoded = match self.decoder.await {
            Ok(decoded) => decoded,
            Err(e) => Err(CertError::TaskFailed(e)),
        };

        if decoded.is_err() {
            if let Err(e) = self.child.start_kill() {
                debug!(command = %self.command, error = %e, "child already gone");
            }
        }

        let status = self.child.wait().await.map_err(CertError::Io)?;
        debug!(command = %self.command, %status, "certificate command exited");

        match decoded {
            Err(CertError::Shutdown) if self.shutdown.is_cancelled() => Err(CertError::Shutdown),
            // Stopped from this side while the child was still writing.
            Err(CertError::Shutdown) | Err(CertError::ReceiverClosed) => Ok(()),
            Ok(()) if status.success() => Ok(()),
            Ok(()) => Err(CertError::CommandExit {
                command: self.command,
                status,
                cause: None,
            }),
            Err(cause) => {
                warn!(command = %self.command, error = %cause, "certificate command output rejected");
                Err(CertError::CommandExit {
                    command: self.command,
                    status,
                    cause: Some(Box::new(cause)),
                })
            }
        }
    }
}

/// Decode key pair records from `reader` until it ends.
async fn decode<R>(
    mut reader: R,
    tx: mpsc::Sender<LoadedCertificate>,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        for pair in take_records(&mut buf)? {
            let cert = LoadedCertificate::from_pair(pair)?;
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Err(CertError::Shutdown),
                sent = tx.send(cert) => sent.map_err(|_| CertError::ReceiverClosed)?,
            }
        }

        let n = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(CertError::Shutdown),
            read = reader.read(&mut chunk) => read?,
        };
        if n == 0 {
            return if buf.iter().all(u8::is_ascii_whitespace) {
                Ok(())
            } else {
                Err(CertError::TruncatedStream)
            };
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Remove every complete record from the front of `buf`.
///
/// An incomplete trailing record is left in place for the next read.
fn take_records(buf: &mut Vec<u8>) -> Result<Vec<X509KeyPair>> {
    let mut records = Vec::new();
    let mut stream = serde_json::Deserializer::from_slice(buf.as_slice()).into_iter::<X509KeyPair>();
    for record in stream.by_ref() {
        match record {
            Ok(pair) => records.push(pair),
            Err(e) if e.is_eof() => break,
            Err(e) => return Err(e.into()),
        }
    }
    let consumed = stream.byte_offset();
    buf.drain(..consumed);
    Ok(records)
}
