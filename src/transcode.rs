//! Extractor -> transcoder process pipeline.
//!
//! `yt-dlp` writes the best audio stream to stdout, a copy task feeds it into
//! `ffmpeg`'s stdin and `ffmpeg` writes WAV to its stdout, which is exposed as
//! a byte stream. Both children are spawned with `kill_on_drop`, so dropping
//! the pipeline at any point (client disconnect, error, end of stream) tears
//! everything down.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use axum::body::Bytes;
use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::config::ToolsConfig;

const CHUNK_SIZE: usize = 64 * 1024;
/// Lines of stderr kept per process for error messages
const STDERR_TAIL: usize = 20;

/// Program plus arguments for one stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ProcessSpec {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `yt-dlp` writing the best audio-only format of `url` to stdout.
    pub fn extractor(tools: &ToolsConfig, url: &str) -> Self {
        let mut args: Vec<OsString> = ["-f", "bestaudio", "--no-playlist", "--quiet", "-o", "-"]
            .into_iter()
            .map(OsString::from)
            .collect();
        if let Some(cookies) = &tools.cookies_file {
            args.push("--cookies".into());
            args.push(cookies.into());
        }
        // Stops yt-dlp from reading a url starting with '-' as an option
        args.push("--".into());
        args.push(url.into());
        Self {
            program: tools.ytdlp_path.clone(),
            args,
        }
    }

    /// `ffmpeg` turning whatever arrives on stdin into stereo PCM WAV.
    pub fn transcoder(tools: &ToolsConfig) -> Self {
        Self::new(
            &tools.ffmpeg_path,
            [
                "-hide_banner".to_string(),
                "-loglevel".to_string(),
                "error".to_string(),
                "-i".to_string(),
                "pipe:0".to_string(),
                "-vn".to_string(),
                "-ac".to_string(),
                "2".to_string(),
                "-ar".to_string(),
                tools.sample_rate.to_string(),
                "-f".to_string(),
                "wav".to_string(),
                "pipe:1".to_string(),
            ],
        )
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        command
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} failed ({status}): {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("No audio received for {0:?}")]
    Idle(Duration),
    #[error("Transcoder produced no audio")]
    NoOutput,
    #[error("Failed to read transcoded audio: {0}")]
    Io(#[from] std::io::Error),
}

/// A running extractor/transcoder pair.
pub struct TranscodePipeline {
    extractor: Child,
    transcoder: Child,
    extractor_name: String,
    transcoder_name: String,
    output: ChildStdout,
    pump: Option<JoinHandle<std::io::Result<u64>>>,
    extractor_stderr: Option<JoinHandle<String>>,
    transcoder_stderr: Option<JoinHandle<String>>,
    idle_timeout: Duration,
}

impl TranscodePipeline {
    /// Start both processes and the copy task between them.
    pub fn spawn(
        extractor: &ProcessSpec,
        transcoder: &ProcessSpec,
        idle_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let extractor_name = extractor.name();
        let transcoder_name = transcoder.name();

        let mut extractor_child = extractor
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: extractor_name.clone(),
                source,
            })?;

        // An early return from here on drops extractor_child, which kills it
        let mut transcoder_child = transcoder
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: transcoder_name.clone(),
                source,
            })?;

        let mut source = take_pipe(extractor_child.stdout.take(), &extractor_name, "stdout")?;
        let mut sink = take_pipe(transcoder_child.stdin.take(), &transcoder_name, "stdin")?;
        let output = take_pipe(transcoder_child.stdout.take(), &transcoder_name, "stdout")?;

        let pump = tokio::spawn(async move {
            let copied = tokio::io::copy(&mut source, &mut sink).await;
            // Closing stdin lets the transcoder flush and exit
            let _ = sink.shutdown().await;
            drop(sink);
            copied
        });

        let extractor_stderr = extractor_child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(stderr_tail(stderr, extractor_name.clone())));
        let transcoder_stderr = transcoder_child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(stderr_tail(stderr, transcoder_name.clone())));

        tracing::debug!(
            "Started pipeline {} {:?} | {} {:?}",
            extractor_name,
            extractor.args,
            transcoder_name,
            transcoder.args
        );

        Ok(Self {
            extractor: extractor_child,
            transcoder: transcoder_child,
            extractor_name,
            transcoder_name,
            output,
            pump: Some(pump),
            extractor_stderr,
            transcoder_stderr,
            idle_timeout,
        })
    }

    /// WAV bytes as they are produced. After the last chunk both exit
    /// statuses are checked and a failure ends the stream with an error.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Bytes, PipelineError>> + Send {
        async_stream::try_stream! {
            let mut buffer = vec![0u8; CHUNK_SIZE];
            let mut total = 0usize;
            loop {
                let read = tokio::time::timeout(self.idle_timeout, self.output.read(&mut buffer))
                    .await
                    .map_err(|_| PipelineError::Idle(self.idle_timeout))??;
                if read == 0 {
                    break;
                }
                total += read;
                yield Bytes::copy_from_slice(&buffer[..read]);
            }
            self.finish().await?;
            tracing::debug!("Pipeline finished after {} bytes", total);
        }
    }

    /// Wait for the copy task and both processes. The extractor's failure is
    /// reported first since it usually starves the transcoder, unless the
    /// extractor only died because the transcoder stopped reading.
    async fn finish(&mut self) -> Result<(), PipelineError> {
        let mut pipe_closed = false;
        if let Some(pump) = self.pump.take() {
            match pump.await {
                Ok(Ok(bytes)) => tracing::debug!("Piped {} bytes into {}", bytes, self.transcoder_name),
                Ok(Err(error)) => {
                    tracing::debug!("Pipe into {} closed: {}", self.transcoder_name, error);
                    pipe_closed = error.kind() == std::io::ErrorKind::BrokenPipe;
                }
                Err(error) => tracing::warn!("Pipe task failed: {}", error),
            }
        }

        let extractor_status = self.extractor.wait().await?;
        let transcoder_status = self.transcoder.wait().await?;

        let transcoder_quit_first = !transcoder_status.success()
            && (pipe_closed || killed_by_broken_pipe(extractor_status));
        if !extractor_status.success() && !transcoder_quit_first {
            return Err(PipelineError::Exit {
                program: self.extractor_name.clone(),
                status: extractor_status,
                stderr: collect_stderr(self.extractor_stderr.take()).await,
            });
        }
        if !transcoder_status.success() {
            return Err(PipelineError::Exit {
                program: self.transcoder_name.clone(),
                status: transcoder_status,
                stderr: collect_stderr(self.transcoder_stderr.take()).await,
            });
        }
        Ok(())
    }
}

/// SIGPIPE, either as the signal itself or as a shell's `128 + 13` exit code.
#[cfg(unix)]
fn killed_by_broken_pipe(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;

    const SIGPIPE: i32 = 13;
    status.signal() == Some(SIGPIPE) || status.code() == Some(128 + SIGPIPE)
}

#[cfg(not(unix))]
fn killed_by_broken_pipe(_status: ExitStatus) -> bool {
    false
}

impl Drop for TranscodePipeline {
    fn drop(&mut self) {
        // Children are killed by kill_on_drop; the tasks only hold pipe ends
        for task in [&self.extractor_stderr, &self.transcoder_stderr]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        if let Some(pump) = &self.pump {
            pump.abort();
        }
    }
}

fn take_pipe<T>(pipe: Option<T>, program: &str, name: &str) -> Result<T, PipelineError> {
    pipe.ok_or_else(|| PipelineError::Spawn {
        program: program.to_string(),
        source: std::io::Error::other(format!("{name} was not captured")),
    })
}

/// Drain stderr so the child never blocks on a full pipe, keeping the tail.
async fn stderr_tail(stderr: ChildStderr, program: String) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!("{}: {}", program, line);
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

async fn collect_stderr(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}
