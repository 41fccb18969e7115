//! Sync service client.
//!
//! Drives STAT, LIST, RECV (pull) and SEND (push) over a stream that has
//! already selected the `sync:` service. Each operation is one request
//! followed by a run of response frames; the stream is borrowed mutably for
//! the whole exchange, so two operations can never interleave on one channel.

use crate::config::SyncConfig;
use crate::error::{AdbError, Result};
use crate::sync::progress::{CancellationToken, SyncProgress};
use crate::sync::protocol::{
    encode_header, read_frame, write_frame, write_request, Frame, SyncCommand, MAX_PATH_LENGTH,
};
use crate::sync::stat::{decode_dent, decode_stat, FileStatistics};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

fn check_path(path: &str) -> Result<()> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(AdbError::PathTooLong {
            len: path.len(),
            max: MAX_PATH_LENGTH,
        });
    }
    Ok(())
}

fn unexpected(frame: &Frame, during: &'static str) -> AdbError {
    AdbError::UnexpectedResponse {
        got: frame.command.to_string(),
        during,
    }
}

fn failure(frame: &Frame) -> AdbError {
    let message = frame.message();
    tracing::warn!(message = %message, "device answered FAIL");
    AdbError::protocol(message)
}

/// Client for one sync channel.
pub struct SyncService<S> {
    stream: S,
    config: SyncConfig,
    poisoned: Option<String>,
}

impl<S> SyncService<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            config: SyncConfig::default(),
            poisoned: None,
        }
    }

    pub fn with_config(stream: S, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stream,
            config,
            poisoned: None,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// True once an earlier failure left unread frames on the channel.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn ensure_usable(&self) -> Result<()> {
        match &self.poisoned {
            Some(reason) => Err(AdbError::ChannelPoisoned(reason.clone())),
            None => Ok(()),
        }
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.breaks_framing() {
                tracing::debug!(error = %e, "sync channel abandoned");
                self.poisoned = Some(e.to_string());
            }
        }
        result
    }

    /// Read the next response. With a token, cancellation is checked before
    /// the read and also raced against it; a read interrupted halfway leaves
    /// the channel poisoned via `track`.
    async fn read_response(&mut self, cancel: Option<&CancellationToken>) -> Result<Frame> {
        let max = self.config.max_frame_size;
        match cancel {
            None => read_frame(&mut self.stream, max).await,
            Some(token) => {
                if token.is_cancelled() {
                    tracing::debug!("cancellation observed at frame boundary");
                    return Err(AdbError::Cancelled);
                }
                tokio::select! {
                    biased;
                    frame = read_frame(&mut self.stream, max) => frame,
                    _ = token.cancelled() => {
                        tracing::debug!("cancelled while awaiting a frame");
                        Err(AdbError::Cancelled)
                    }
                }
            }
        }
    }

    // =========================================================================
    // STAT
    // =========================================================================

    /// Query mode, size and mtime of a remote path.
    pub async fn stat(&mut self, path: &str) -> Result<FileStatistics> {
        self.ensure_usable()?;
        let result = self.stat_inner(path).await;
        self.track(result)
    }

    async fn stat_inner(&mut self, path: &str) -> Result<FileStatistics> {
        check_path(path)?;
        tracing::debug!(path, "stat");
        write_request(&mut self.stream, SyncCommand::Stat, path.as_bytes()).await?;

        let frame = self.read_response(None).await?;
        match frame.command {
            SyncCommand::Stat => decode_stat(path, &frame.payload),
            SyncCommand::Fail => Err(failure(&frame)),
            SyncCommand::List
            | SyncCommand::Dent
            | SyncCommand::Send
            | SyncCommand::Recv
            | SyncCommand::Data
            | SyncCommand::Done
            | SyncCommand::Okay => Err(unexpected(&frame, "reading a stat response")),
        }
    }

    // =========================================================================
    // LIST
    // =========================================================================

    /// Start listing a directory. Entries are read from the channel as the
    /// returned listing is advanced.
    pub async fn list(&mut self, path: &str) -> Result<DirectoryListing<'_, S>> {
        self.ensure_usable()?;
        let result = self.list_request(path).await;
        self.track(result)?;
        Ok(DirectoryListing {
            service: self,
            finished: false,
        })
    }

    /// List a directory and collect every entry, including `.` and `..`.
    pub async fn list_all(&mut self, path: &str) -> Result<Vec<FileStatistics>> {
        let mut listing = self.list(path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = listing.next_entry().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn list_request(&mut self, path: &str) -> Result<()> {
        check_path(path)?;
        tracing::debug!(path, "list");
        write_request(&mut self.stream, SyncCommand::List, path.as_bytes()).await
    }

    async fn next_dent(&mut self) -> Result<Option<FileStatistics>> {
        let result = self.next_dent_inner().await;
        self.track(result)
    }

    async fn next_dent_inner(&mut self) -> Result<Option<FileStatistics>> {
        let frame = self.read_response(None).await?;
        match frame.command {
            SyncCommand::Dent => decode_dent(&frame.payload).map(Some),
            // The DONE word is filler
            SyncCommand::Done => Ok(None),
            SyncCommand::Fail => Err(failure(&frame)),
            SyncCommand::Stat
            | SyncCommand::List
            | SyncCommand::Send
            | SyncCommand::Recv
            | SyncCommand::Data
            | SyncCommand::Okay => Err(unexpected(&frame, "listing a directory")),
        }
    }

    // =========================================================================
    // RECV (pull)
    // =========================================================================

    /// Copy a remote file into `sink`. Returns the number of bytes written.
    pub async fn pull<W>(
        &mut self,
        path: &str,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        self.pull_with_progress(path, sink, |_| {}, cancel).await
    }

    /// Like [`pull`](Self::pull), calling `progress` after every chunk.
    ///
    /// On cancellation or failure the sink keeps whatever was written before
    /// that point.
    pub async fn pull_with_progress<W, P>(
        &mut self,
        path: &str,
        sink: &mut W,
        mut progress: P,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
        P: FnMut(SyncProgress),
    {
        self.ensure_usable()?;
        let result = self.pull_inner(path, sink, &mut progress, cancel).await;
        if result.is_err() {
            // Hand over what arrived; the pull error wins over a flush error
            let _ = sink.flush().await;
        }
        self.track(result)
    }

    async fn pull_inner<W, P>(
        &mut self,
        path: &str,
        sink: &mut W,
        progress: &mut P,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
        P: FnMut(SyncProgress),
    {
        check_path(path)?;

        let total = if self.config.stat_before_pull {
            let stat = self.stat_inner(path).await?;
            Some(u64::from(stat.size))
        } else {
            None
        };

        tracing::debug!(path, ?total, "pull");
        write_request(&mut self.stream, SyncCommand::Recv, path.as_bytes()).await?;

        let mut transferred = 0u64;
        loop {
            let frame = self.read_response(Some(cancel)).await?;
            match frame.command {
                SyncCommand::Data => {
                    sink.write_all(&frame.payload).await?;
                    transferred += frame.payload.len() as u64;
                    progress(SyncProgress::new(transferred, total));
                }
                SyncCommand::Done => break,
                SyncCommand::Fail => return Err(failure(&frame)),
                SyncCommand::Stat
                | SyncCommand::List
                | SyncCommand::Dent
                | SyncCommand::Send
                | SyncCommand::Recv
                | SyncCommand::Okay => return Err(unexpected(&frame, "pulling a file")),
            }
        }

        sink.flush().await?;
        tracing::debug!(path, bytes = transferred, "pull complete");
        Ok(transferred)
    }

    // =========================================================================
    // SEND (push)
    // =========================================================================

    /// Upload `source` to `remote_path` with permission bits `mode`
    /// (e.g. `0o644`) and modification time `mtime`.
    pub async fn push<R>(
        &mut self,
        source: &mut R,
        remote_path: &str,
        mode: u32,
        mtime: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        self.push_with_progress(source, remote_path, mode, mtime, |_| {}, cancel)
            .await
    }

    /// Like [`push`](Self::push), calling `progress` after every chunk.
    pub async fn push_with_progress<R, P>(
        &mut self,
        source: &mut R,
        remote_path: &str,
        mode: u32,
        mtime: DateTime<Utc>,
        mut progress: P,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        P: FnMut(SyncProgress),
    {
        self.ensure_usable()?;
        let result = self
            .push_inner(source, remote_path, mode, mtime, &mut progress, cancel)
            .await;
        self.track(result)
    }

    async fn push_inner<R, P>(
        &mut self,
        source: &mut R,
        remote_path: &str,
        mode: u32,
        mtime: DateTime<Utc>,
        progress: &mut P,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        P: FnMut(SyncProgress),
    {
        check_path(remote_path)?;
        let timestamp = mtime.timestamp();
        let mtime = u32::try_from(timestamp).map_err(|_| AdbError::InvalidTimestamp(timestamp))?;

        // Permission bits travel as octal digits: 0o644 is sent as "644"
        let request = format!("{},{:o}", remote_path, mode & 0o7777);
        tracing::debug!(path = remote_path, mode = %format_args!("{:o}", mode & 0o7777), "push");
        write_request(&mut self.stream, SyncCommand::Send, request.as_bytes()).await?;

        let mut buf = vec![0u8; self.config.chunk_size];
        let mut transferred = 0u64;
        loop {
            if cancel.is_cancelled() {
                tracing::debug!(bytes = transferred, "push cancelled between chunks");
                return Err(AdbError::Cancelled);
            }
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            write_request(&mut self.stream, SyncCommand::Data, &buf[..n]).await?;
            transferred += n as u64;
            progress(SyncProgress::new(transferred, None));
        }

        write_frame(&mut self.stream, &encode_header(SyncCommand::Done, mtime)).await?;
        self.stream.flush().await?;

        // Once DONE is out the device commits the file; not cancellable
        let frame = self.read_response(None).await?;
        match frame.command {
            SyncCommand::Okay => {
                tracing::debug!(path = remote_path, bytes = transferred, "push complete");
                Ok(())
            }
            SyncCommand::Fail => Err(failure(&frame)),
            SyncCommand::Stat
            | SyncCommand::List
            | SyncCommand::Dent
            | SyncCommand::Send
            | SyncCommand::Recv
            | SyncCommand::Data
            | SyncCommand::Done => Err(unexpected(&frame, "finishing a push")),
        }
    }
}

// =============================================================================
// Directory listing
// =============================================================================

/// An in-progress LIST exchange.
///
/// Yields entries in the order the device sent them and ends at DONE. Dropping
/// it early leaves DENT frames unread, so the channel is marked unusable.
pub struct DirectoryListing<'a, S> {
    service: &'a mut SyncService<S>,
    finished: bool,
}

impl<'a, S> DirectoryListing<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn next_entry(&mut self) -> Result<Option<FileStatistics>> {
        if self.finished {
            return Ok(None);
        }
        let result = self.service.next_dent().await;
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<FileStatistics>> + 'a {
        stream::try_unfold(self, |mut listing| async move {
            let entry = listing.next_entry().await?;
            Ok::<_, AdbError>(entry.map(|entry| (entry, listing)))
        })
    }
}

impl<S> Drop for DirectoryListing<'_, S> {
    fn drop(&mut self) {
        if !self.finished && self.service.poisoned.is_none() {
            self.service.poisoned = Some("directory listing dropped before DONE".to_string());
        }
    }
}
