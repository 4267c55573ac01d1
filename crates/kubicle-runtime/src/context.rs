// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Streaming tar build contexts.
//!
//! [`stream_tar`] walks a directory on a blocking worker and feeds the
//! archive through a bounded channel, so the consumer can upload it while
//! it is still being produced and never holds the whole archive in memory.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tar::{Builder, Header, HeaderMode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::BuildContextError;

/// Size of each chunk handed to the consumer.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Number of chunks the producer may run ahead of the consumer.
pub const CHANNEL_DEPTH: usize = 4;

enum Frame {
	Data(Bytes),
	Done,
	Failed(BuildContextError),
}

/// A tar archive of a directory, produced concurrently with its consumption.
///
/// Yields archive chunks in order. A producer failure arrives as a single
/// terminal `Err` after every chunk written before it. Dropping the context
/// stops the producer.
pub struct BuildContext {
	rx: mpsc::Receiver<Frame>,
	cancel: CancellationToken,
	finished: bool,
}

impl BuildContext {
	/// Asks the producer to stop. Chunks already queued are still delivered.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Reads the whole archive into memory.
	pub async fn collect_bytes(mut self) -> Result<Vec<u8>, BuildContextError> {
		let mut archive = Vec::new();
		while let Some(chunk) = self.next().await {
			archive.extend_from_slice(&chunk?);
		}
		Ok(archive)
	}
}

impl Stream for BuildContext {
	type Item = Result<Bytes, BuildContextError>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		if self.finished {
			return Poll::Ready(None);
		}
		match self.rx.poll_recv(cx) {
			Poll::Pending => Poll::Pending,
			Poll::Ready(Some(Frame::Data(chunk))) => Poll::Ready(Some(Ok(chunk))),
			Poll::Ready(Some(Frame::Done)) => {
				self.finished = true;
				Poll::Ready(None)
			}
			Poll::Ready(Some(Frame::Failed(err))) => {
				self.finished = true;
				Poll::Ready(Some(Err(err)))
			}
			Poll::Ready(None) => {
				self.finished = true;
				Poll::Ready(Some(Err(BuildContextError::Interrupted)))
			}
		}
	}
}

impl Drop for BuildContext {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

impl std::fmt::Debug for BuildContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BuildContext")
			.field("finished", &self.finished)
			.field("cancelled", &self.cancel.is_cancelled())
			.finish()
	}
}

/// Starts archiving `root` and returns the consumer side.
///
/// Only regular files are archived, named relative to `root` and visited
/// in file-name order. Directories, symlinks and special files are skipped.
/// Must be called from within a Tokio runtime.
pub fn stream_tar(root: impl Into<PathBuf>) -> BuildContext {
	let root = root.into();
	let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
	let cancel = CancellationToken::new();
	let token = cancel.clone();

	tokio::task::spawn_blocking(move || {
		let writer = ChannelWriter::new(tx.clone(), token.clone());
		match write_archive(&root, writer, &token) {
			Ok(()) => debug!(root = %root.display(), "Build context complete"),
			Err(err) => {
				debug!(root = %root.display(), error = %err, "Build context failed");
				let _ = tx.blocking_send(Frame::Failed(err));
			}
		}
	});

	BuildContext {
		rx,
		cancel,
		finished: false,
	}
}

fn write_archive(
	root: &Path,
	writer: ChannelWriter,
	cancel: &CancellationToken,
) -> Result<(), BuildContextError> {
	let mut builder = Builder::new(writer);

	for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
		if cancel.is_cancelled() {
			return Err(BuildContextError::Cancelled);
		}

		let entry = entry.map_err(|err| BuildContextError::Walk {
			path: err.path().unwrap_or(root).to_path_buf(),
			source: err.into(),
		})?;

		if !entry.file_type().is_file() {
			trace!(path = %entry.path().display(), "Skipping non-regular entry");
			continue;
		}

		let name = archive_name(root, entry.path());
		append_file(&mut builder, entry.path(), &name, cancel)?;
	}

	let writer = builder.into_inner().map_err(|err| {
		if cancel.is_cancelled() {
			BuildContextError::Cancelled
		} else {
			BuildContextError::Archive(err)
		}
	})?;
	writer.finish()
}

/// Path of `path` inside the archive, with the root prefix removed.
fn archive_name(root: &Path, path: &Path) -> PathBuf {
	match path.strip_prefix(root) {
		Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
		// The root itself is a file.
		_ => path
			.file_name()
			.map(PathBuf::from)
			.unwrap_or_else(|| path.to_path_buf()),
	}
}

fn append_file(
	builder: &mut Builder<ChannelWriter>,
	path: &Path,
	name: &Path,
	cancel: &CancellationToken,
) -> Result<(), BuildContextError> {
	let read_err = |source| BuildContextError::Read {
		path: path.to_path_buf(),
		source,
	};

	let file = File::open(path).map_err(read_err)?;
	let metadata = file.metadata().map_err(read_err)?;

	let mut header = Header::new_gnu();
	header.set_metadata_in_mode(&metadata, HeaderMode::Complete);

	let reader = ExactReader {
		inner: file,
		remaining: metadata.len(),
	};
	builder
		.append_data(&mut header, name, reader)
		.map_err(|source| {
			if cancel.is_cancelled() || builder.get_ref().is_closed() {
				BuildContextError::Cancelled
			} else {
				read_err(source)
			}
		})
}

/// Reads exactly the size recorded in the header, failing if the file shrank.
struct ExactReader {
	inner: File,
	remaining: u64,
}

impl Read for ExactReader {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if self.remaining == 0 {
			return Ok(0);
		}
		let limit = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
		let n = self.inner.read(&mut buf[..limit])?;
		if n == 0 {
			return Err(io::Error::new(
				io::ErrorKind::UnexpectedEof,
				"file shrank while being archived",
			));
		}
		self.remaining -= n as u64;
		Ok(n)
	}
}

/// Blocking writer that forwards fixed-size chunks into the channel.
struct ChannelWriter {
	tx: mpsc::Sender<Frame>,
	cancel: CancellationToken,
	buf: Vec<u8>,
}

impl ChannelWriter {
	fn new(tx: mpsc::Sender<Frame>, cancel: CancellationToken) -> Self {
		Self {
			tx,
			cancel,
			buf: Vec::with_capacity(CHUNK_SIZE),
		}
	}

	fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}

	fn send_chunk(&mut self) -> io::Result<()> {
		if self.buf.is_empty() {
			return Ok(());
		}
		let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
		self.tx
			.blocking_send(Frame::Data(Bytes::from(chunk)))
			.map_err(|_| {
				io::Error::new(io::ErrorKind::BrokenPipe, "build context consumer dropped")
			})
	}

	fn finish(mut self) -> Result<(), BuildContextError> {
		self.send_chunk().map_err(|_| BuildContextError::Cancelled)?;
		self.tx
			.blocking_send(Frame::Done)
			.map_err(|_| BuildContextError::Cancelled)
	}
}

impl Write for ChannelWriter {
	fn write(&mut self, data: &[u8]) -> io::Result<usize> {
		if self.cancel.is_cancelled() {
			return Err(io::Error::other("build context cancelled"));
		}
		let n = data.len().min(CHUNK_SIZE - self.buf.len());
		self.buf.extend_from_slice(&data[..n]);
		if self.buf.len() >= CHUNK_SIZE {
			self.send_chunk()?;
		}
		Ok(n)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.send_chunk()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	fn entries(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
		let mut out = Vec::new();
		let mut reader = tar::Archive::new(archive);
		for entry in reader.entries().unwrap() {
			let mut entry = entry.unwrap();
			let name = entry.path().unwrap().to_string_lossy().into_owned();
			let mut content = Vec::new();
			entry.read_to_end(&mut content).unwrap();
			out.push((name, content));
		}
		out
	}

	#[tokio::test]
	async fn archives_regular_files_relative_to_root() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("a"), b"alpha").unwrap();
		fs::create_dir(dir.path().join("sub")).unwrap();
		fs::write(dir.path().join("sub").join("b"), b"beta").unwrap();

		let archive = stream_tar(dir.path()).collect_bytes().await.unwrap();

		assert_eq!(
			entries(&archive),
			vec![
				("a".to_string(), b"alpha".to_vec()),
				("sub/b".to_string(), b"beta".to_vec()),
			]
		);
	}

	#[tokio::test]
	async fn empty_directory_yields_valid_empty_archive() {
		let dir = TempDir::new().unwrap();
		fs::create_dir(dir.path().join("nested")).unwrap();

		let archive = stream_tar(dir.path()).collect_bytes().await.unwrap();

		assert!(entries(&archive).is_empty());
		assert!(!archive.is_empty());
	}

	#[tokio::test]
	async fn large_file_spans_many_chunks() {
		let dir = TempDir::new().unwrap();
		let payload: Vec<u8> = (0..(CHUNK_SIZE * 5 + 17)).map(|i| (i % 251) as u8).collect();
		fs::write(dir.path().join("blob.bin"), &payload).unwrap();

		let mut context = stream_tar(dir.path());
		let mut chunks = 0;
		let mut archive = Vec::new();
		while let Some(chunk) = context.next().await {
			let chunk = chunk.unwrap();
			assert!(chunk.len() <= CHUNK_SIZE);
			archive.extend_from_slice(&chunk);
			chunks += 1;
		}

		assert!(chunks > 5);
		assert_eq!(entries(&archive), vec![("blob.bin".to_string(), payload)]);
	}

	#[tokio::test]
	async fn missing_root_ends_with_walk_error() {
		let dir = TempDir::new().unwrap();
		let missing = dir.path().join("does-not-exist");

		let err = stream_tar(&missing).collect_bytes().await.unwrap_err();

		assert!(matches!(err, BuildContextError::Walk { .. }), "got {err:?}");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn unreadable_file_ends_with_read_error() {
		use std::os::unix::fs::PermissionsExt;

		let dir = TempDir::new().unwrap();
		let locked = dir.path().join("locked");
		fs::write(&locked, b"secret").unwrap();
		fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
		if File::open(&locked).is_ok() {
			// Running as root; permissions are not enforced.
			return;
		}

		let err = stream_tar(dir.path()).collect_bytes().await.unwrap_err();

		match err {
			BuildContextError::Read { path, .. } => assert_eq!(path, locked),
			other => panic!("expected read error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn file_removed_mid_stream_ends_with_read_error() {
		let dir = TempDir::new().unwrap();
		let big = vec![7u8; CHUNK_SIZE * 16];
		fs::write(dir.path().join("a-big"), &big).unwrap();
		let late = dir.path().join("b-late");
		fs::write(&late, b"gone before it is read").unwrap();

		let mut context = stream_tar(dir.path());
		let first = context.next().await.unwrap().unwrap();
		assert!(!first.is_empty());
		// The producer is still inside a-big; b-late is already listed.
		fs::remove_file(&late).unwrap();

		let mut data_chunks = 1;
		let err = loop {
			match context.next().await {
				Some(Ok(_)) => data_chunks += 1,
				Some(Err(err)) => break err,
				None => panic!("archive completed without b-late"),
			}
		};

		assert!(data_chunks >= 16);
		match err {
			BuildContextError::Read { path, source } => {
				assert_eq!(path, late);
				assert_eq!(source.kind(), io::ErrorKind::NotFound);
			}
			other => panic!("expected read error, got {other:?}"),
		}
		assert!(context.next().await.is_none());
	}

	#[test]
	fn short_file_is_unexpected_eof() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("short");
		fs::write(&path, b"abc").unwrap();

		let mut reader = ExactReader {
			inner: File::open(&path).unwrap(),
			remaining: 10,
		};
		let mut out = Vec::new();
		let err = reader.read_to_end(&mut out).unwrap_err();

		assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
		assert_eq!(out, b"abc");
	}

	#[test]
	fn exact_reader_stops_at_recorded_size() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("grown");
		fs::write(&path, b"abcdef").unwrap();

		let mut reader = ExactReader {
			inner: File::open(&path).unwrap(),
			remaining: 4,
		};
		let mut out = Vec::new();
		reader.read_to_end(&mut out).unwrap();

		assert_eq!(out, b"abcd");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn symlinks_are_skipped() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("target"), b"data").unwrap();
		std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link")).unwrap();

		let archive = stream_tar(dir.path()).collect_bytes().await.unwrap();

		let names: Vec<_> = entries(&archive).into_iter().map(|(n, _)| n).collect();
		assert_eq!(names, vec!["target".to_string()]);
	}

	#[tokio::test]
	async fn cancel_stops_producer() {
		let dir = TempDir::new().unwrap();
		for i in 0..64 {
			fs::write(dir.path().join(format!("file-{i:03}")), vec![7u8; CHUNK_SIZE]).unwrap();
		}

		let mut context = stream_tar(dir.path());
		let first = context.next().await.unwrap();
		assert!(first.is_ok());
		context.cancel();

		let mut saw_cancel = false;
		while let Some(item) = context.next().await {
			if let Err(err) = item {
				assert!(matches!(err, BuildContextError::Cancelled), "got {err:?}");
				saw_cancel = true;
			}
		}
		assert!(saw_cancel);
	}

	#[tokio::test]
	async fn dropping_context_releases_producer() {
		let dir = TempDir::new().unwrap();
		for i in 0..32 {
			fs::write(dir.path().join(format!("file-{i:03}")), vec![1u8; CHUNK_SIZE]).unwrap();
		}

		let mut context = stream_tar(dir.path());
		let _ = context.next().await;
		let token = context.cancel.clone();
		drop(context);

		assert!(token.is_cancelled());
	}

	#[test]
	fn archive_name_strips_root() {
		let root = Path::new("/ctx");
		assert_eq!(archive_name(root, Path::new("/ctx/sub/b")), PathBuf::from("sub/b"));
		assert_eq!(
			archive_name(Path::new("/ctx/file"), Path::new("/ctx/file")),
			PathBuf::from("file")
		);
	}
}
