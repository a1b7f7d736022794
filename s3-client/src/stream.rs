//! Streaming adapters between HTTP bodies and files or memory buffers.
//!
//! Files are accessed exclusively with positional I/O (`read_at` /
//! `write_all_at`) so the caller's file cursor is never moved, and
//! concurrent requests may safely share one underlying file provided their
//! byte ranges do not overlap.

use std::{
    fs::File,
    io,
    os::unix::fs::FileExt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use futures::stream::Stream;

/// Chunk size for reading upload bodies out of files.
pub(crate) const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Minimum capacity of a response buffer; growth doubles from here.
pub(crate) const MEM_BUF_MIN_CAPACITY: usize = 8 * 1024;

// --- read side --- //

/// Where an outgoing request body comes from.
pub(crate) enum ReadSource {
    /// No body.
    None,
    /// Positional reads from a file, starting at `offset`, exactly `len`
    /// bytes. The handle is a duplicate of the caller's.
    File {
        file: Arc<File>,
        offset: u64,
        len: u64,
    },
    /// An owned in-memory body, sent with a known length.
    Mem { buf: Bytes },
}

impl ReadSource {
    /// The declared upload length.
    pub(crate) fn len(&self) -> u64 {
        match self {
            Self::None => 0,
            Self::File { len, .. } => *len,
            Self::Mem { buf } => buf.len() as u64,
        }
    }
}

/// A stream of body chunks read positionally out of `file`, bounded by
/// `len` bytes from `offset`. Each accepted chunk advances `counter`; a
/// short read (EOF before `len`) ends the stream early.
pub(crate) fn file_chunks(
    file: Arc<File>,
    offset: u64,
    len: u64,
    counter: Arc<AtomicU64>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    futures::stream::try_unfold(0u64, move |sent| {
        let file = Arc::clone(&file);
        let counter = Arc::clone(&counter);
        async move {
            if sent >= len {
                return Ok::<Option<(Bytes, u64)>, io::Error>(None);
            }
            let want = (len - sent).min(FILE_CHUNK_SIZE as u64) as usize;
            let pos = offset + sent;

            // Hop to the blocking pool so a slow disk doesn't stall the
            // worker's other in-flight requests.
            let chunk = tokio::task::spawn_blocking(move || {
                let mut buf = vec![0u8; want];
                let n = read_at_retry(&file, &mut buf, pos)?;
                buf.truncate(n);
                Ok::<Vec<u8>, io::Error>(buf)
            })
            .await
            .map_err(io::Error::other)??;

            if chunk.is_empty() {
                return Ok(None);
            }
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            let next = sent + chunk.len() as u64;
            Ok(Some((Bytes::from(chunk), next)))
        }
    })
}

/// `read_at`, retrying on interruption.
fn read_at_retry(file: &File, buf: &mut [u8], pos: u64) -> io::Result<usize> {
    loop {
        match file.read_at(buf, pos) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

// --- write side --- //

/// Where incoming response body bytes go.
pub(crate) enum WriteSink {
    /// Bytes are discarded; only the transfer count is kept.
    Discard,
    /// Positional writes into a file starting at `offset`. The handle is a
    /// duplicate of the caller's.
    File { file: Arc<File>, offset: u64 },
    /// Bytes accumulate in an owned buffer.
    Mem { buf: MemBuf },
}

impl WriteSink {
    /// Accept one chunk at logical position `pos` (bytes already written).
    pub(crate) async fn accept(&mut self, chunk: Bytes, pos: u64) -> io::Result<()> {
        match self {
            Self::Discard => Ok(()),
            Self::Mem { buf } => {
                buf.append(&chunk);
                Ok(())
            }
            Self::File { file, offset } => {
                let file = Arc::clone(file);
                let at = *offset + pos;
                // write_all_at loops over partial writes and interruption.
                tokio::task::spawn_blocking(move || file.write_all_at(&chunk, at))
                    .await
                    .map_err(io::Error::other)?
            }
        }
    }
}

/// A growable response buffer. Capacity doubles from a floor of
/// [`MEM_BUF_MIN_CAPACITY`] so that typical XML responses settle after one
/// or two grows.
#[derive(Default)]
pub(crate) struct MemBuf {
    data: Vec<u8>,
}

impl MemBuf {
    pub(crate) fn append(&mut self, chunk: &[u8]) {
        let need = self.data.len() + chunk.len();
        if need > self.data.capacity() {
            let mut cap = self.data.capacity().max(MEM_BUF_MIN_CAPACITY);
            while cap < need {
                cap *= 2;
            }
            self.data.reserve_exact(cap - self.data.len());
        }
        self.data.extend_from_slice(chunk);
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.data
    }
}
