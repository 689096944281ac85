//! Append-only commit log.
//!
//! Each committed transaction is written as one record so a replay never
//! applies half a transaction:
//!
//! ```text
//! record  op_count:u32 op*
//! op      0x00 key_len:u32 key value_len:u32 value   (put)
//!         0x01 key_len:u32 key                       (delete)
//! ```
//!
//! A record cut short by a crash is dropped on replay and the file is
//! truncated back to the last complete record.

use super::{Result, StorageOp};
use crate::config::{SyncMode, SyncPolicy};
use crate::error::StoreError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const OP_PUT: u8 = 0;
const OP_DELETE: u8 = 1;

const SCRATCH_INITIAL_CAPACITY: usize = 8 * 1024;
const SCRATCH_SHRINK_THRESHOLD: usize = 1 << 20;
const SYNC_INTERVAL: Duration = Duration::from_secs(1);

pub struct CommitLog {
    file: File,
    writer: BufWriter<File>,
    path: PathBuf,
    size: u64,
    scratch: BytesMut,
    last_sync: Instant,
}

impl CommitLog {
    /// Open or create the log at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let size = file.metadata()?.len();
        let writer = BufWriter::new(file.try_clone()?);

        Ok(CommitLog {
            file,
            writer,
            path,
            size,
            scratch: BytesMut::with_capacity(SCRATCH_INITIAL_CAPACITY),
            last_sync: Instant::now(),
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one committed batch.
    pub fn append(&mut self, ops: &[StorageOp]) -> Result<()> {
        let len = self.serialize_batch(ops);
        self.writer.write_all(&self.scratch[..len])?;
        self.size += len as u64;

        if self.scratch.capacity() > SCRATCH_SHRINK_THRESHOLD && len <= SCRATCH_INITIAL_CAPACITY {
            self.scratch = BytesMut::with_capacity(SCRATCH_INITIAL_CAPACITY);
        }
        Ok(())
    }

    fn serialize_batch(&mut self, ops: &[StorageOp]) -> usize {
        let needed = 4 + ops
            .iter()
            .map(|op| match op {
                StorageOp::Put { key, value } => 1 + 4 + key.len() + 4 + value.len(),
                StorageOp::Delete { key } => 1 + 4 + key.len(),
            })
            .sum::<usize>();

        self.scratch.clear();
        self.scratch.reserve(needed);
        let buf = &mut self.scratch;

        buf.put_u32(ops.len() as u32);
        for op in ops {
            match op {
                StorageOp::Put { key, value } => {
                    buf.put_u8(OP_PUT);
                    buf.put_u32(key.len() as u32);
                    buf.put_slice(key);
                    buf.put_u32(value.len() as u32);
                    buf.put_slice(value);
                }
                StorageOp::Delete { key } => {
                    buf.put_u8(OP_DELETE);
                    buf.put_u32(key.len() as u32);
                    buf.put_slice(key);
                }
            }
        }
        buf.len()
    }

    /// Read back every complete batch in commit order.
    pub fn replay(&mut self) -> Result<Vec<Vec<StorageOp>>> {
        self.writer.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::with_capacity(self.size as usize);
        self.file.read_to_end(&mut raw)?;

        let total = raw.len();
        let mut cursor = &raw[..];
        let mut batches = Vec::new();

        while cursor.has_remaining() {
            let before = cursor.remaining();
            match read_batch(&mut cursor) {
                Ok(batch) => batches.push(batch),
                Err(StoreError::UnexpectedEof) => {
                    let good = (total - before) as u64;
                    log::warn!(
                        "Dropping torn commit log tail in {}: {} trailing bytes",
                        self.path.display(),
                        before
                    );
                    self.file.set_len(good)?;
                    self.size = good;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(batches)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and sync using the provided mode.
    pub fn sync_with_mode(&mut self, mode: SyncMode) -> Result<()> {
        self.writer.flush()?;
        match mode {
            SyncMode::All => self.file.sync_all()?,
            SyncMode::Data => self.file.sync_data()?,
        }
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Make the latest append durable according to `policy`.
    pub fn sync_for_policy(&mut self, policy: SyncPolicy, mode: SyncMode) -> Result<()> {
        match policy {
            SyncPolicy::Always => self.sync_with_mode(mode),
            SyncPolicy::EverySecond if self.last_sync.elapsed() >= SYNC_INTERVAL => {
                self.sync_with_mode(mode)
            }
            SyncPolicy::EverySecond | SyncPolicy::Never => self.flush(),
        }
    }
}

impl Drop for CommitLog {
    fn drop(&mut self) {
        // best effort
        let _ = self.writer.flush();
    }
}

fn read_batch(cursor: &mut &[u8]) -> Result<Vec<StorageOp>> {
    let count = read_u32(cursor)? as usize;
    let mut ops = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        if !cursor.has_remaining() {
            return Err(StoreError::UnexpectedEof);
        }
        let op = match cursor.get_u8() {
            OP_PUT => {
                let key = read_bytes(cursor)?;
                let value = read_bytes(cursor)?;
                StorageOp::Put { key, value }
            }
            OP_DELETE => StorageOp::Delete {
                key: read_bytes(cursor)?,
            },
            _ => return Err(StoreError::InvalidFormat),
        };
        ops.push(op);
    }
    Ok(ops)
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32> {
    if cursor.remaining() < 4 {
        return Err(StoreError::UnexpectedEof);
    }
    Ok(cursor.get_u32())
}

fn read_bytes(cursor: &mut &[u8]) -> Result<Bytes> {
    let len = read_u32(cursor)? as usize;
    if cursor.remaining() < len {
        return Err(StoreError::UnexpectedEof);
    }
    Ok(cursor.copy_to_bytes(len))
}
