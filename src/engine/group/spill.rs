use std::fmt::Debug;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::engine::comm::{FrameWriter, ProtocolGuard, WriterState};
use crate::engine::errors::FlowError;
use crate::shared::storage_header::{BinaryHeader, FileKind, MagicFile};

/// Sequential-append, sequential-read storage for spill runs.
pub trait SpillStore: Send + Sync + Debug {
    /// Reserves a fresh location for a run. Nothing is created yet.
    fn create(&self, label: &str) -> Result<PathBuf, FlowError>;

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FlowError>;

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, FlowError>;

    /// Removes a run. Deleting a run that does not exist is not an error.
    fn delete(&self, path: &Path) -> Result<(), FlowError>;
}

/// Run sequence shared by every store in the process.
static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Attempts at finding an unused run name before giving up.
const CREATE_ATTEMPTS: usize = 8;

struct SpillRunFormat;

impl MagicFile for SpillRunFormat {
    const MAGIC: [u8; 8] = FileKind::SpillRun.magic();
}

/// Spill runs as files in one directory, each starting with a CRC'd
/// [`BinaryHeader`].
///
/// Run names combine the pid, a per-store nonce and a process-wide
/// sequence, so stores sharing a directory never hand out the same path.
#[derive(Debug)]
pub struct FileSpillStore {
    dir: PathBuf,
    nonce: u64,
}

impl FileSpillStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, FlowError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Ok(Self {
            dir,
            nonce: nanos ^ RUN_SEQ.fetch_add(1, Ordering::Relaxed).rotate_left(32),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SpillStore for FileSpillStore {
    fn create(&self, label: &str) -> Result<PathBuf, FlowError> {
        let id = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}-{}-{:x}-{:06}.run",
            label,
            std::process::id(),
            self.nonce,
            id
        );
        Ok(self.dir.join(name))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn Write + Send>, FlowError> {
        let file = SpillRunFormat::create_with_header(path, 0)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>, FlowError> {
        let (file, _header) = SpillRunFormat::open_with_header(path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn delete(&self, path: &Path) -> Result<(), FlowError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// A finished spill run. The backing file is deleted when the handle is
/// dropped.
#[derive(Debug)]
pub struct RunFile {
    store: Arc<dyn SpillStore>,
    path: PathBuf,
    frames: u64,
    bytes: u64,
    /// Set once this handle created the file; only then is it deleted.
    created: bool,
}

impl RunFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Payload bytes, header and length prefixes excluded.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn open_reader(&self) -> Result<RunFileReader, FlowError> {
        Ok(RunFileReader {
            input: self.store.open_read(&self.path)?,
            remaining: self.frames,
        })
    }
}

impl Drop for RunFile {
    fn drop(&mut self) {
        if !self.created {
            return;
        }
        if let Err(err) = self.store.delete(&self.path) {
            warn!(
                target: "frameflow::spill",
                path = %self.path.display(), error = %err,
                "Failed to delete spill run"
            );
        }
    }
}

/// Writes frames into a new run, each prefixed with its big-endian `u32`
/// length.
///
/// The run is deleted unless the writer is closed cleanly and turned into
/// a [`RunFile`] with [`RunFileWriter::into_run`].
pub struct RunFileWriter {
    run: RunFile,
    label: String,
    output: Option<Box<dyn Write + Send>>,
    guard: ProtocolGuard,
    completed: bool,
}

impl RunFileWriter {
    pub fn create(store: &Arc<dyn SpillStore>, label: &str) -> Result<Self, FlowError> {
        let path = store.create(label)?;
        Ok(Self {
            run: RunFile {
                store: Arc::clone(store),
                path,
                frames: 0,
                bytes: 0,
                created: false,
            },
            label: label.to_string(),
            output: None,
            guard: ProtocolGuard::new("run writer"),
            completed: false,
        })
    }

    pub fn path(&self) -> &Path {
        self.run.path()
    }

    pub fn into_run(self) -> Result<RunFile, FlowError> {
        if !self.completed {
            return Err(FlowError::usage(format!(
                "run writer turned into a run while {}",
                self.guard.state()
            )));
        }
        Ok(self.run)
    }
}

impl FrameWriter for RunFileWriter {
    fn open(&mut self) -> Result<(), FlowError> {
        self.guard.on_open()?;
        let mut attempt = 1;
        let output = loop {
            match self.run.store.open_write(&self.run.path) {
                Ok(output) => break output,
                Err(FlowError::Io(err))
                    if err.kind() == io::ErrorKind::AlreadyExists && attempt < CREATE_ATTEMPTS =>
                {
                    warn!(
                        target: "frameflow::spill",
                        path = %self.run.path.display(),
                        "Spill run name taken, picking another"
                    );
                    self.run.path = self.run.store.create(&self.label)?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };
        self.run.created = true;
        self.output = Some(output);
        debug!(target: "frameflow::spill", path = %self.run.path.display(), "Opened spill run");
        Ok(())
    }

    fn next_frame(&mut self, frame: &[u8]) -> Result<(), FlowError> {
        self.guard.on_next_frame()?;
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| FlowError::usage("run writer has no open output"))?;
        let len = u32::try_from(frame.len())
            .map_err(|_| FlowError::invalid_data("frame too large for a spill run"))?;
        output.write_all(&len.to_be_bytes())?;
        output.write_all(frame)?;
        self.run.frames += 1;
        self.run.bytes += frame.len() as u64;
        Ok(())
    }

    fn fail(&mut self) -> Result<(), FlowError> {
        if self.guard.on_fail() {
            self.output = None;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), FlowError> {
        let Some(previous) = self.guard.on_close() else {
            return Ok(());
        };
        if let Some(mut output) = self.output.take() {
            if previous == WriterState::Open {
                output.flush()?;
                self.completed = true;
            }
        }
        Ok(())
    }
}

/// Reads a run's frames back in write order.
pub struct RunFileReader {
    input: Box<dyn Read + Send>,
    remaining: u64,
}

impl RunFileReader {
    /// Reads the next frame into `buf`. Returns `false` at end of run.
    pub fn read_frame(&mut self, buf: &mut Vec<u8>) -> Result<bool, FlowError> {
        if self.remaining == 0 {
            return Ok(false);
        }
        let mut len = [0u8; 4];
        self.input.read_exact(&mut len)?;
        let len = u32::from_be_bytes(len) as usize;
        buf.resize(len, 0);
        self.input.read_exact(buf)?;
        self.remaining -= 1;
        Ok(true)
    }
}

/// Size of the fixed header every run starts with.
pub const RUN_HEADER_LEN: usize = BinaryHeader::TOTAL_LEN;
