// dbcapture/src/backup/progress.rs
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Observer of cumulative bytes handed to the object store.
///
/// Counts reads, not bytes on the wire. Objects small enough for a single
/// PUT are read whole before the request is sent, so the bar jumps straight
/// to 100% and then waits on the network.
pub trait ProgressSink: Send + Sync {
    fn update(&self, transferred: u64);
    fn finish(&self) {}
    fn abandon(&self) {}
}

/// Sink that ignores every update.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&self, _transferred: u64) {}
}

/// Terminal progress bar; hidden when progress display is off.
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    pub fn new(total: u64, visible: bool, label: &str) -> Self {
        if !visible {
            return BarSink {
                bar: ProgressBar::hidden(),
            };
        }
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template(
            " {msg} [{elapsed_precise}] [{wide_bar}] {bytes}/{total_bytes} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        BarSink { bar }
    }
}

impl ProgressSink for BarSink {
    fn update(&self, transferred: u64) {
        self.bar.set_position(transferred);
    }

    fn finish(&self) {
        self.bar.finish();
    }

    fn abandon(&self) {
        self.bar.abandon();
    }
}

/// Re-seekable view over the artifact file.
///
/// Only random-offset reads are counted: those are what the object store
/// uses to fetch parts. Position is never reset implicitly; callers seek
/// to the start and attach a fresh sink before each upload pass.
pub struct ProgressByteSource {
    file: File,
    transferred: AtomicU64,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressByteSource {
    pub fn new(file: File) -> Self {
        ProgressByteSource {
            file,
            transferred: AtomicU64::new(0),
            sink: Arc::new(NullSink),
        }
    }

    /// Starts a new pass with a zeroed counter reporting to `sink`.
    pub fn attach(&mut self, sink: Arc<dyn ProgressSink>) {
        self.transferred = AtomicU64::new(0);
        self.sink = sink;
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::SeqCst)
    }

    /// Reads at `offset` without touching the sequential position.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let n = positioned_read(&self.file, buf, offset)?;
        if n > 0 {
            let total = self.transferred.fetch_add(n as u64, Ordering::SeqCst) + n as u64;
            self.sink.update(total);
        }
        Ok(n)
    }

    /// Fills `buf` from `offset`, failing on a short file.
    pub fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "artifact ended before the expected size",
                    ))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Read for ProgressByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for ProgressByteSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

#[cfg(unix)]
fn positioned_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn positioned_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}
