use parking_lot::{Mutex, MutexGuard};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::sync::Arc;

/// A seekable octet source backing one message and all of its part views.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// Shared handle to the backing stream. Part views hold clones of this
/// handle; a mutation swaps the boxed stream for a freshly built one and
/// the owning message drops its memoized part views.
#[derive(Clone)]
pub struct SharedStream(Arc<Mutex<Box<dyn ReadSeek>>>);

impl SharedStream {
    pub fn new(stream: Box<dyn ReadSeek>) -> Self {
        Self(Arc::new(Mutex::new(stream)))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn ReadSeek>> {
        self.0.lock()
    }

    pub(crate) fn replace(&self, stream: Box<dyn ReadSeek>) {
        *self.0.lock() = stream;
    }

    /// Read the entire stream starting at `start`, bounded by `end`.
    pub fn read_range(&self, start: u64, end: Option<u64>) -> std::io::Result<Vec<u8>> {
        let mut guard = self.lock();
        guard.seek(SeekFrom::Start(start))?;
        let mut out = Vec::new();
        guard.read_to_end(&mut out)?;
        if let Some(end) = end {
            out.truncate(end.saturating_sub(start) as usize);
        }
        Ok(out)
    }
}

/// Line-at-a-time reader over the shared stream, positioned at `start`.
/// Lines are returned with their terminator included, as read.
pub(crate) struct LineReader<'a> {
    inner: BufReader<&'a mut dyn ReadSeek>,
}

impl<'a> LineReader<'a> {
    pub(crate) fn new(stream: &'a mut dyn ReadSeek, start: u64) -> std::io::Result<Self> {
        stream.seek(SeekFrom::Start(start))?;
        Ok(Self {
            inner: BufReader::new(stream),
        })
    }

    pub(crate) fn next_line(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf))
    }
}
