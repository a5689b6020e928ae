//! Feed the scanner with file data through two alternating buffers.
//!
//! [`FileReader`] owns an open file and two page-aligned buffers of equal
//! size. Buffers are handed out with [`FileReader::acquire_next`] in file
//! order and come back with [`FileReader::release`]; releasing the oldest
//! buffer synchronously refills it with the next block of the file, so a
//! consumer that keeps one buffer in flight always finds the following one
//! already loaded. At most two buffers can be held at a time, which is
//! exactly what the scanner needs for a token straddling one buffer
//! boundary.

use crate::error::ScanError;
use std::cmp;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// This is the type used to count bytes of the underlying file. File
/// offsets and the file size are measured in it, independently of the
/// pointer width of the host.
pub type ByteCounter = u64;

/// The assumed size of one memory page in bytes. The reader's total buffer
/// size is rounded up to a multiple of twice this value so that each of
/// the two buffers stays page-aligned. Depending on the hardware the real
/// page is `n * 4096` bytes; 4096 divides all of them.
#[cfg(not(test))]
pub(crate) const PAGE_SIZE: usize = 4096;

/// Tiny page so unit tests can drive buffer boundaries with short inputs.
#[cfg(test)]
pub(crate) const PAGE_SIZE: usize = 0x10;

/// Default total buffer size in bytes (both buffers together).
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 4096;

/// Fallback OS error code when a failed read does not report one.
const GENERIC_IO_ERROR: i32 = 5;

/// The file handle the reader pulls its bytes from.
///
/// `std::fs::File` implements this with positioned reads; tests plug in
/// in-memory sources and failure-injecting doubles instead.
pub trait SourceFile {
    /// Size of the stream in bytes, determined once at open time. The
    /// reader assumes it does not shrink afterwards.
    fn size(&self) -> io::Result<u64>;

    /// Reads into `buf` starting at `offset`, returning the number of
    /// bytes read. May short-read; the reader loops until the request is
    /// satisfied or the stream ends.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

impl SourceFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        FileExt::read_at(self, buf, offset)
    }
}

/// One of the two buffers: fixed-capacity storage plus the number of
/// valid bytes the last fill placed into it.
struct Buffer {
    data: Box<[u8]>,
    len: usize,
}

impl Buffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

/// Reads file data into two alternating, equally sized buffers.
///
/// For every [`acquire_next`](Self::acquire_next) call one
/// [`release`](Self::release) call, always freeing the oldest held
/// buffer. [`unread`](Self::unread) takes back the most recent delivery so
/// the next acquire returns the same slice again.
pub struct FileReader {
    /// Status of the last read access to the file. Once nonzero, no more
    /// syscall is made; every `acquire_next` returns the code again.
    ioerror: i32,

    /// The number of buffered bytes not yet handed out by
    /// `acquire_next`.
    unread_bytes: usize,

    /// Index of the buffer that is delivered by the next call to
    /// `acquire_next`.
    next_index: usize,

    /// Number of buffers not currently held by the consumer, 0 to 2.
    free_buffers: usize,

    /// Size of the most recently delivered slice. Needed by `unread` to
    /// restore `unread_bytes`.
    last_delivered: usize,

    /// True while the most recent operation was a successful
    /// `acquire_next`, i.e. while `unread` can still take it back.
    can_unread: bool,

    /// Offset into the file where the next read operation begins.
    file_offset: ByteCounter,

    /// The size of the file as seen at open time.
    file_size: ByteCounter,

    /// The open file the bytes come from.
    file: Box<dyn SourceFile>,

    /// The two buffers, each holding one block of the file.
    buffers: [Buffer; 2],
}

/// Returns `total` rounded up to a positive multiple of `2 * PAGE_SIZE`.
fn aligned_buffer_size(total: usize) -> usize {
    let align = 2 * PAGE_SIZE;
    let rem = total % align;
    if rem == 0 {
        cmp::max(total, align)
    } else {
        total + (align - rem)
    }
}

/// Opens `path` read-only, relative to `relative_to` if that is given,
/// else to the process working directory.
fn open_source(path: &Path, relative_to: Option<&Path>) -> io::Result<File> {
    let joined: PathBuf;
    let path = match relative_to {
        Some(dir) => {
            joined = dir.join(path);
            &joined
        }
        None => path,
    };
    File::open(path)
}

/// Reads `buf.len()` bytes at `offset`, looping over short reads until
/// the request is satisfied or the stream ends. Returns the number of
/// bytes actually placed into `buf`.
fn read_full(file: &dyn SourceFile, offset: ByteCounter, buf: &mut [u8]) -> io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match file.read_at(offset + done as u64, &mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

impl FileReader {
    /// Opens `path` for double-buffered reading.
    ///
    /// `total_buffer_size` is the size of both buffers together; it is
    /// rounded up to a multiple of `2 * PAGE_SIZE`. The first
    /// `min(file_size, total)` bytes are read immediately, after which
    /// both buffers are free and the first `acquire_next` costs no
    /// syscall.
    pub fn open_double_buffer(
        path: &Path,
        relative_to: Option<&Path>,
        total_buffer_size: usize,
    ) -> io::Result<Self> {
        let file = open_source(path, relative_to)?;
        Self::from_source(Box::new(file), total_buffer_size)
    }

    /// Opens `path` and preloads the whole file into buffer 0.
    ///
    /// The degenerate configuration for inputs meant to be fully
    /// resident: buffer 1 stays empty and no refill ever happens.
    pub fn open_single_buffer(path: &Path, relative_to: Option<&Path>) -> io::Result<Self> {
        let file = open_source(path, relative_to)?;
        Self::single_buffer_from_source(Box::new(file))
    }

    /// Like [`open_double_buffer`](Self::open_double_buffer) for an
    /// already opened source.
    pub fn from_source(file: Box<dyn SourceFile>, total_buffer_size: usize) -> io::Result<Self> {
        let half = aligned_buffer_size(total_buffer_size) / 2;
        let file_size = file.size()?;
        let mut frd = Self::with_buffers(
            file,
            file_size,
            [Buffer::with_capacity(half), Buffer::with_capacity(half)],
        );
        frd.fill_initial(0)?;
        frd.fill_initial(1)?;
        Ok(frd)
    }

    /// Like [`open_single_buffer`](Self::open_single_buffer) for an
    /// already opened source.
    pub fn single_buffer_from_source(file: Box<dyn SourceFile>) -> io::Result<Self> {
        let file_size = file.size()?;
        let capacity = usize::try_from(file_size)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "file too large to preload"))?;
        let mut frd = Self::with_buffers(
            file,
            file_size,
            [Buffer::with_capacity(capacity), Buffer::with_capacity(0)],
        );
        frd.fill_initial(0)?;
        Ok(frd)
    }

    fn with_buffers(file: Box<dyn SourceFile>, file_size: ByteCounter, buffers: [Buffer; 2]) -> Self {
        Self {
            ioerror: 0,
            unread_bytes: 0,
            next_index: 0,
            free_buffers: 2,
            last_delivered: 0,
            can_unread: false,
            file_offset: 0,
            file_size,
            file,
            buffers,
        }
    }

    /// Fills buffer `idx` during open; errors abort the open.
    fn fill_initial(&mut self, idx: usize) -> io::Result<()> {
        let remaining = self.file_size - self.file_offset;
        let want = cmp::min(self.buffers[idx].capacity() as u64, remaining) as usize;
        let n = read_full(
            self.file.as_ref(),
            self.file_offset,
            &mut self.buffers[idx].data[..want],
        )?;
        self.buffers[idx].len = n;
        self.unread_bytes += n;
        self.file_offset += n as ByteCounter;
        Ok(())
    }

    /// Closes the file and frees the buffers.
    pub fn close(self) {}

    /// Returns `true` if all bytes of the file have been handed out.
    /// `acquire_next` will return [`ScanError::NoData`].
    pub fn is_eof(&self) -> bool {
        self.unread_bytes == 0 && self.file_offset == self.file_size
    }

    /// Returns `true` if a filled buffer is available, i.e.
    /// `acquire_next` will return neither `NoData` nor `NoBuffer`.
    pub fn has_next(&self) -> bool {
        self.unread_bytes != 0
    }

    /// The latched I/O error code, or 0 while the reader is healthy.
    pub fn io_error(&self) -> i32 {
        self.ioerror
    }

    /// Latches an I/O error as if a read had failed (or clears it with
    /// 0). Test hook: after a nonzero code every `acquire_next` returns
    /// that code without touching the file.
    pub fn set_io_error(&mut self, code: i32) {
        self.ioerror = code;
    }

    /// Number of buffers not currently held by the consumer.
    pub fn free_buffer_count(&self) -> usize {
        self.free_buffers
    }

    /// Capacity in bytes of each of the two buffers.
    pub fn buffer_size(&self) -> usize {
        self.buffers[0].capacity()
    }

    /// Delivers the next block of file data.
    ///
    /// Blocks are delivered in strictly increasing file order. The slice
    /// stays valid until the buffer is given back with `release` (a later
    /// refill reuses the storage). Errors: the latched
    /// [`ScanError::Io`] code if a read failed earlier,
    /// [`ScanError::NoData`] at end of file, [`ScanError::NoBuffer`] when
    /// both buffers are already held.
    pub fn acquire_next(&mut self) -> Result<&[u8], ScanError> {
        if self.ioerror != 0 {
            // latched: returned again without another syscall
            return Err(ScanError::Io(self.ioerror));
        }
        if self.unread_bytes == 0 {
            if self.file_offset == self.file_size {
                return Err(ScanError::NoData);
            }
            return Err(ScanError::NoBuffer);
        }

        debug_assert!(self.free_buffers > 0);
        let idx = self.next_index;
        let size = cmp::min(self.buffers[idx].len, self.unread_bytes);

        self.unread_bytes -= size;
        self.free_buffers -= 1;
        self.next_index = 1 - idx;
        self.last_delivered = size;
        self.can_unread = true;

        Ok(&self.buffers[idx].data[..size])
    }

    /// Releases the oldest still-held buffer.
    ///
    /// If file data remains, the freed buffer is synchronously refilled
    /// at the current file offset; this is the reader's only blocking
    /// operation. A failed refill is latched and surfaces through the
    /// next `acquire_next`. Releasing with no buffer held does nothing.
    pub fn release(&mut self) {
        if self.free_buffers >= 2 {
            return;
        }
        // With one buffer held, `next_index` points at the free one;
        // with two held it wrapped back around to the oldest delivery.
        let idx = if self.free_buffers == 1 {
            1 - self.next_index
        } else {
            self.next_index
        };
        self.refill(idx);
        self.free_buffers += 1;
        self.can_unread = false;
    }

    /// Marks the most recently acquired buffer as unread again, so the
    /// next `acquire_next` returns the same slice. Does nothing when no
    /// delivery is outstanding or after a `release`.
    pub fn unread(&mut self) {
        if !self.can_unread {
            return;
        }
        self.can_unread = false;
        self.next_index = 1 - self.next_index;
        self.free_buffers += 1;
        self.unread_bytes += self.last_delivered;
    }

    /// Reads the next block of the file into buffer `idx`. Errors are
    /// latched, not returned; the caller of `release` cannot use them
    /// anyway.
    fn refill(&mut self, idx: usize) {
        if self.file_offset == self.file_size {
            // all data read
            return;
        }
        let remaining = self.file_size - self.file_offset;
        let want = cmp::min(self.buffers[idx].capacity() as u64, remaining) as usize;
        match read_full(
            self.file.as_ref(),
            self.file_offset,
            &mut self.buffers[idx].data[..want],
        ) {
            Ok(n) => {
                self.buffers[idx].len = n;
                self.unread_bytes += n;
                self.file_offset += n as ByteCounter;
            }
            Err(e) => {
                self.ioerror = e.raw_os_error().unwrap_or(GENERIC_IO_ERROR);
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;

    /// A fully resident source; `read_at` always satisfies the whole
    /// request.
    pub struct MemSource(pub Vec<u8>);

    impl SourceFile for MemSource {
        fn size(&self) -> io::Result<u64> {
            Ok(self.0.len() as u64)
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let offset = offset as usize;
            if offset >= self.0.len() {
                return Ok(0);
            }
            let n = cmp::min(buf.len(), self.0.len() - offset);
            buf[..n].copy_from_slice(&self.0[offset..offset + n]);
            Ok(n)
        }
    }

    /// A source whose n-th `read_at` call fails with the given OS error
    /// code. Stands in for a timer that forces the next syscall to fail.
    pub struct FailingSource {
        data: Vec<u8>,
        reads_left: Cell<usize>,
        errno: i32,
    }

    impl FailingSource {
        pub fn new(data: Vec<u8>, reads_before_failure: usize, errno: i32) -> Self {
            Self {
                data,
                reads_left: Cell::new(reads_before_failure),
                errno,
            }
        }
    }

    impl SourceFile for FailingSource {
        fn size(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let left = self.reads_left.get();
            if left == 0 {
                return Err(io::Error::from_raw_os_error(self.errno));
            }
            self.reads_left.set(left - 1);
            MemSource(self.data.clone()).read_at(offset, buf)
        }
    }

    /// Double-buffered reader over in-memory bytes.
    pub fn reader_from_bytes(bytes: &[u8], total_buffer_size: usize) -> FileReader {
        FileReader::from_source(Box::new(MemSource(bytes.to_vec())), total_buffer_size).unwrap()
    }

    /// A test pattern that never repeats within a buffer.
    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i.wrapping_mul(31)) as u8).collect()
    }

    #[test]
    fn test_aligned_buffer_size() {
        let align = 2 * PAGE_SIZE;
        assert_eq!(aligned_buffer_size(0), align);
        assert_eq!(aligned_buffer_size(1), align);
        assert_eq!(aligned_buffer_size(align), align);
        assert_eq!(aligned_buffer_size(align + 1), 2 * align);
        assert_eq!(aligned_buffer_size(5 * align), 5 * align);
    }

    #[test]
    fn test_initial_state() {
        let total = 2 * 2 * PAGE_SIZE;
        let data = pattern(3 * total);
        let frd = reader_from_bytes(&data, total);
        assert_eq!(frd.buffer_size(), total / 2);
        assert_eq!(frd.free_buffer_count(), 2);
        assert_eq!(frd.unread_bytes, total);
        assert_eq!(frd.file_offset, total as u64);
        assert_eq!(frd.io_error(), 0);
        assert!(frd.has_next());
        assert!(!frd.is_eof());
    }

    #[test]
    fn test_short_file_truncates_buffers() {
        let frd = reader_from_bytes(b"abc", 8 * PAGE_SIZE);
        assert_eq!(frd.unread_bytes, 3);
        assert_eq!(frd.file_offset, 3);
        assert_eq!(frd.buffers[0].len, 3);
        assert_eq!(frd.buffers[1].len, 0);
    }

    #[test]
    fn test_empty_file_is_eof() {
        let mut frd = reader_from_bytes(b"", 2 * PAGE_SIZE);
        assert!(frd.is_eof());
        assert!(!frd.has_next());
        assert_eq!(frd.acquire_next(), Err(ScanError::NoData));
    }

    /// The concatenation of all acquired slices is the file, in order.
    #[test]
    fn test_fifo_delivery_covers_file() {
        let total = 2 * 2 * PAGE_SIZE;
        for len in [0, 1, total - 1, total, 3 * total + 7, 5 * total] {
            let data = pattern(len);
            let mut frd = reader_from_bytes(&data, total);
            let mut collected = Vec::new();
            loop {
                match frd.acquire_next() {
                    Ok(slice) => {
                        collected.extend_from_slice(slice);
                        frd.release();
                    }
                    Err(ScanError::NoData) => break,
                    Err(e) => panic!("unexpected error {e:?} for len {len}"),
                }
            }
            assert_eq!(collected, data, "file of {} bytes", len);
            assert!(frd.is_eof());
        }
    }

    #[test]
    fn test_two_buffer_limit() {
        let total = 2 * 2 * PAGE_SIZE;
        let data = pattern(4 * total);
        let mut frd = reader_from_bytes(&data, total);

        assert!(frd.acquire_next().is_ok());
        assert!(frd.acquire_next().is_ok());
        assert_eq!(frd.free_buffer_count(), 0);
        assert_eq!(frd.acquire_next(), Err(ScanError::NoBuffer));

        frd.release();
        assert_eq!(frd.free_buffer_count(), 1);
        assert!(frd.acquire_next().is_ok());
    }

    #[test]
    fn test_unread_returns_same_slice() {
        let total = 2 * 2 * PAGE_SIZE;
        let data = pattern(3 * total);
        let mut frd = reader_from_bytes(&data, total);

        let first: Vec<u8> = frd.acquire_next().unwrap().to_vec();
        frd.unread();
        assert_eq!(frd.free_buffer_count(), 2);
        let again: Vec<u8> = frd.acquire_next().unwrap().to_vec();
        assert_eq!(first, again);

        // Only the most recent delivery is taken back.
        let second: Vec<u8> = frd.acquire_next().unwrap().to_vec();
        assert_ne!(first, second);
        frd.unread();
        assert_eq!(frd.acquire_next().unwrap(), &second[..]);
    }

    #[test]
    fn test_unread_is_single_shot() {
        let total = 2 * 2 * PAGE_SIZE;
        let data = pattern(3 * total);
        let mut frd = reader_from_bytes(&data, total);

        frd.acquire_next().unwrap();
        frd.acquire_next().unwrap();
        frd.unread();
        let free = frd.free_buffer_count();
        frd.unread(); // second unread without acquire: no-op
        assert_eq!(frd.free_buffer_count(), free);
    }

    #[test]
    fn test_unread_after_release_is_noop() {
        let total = 2 * 2 * PAGE_SIZE;
        let data = pattern(3 * total);
        let mut frd = reader_from_bytes(&data, total);

        frd.acquire_next().unwrap();
        frd.release();
        let free = frd.free_buffer_count();
        let unread = frd.unread_bytes;
        frd.unread();
        assert_eq!(frd.free_buffer_count(), free);
        assert_eq!(frd.unread_bytes, unread);
    }

    #[test]
    fn test_release_without_acquire_is_noop() {
        let total = 2 * 2 * PAGE_SIZE;
        let data = pattern(3 * total);
        let mut frd = reader_from_bytes(&data, total);
        frd.release();
        assert_eq!(frd.free_buffer_count(), 2);
        assert_eq!(frd.unread_bytes, total);
        assert_eq!(frd.file_offset, total as u64);
    }

    #[test]
    fn test_single_buffer_mode() {
        let data = pattern(5 * 2 * PAGE_SIZE + 3);
        let mut frd =
            FileReader::single_buffer_from_source(Box::new(MemSource(data.clone()))).unwrap();
        assert_eq!(frd.unread_bytes, data.len());
        assert!(frd.file_offset == data.len() as u64);
        let slice = frd.acquire_next().unwrap();
        assert_eq!(slice, &data[..]);
        assert_eq!(frd.acquire_next(), Err(ScanError::NoData));
        assert!(frd.is_eof());
    }

    #[test]
    fn test_set_io_error_is_sticky() {
        let total = 2 * 2 * PAGE_SIZE;
        let data = pattern(3 * total);
        let mut frd = reader_from_bytes(&data, total);

        frd.set_io_error(9999);
        assert_eq!(frd.io_error(), 9999);
        assert_eq!(frd.acquire_next(), Err(ScanError::Io(9999)));
        assert_eq!(frd.acquire_next(), Err(ScanError::Io(9999)));

        frd.set_io_error(0);
        assert!(frd.acquire_next().is_ok());
    }

    #[test]
    fn test_refill_failure_latches() {
        let total = 2 * 2 * PAGE_SIZE;
        let data = pattern(4 * total);
        // Two reads fill the buffers at open time; the third (the first
        // refill) fails.
        let src = FailingSource::new(data, 2, 5);
        let mut frd = FileReader::from_source(Box::new(src), total).unwrap();

        assert!(frd.acquire_next().is_ok());
        frd.release(); // refill fails here, latched silently
        assert_eq!(frd.io_error(), 5);
        assert_eq!(frd.acquire_next(), Err(ScanError::Io(5)));
        // Sticky: surfaced again without another syscall.
        assert_eq!(frd.acquire_next(), Err(ScanError::Io(5)));
        assert!(!frd.is_eof());
    }

    #[test]
    fn test_open_from_disk() {
        let total = 2 * 2 * PAGE_SIZE;
        let data = pattern(3 * total + 123);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("read");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&data)
            .unwrap();

        let mut frd =
            FileReader::open_double_buffer(Path::new("read"), Some(dir.path()), total).unwrap();
        let mut collected = Vec::new();
        while let Ok(slice) = frd.acquire_next() {
            collected.extend_from_slice(slice);
            frd.release();
        }
        assert_eq!(collected, data);
        assert!(frd.is_eof());
        frd.close();

        let mut frd = FileReader::open_single_buffer(&path, None).unwrap();
        assert_eq!(frd.acquire_next().unwrap(), &data[..]);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileReader::open_double_buffer(
            Path::new("no-such-file"),
            Some(dir.path()),
            DEFAULT_BUFFER_SIZE,
        );
        assert!(err.is_err());
    }
}
