//! Byte-source adapter and FFmpeg custom I/O.
//!
//! A [`ByteSource`] is whatever the host can hand over: a plain [`Read`]
//! stream, something that can also [`Seek`], an in-memory buffer or a file.
//! When a session opens, the source is moved into a process-wide registry
//! and FFmpeg is given the registry key as the opaque pointer of its custom
//! `AVIOContext`. The `extern "C"` callbacks below look the source up by
//! key, so no Rust pointer ever crosses the native boundary and a stale
//! callback can at worst miss the lookup.
//!
//! The adapter reads straight into FFmpeg's I/O buffer and keeps no buffer
//! of its own.

use std::{
    collections::HashMap,
    ffi::{c_int, c_void},
    fmt::{Debug, Formatter, Result as FmtResult},
    fs::File,
    io::{Cursor, Error as IoError, ErrorKind, Read, Seek, SeekFrom},
    panic::{AssertUnwindSafe, catch_unwind},
    path::Path,
    sync::{
        Arc, LazyLock, Mutex, PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use ffmpeg_next::Error as FfmpegError;
use ffmpeg_sys_next::{AVIOContext, AVIOInterruptCB};

use crate::{error::ThumbError, progress::CancellationToken};

const AVSEEK_SIZE: c_int = 0x10000;
const AVSEEK_FORCE: c_int = 0x20000;

trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

enum Inner {
    Stream(Box<dyn Read + Send>),
    Seekable(Box<dyn ReadSeek>),
}

/// The input bytes of a session.
///
/// # Example
///
/// ```no_run
/// use thumbframe::{ByteSource, ThumbError};
///
/// let from_disk = ByteSource::open_file("clip.mp4")?;
/// assert!(from_disk.is_seekable());
///
/// let from_pipe = ByteSource::from_reader(std::io::stdin(), None);
/// assert!(!from_pipe.is_seekable());
/// # Ok::<(), ThumbError>(())
/// ```
pub struct ByteSource {
    inner: Inner,
    size: Option<u64>,
}

impl Debug for ByteSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ByteSource")
            .field("seekable", &self.is_seekable())
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl ByteSource {
    /// Wrap a forward-only stream, with its total size if the host knows it.
    ///
    /// FFmpeg cannot seek such a source, so duration and position targets
    /// that lie behind the read position are resolved by decoding forward.
    pub fn from_reader<R>(reader: R, size: Option<u64>) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            inner: Inner::Stream(Box::new(reader)),
            size,
        }
    }

    /// Wrap a seekable reader. The size is discovered by seeking when
    /// FFmpeg first asks for it.
    pub fn from_seekable<R>(reader: R) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        Self {
            inner: Inner::Seekable(Box::new(reader)),
            size: None,
        }
    }

    /// Wrap an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self {
            inner: Inner::Seekable(Box::new(Cursor::new(bytes))),
            size: Some(size),
        }
    }

    /// Open a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ThumbError::Unknown`] if the file cannot be opened or
    /// stat'ed.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self, ThumbError> {
        let path = path.as_ref();
        log::debug!("Opening source file {}", path.display());
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            inner: Inner::Seekable(Box::new(file)),
            size: Some(size),
        })
    }

    /// Override the total size reported to FFmpeg.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Whether FFmpeg may seek this source.
    pub fn is_seekable(&self) -> bool {
        matches!(self.inner, Inner::Seekable(_))
    }

    /// The total size in bytes, if known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    fn read_into(&mut self, buffer: &mut [u8]) -> Result<usize, IoError> {
        loop {
            let result = match &mut self.inner {
                Inner::Stream(reader) => reader.read(buffer),
                Inner::Seekable(reader) => reader.read(buffer),
            };
            match result {
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn seek_to(&mut self, position: SeekFrom) -> Result<u64, IoError> {
        match &mut self.inner {
            Inner::Stream(_) => Err(IoError::from(ErrorKind::Unsupported)),
            Inner::Seekable(reader) => reader.seek(position),
        }
    }

    fn total_size(&mut self) -> Option<u64> {
        if self.size.is_none()
            && let Inner::Seekable(reader) = &mut self.inner
        {
            let current = reader.stream_position().ok()?;
            let end = reader.seek(SeekFrom::End(0)).ok()?;
            reader.seek(SeekFrom::Start(current)).ok()?;
            self.size = Some(end);
        }
        self.size
    }
}

// ── Registry ───────────────────────────────────────────────────────

struct Registration {
    source: Mutex<ByteSource>,
    cancellation: CancellationToken,
}

static REGISTRY: LazyLock<RwLock<HashMap<usize, Arc<Registration>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

fn register(source: ByteSource, cancellation: CancellationToken) -> usize {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let registration = Arc::new(Registration {
        source: Mutex::new(source),
        cancellation,
    });
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, registration);
    id
}

fn deregister(id: usize) -> bool {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id)
        .is_some()
}

fn lookup(opaque: *mut c_void) -> Option<Arc<Registration>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&(opaque as usize))
        .cloned()
}

/// Number of byte sources currently registered with FFmpeg.
///
/// Every open session holds exactly one; closing it releases it.
pub fn active_sources() -> usize {
    REGISTRY.read().unwrap_or_else(PoisonError::into_inner).len()
}

fn code(error: FfmpegError) -> c_int {
    error.into()
}

// ── Callbacks ──────────────────────────────────────────────────────

unsafe extern "C" fn read_packet(opaque: *mut c_void, buffer: *mut u8, size: c_int) -> c_int {
    let Some(registration) = lookup(opaque) else {
        return code(FfmpegError::Unknown);
    };
    if registration.cancellation.is_cancelled() {
        return code(FfmpegError::Exit);
    }
    if buffer.is_null() || size <= 0 {
        return code(FfmpegError::Unknown);
    }
    let slice = unsafe { std::slice::from_raw_parts_mut(buffer, size as usize) };
    let result = catch_unwind(AssertUnwindSafe(|| {
        registration
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_into(slice)
    }));
    match result {
        Ok(Ok(0)) => code(FfmpegError::Eof),
        Ok(Ok(read)) => read as c_int,
        Ok(Err(error)) => {
            log::debug!("Source read failed: {error}");
            code(FfmpegError::Unknown)
        }
        Err(_) => {
            log::warn!("Source reader panicked");
            code(FfmpegError::Unknown)
        }
    }
}

unsafe extern "C" fn seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let failure = i64::from(code(FfmpegError::Unknown));
    let Some(registration) = lookup(opaque) else {
        return failure;
    };
    if registration.cancellation.is_cancelled() {
        return i64::from(code(FfmpegError::Exit));
    }
    let whence = whence & !AVSEEK_FORCE;
    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut source = registration
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if whence == AVSEEK_SIZE {
            return source
                .total_size()
                .and_then(|size| i64::try_from(size).ok())
                .unwrap_or(failure);
        }
        let position = match whence {
            0 => match u64::try_from(offset) {
                Ok(offset) => SeekFrom::Start(offset),
                Err(_) => return failure,
            },
            1 => SeekFrom::Current(offset),
            2 => SeekFrom::End(offset),
            _ => return failure,
        };
        match source.seek_to(position) {
            Ok(position) => i64::try_from(position).unwrap_or(failure),
            Err(error) => {
                log::debug!("Source seek failed: {error}");
                failure
            }
        }
    }));
    result.unwrap_or(failure)
}

unsafe extern "C" fn interrupt(opaque: *mut c_void) -> c_int {
    lookup(opaque).map_or(0, |registration| {
        c_int::from(registration.cancellation.is_cancelled())
    })
}

// ── AVIO guard ─────────────────────────────────────────────────────

/// Owns one custom `AVIOContext` and the registry entry behind it.
///
/// Dropping it frees the I/O buffer and context and deregisters the
/// source. The demuxer must be closed first; `avformat_close_input` leaves
/// a custom `pb` alone, so nothing is freed twice.
pub(crate) struct CustomIo {
    context: *mut AVIOContext,
    id: usize,
    seekable: bool,
}

impl CustomIo {
    pub(crate) fn new(
        source: ByteSource,
        cancellation: CancellationToken,
        buffer_size: usize,
    ) -> Result<Self, ThumbError> {
        let seekable = source.is_seekable();
        let id = register(source, cancellation);
        let buffer_size = c_int::try_from(buffer_size).unwrap_or(c_int::MAX);

        unsafe {
            let buffer = ffmpeg_sys_next::av_malloc(buffer_size as usize) as *mut u8;
            if buffer.is_null() {
                deregister(id);
                return Err(ThumbError::OutOfMemory);
            }
            let context = ffmpeg_sys_next::avio_alloc_context(
                buffer,
                buffer_size,
                0,
                id as *mut c_void,
                Some(read_packet),
                None,
                if seekable { Some(seek) } else { None },
            );
            if context.is_null() {
                ffmpeg_sys_next::av_free(buffer as *mut c_void);
                deregister(id);
                return Err(ThumbError::OutOfMemory);
            }
            if !seekable {
                (*context).seekable = 0;
            }
            Ok(Self {
                context,
                id,
                seekable,
            })
        }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut AVIOContext {
        self.context
    }

    pub(crate) fn is_seekable(&self) -> bool {
        self.seekable
    }

    pub(crate) fn interrupt_callback(&self) -> AVIOInterruptCB {
        AVIOInterruptCB {
            callback: Some(interrupt),
            opaque: self.id as *mut c_void,
        }
    }
}

impl Drop for CustomIo {
    fn drop(&mut self) {
        unsafe {
            if !self.context.is_null() {
                ffmpeg_sys_next::av_freep(&mut (*self.context).buffer as *mut *mut u8 as *mut c_void);
                ffmpeg_sys_next::avio_context_free(&mut self.context);
            }
        }
        if deregister(self.id) {
            log::debug!("Released byte source {}", self.id);
        }
    }
}
