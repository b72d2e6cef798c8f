//! FFmpeg initialisation and log bridging.
//!
//! FFmpeg has its own internal logging system, separate from the Rust
//! [`log`](https://crates.io/crates/log) crate. By default it prints to
//! stderr, which is noisy inside a server. The first session opened (or an
//! explicit call to [`install_log_bridge`]) replaces FFmpeg's printer with a
//! callback that formats each line, strips the trailing newline and relays
//! it to the `log` facade under the `"ffmpeg"` target, or to a handler set
//! with [`set_log_handler`].
//!
//! # Example
//!
//! ```no_run
//! use thumbframe::FfmpegLogLevel;
//!
//! // Relay only errors and above.
//! thumbframe::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//!
//! // Or take over the lines entirely.
//! thumbframe::set_log_handler(|level, message| {
//!     eprintln!("[{level:?}] {message}");
//! });
//! ```

use std::{
    ffi::{CStr, c_char, c_int, c_void},
    sync::{
        Arc, Once, PoisonError, RwLock,
        atomic::{AtomicI32, Ordering},
    },
};

use ffmpeg_next::util::log::Level;

use crate::error::ThumbError;

const LINE_SIZE: usize = 1024;

static BRIDGE: Once = Once::new();
static THRESHOLD: AtomicI32 = AtomicI32::new(FfmpegLogLevel::Info.as_raw());
static HANDLER: RwLock<Option<Arc<LogHandler>>> = RwLock::new(None);

/// Signature of a caller-installed FFmpeg log handler.
pub type LogHandler = dyn Fn(FfmpegLogLevel, &str) + Send + Sync;

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants. Setting a level causes
/// FFmpeg to suppress all messages below that severity.
///
/// # Ordering (most verbose → most quiet)
///
/// `Trace` > `Debug` > `Verbose` > `Info` > `Warning` > `Error` > `Fatal` > `Panic` > `Quiet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only log when a condition that cannot be recovered from is encountered
    /// and the process will abort.
    Panic,
    /// Only log when an unrecoverable error is encountered (the context
    /// becomes invalid but the process may continue).
    Fatal,
    /// Log recoverable errors.
    Error,
    /// Log warnings.
    Warning,
    /// Log informational messages (default threshold).
    Info,
    /// Log verbose informational messages.
    Verbose,
    /// Log debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl FfmpegLogLevel {
    /// The raw `AV_LOG_*` value.
    pub const fn as_raw(self) -> c_int {
        match self {
            FfmpegLogLevel::Quiet => -8,
            FfmpegLogLevel::Panic => 0,
            FfmpegLogLevel::Fatal => 8,
            FfmpegLogLevel::Error => 16,
            FfmpegLogLevel::Warning => 24,
            FfmpegLogLevel::Info => 32,
            FfmpegLogLevel::Verbose => 40,
            FfmpegLogLevel::Debug => 48,
            FfmpegLogLevel::Trace => 56,
        }
    }

    /// Bucket a raw `AV_LOG_*` value into the nearest named level at or
    /// below it.
    pub fn from_raw(level: c_int) -> Self {
        match level {
            i32::MIN..=-1 => FfmpegLogLevel::Quiet,
            0..=7 => FfmpegLogLevel::Panic,
            8..=15 => FfmpegLogLevel::Fatal,
            16..=23 => FfmpegLogLevel::Error,
            24..=31 => FfmpegLogLevel::Warning,
            32..=39 => FfmpegLogLevel::Info,
            40..=47 => FfmpegLogLevel::Verbose,
            48..=55 => FfmpegLogLevel::Debug,
            _ => FfmpegLogLevel::Trace,
        }
    }

    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

/// Initialise FFmpeg and install the log bridge. Idempotent.
pub(crate) fn init() -> Result<(), ThumbError> {
    // Safe to call multiple times.
    ffmpeg_next::init()?;
    install_log_bridge();
    Ok(())
}

/// Set the FFmpeg log threshold.
///
/// Lines above this verbosity are dropped both by FFmpeg itself and by the
/// bridge.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
    THRESHOLD.store(level.as_raw(), Ordering::Relaxed);
}

/// The current bridge threshold.
pub fn ffmpeg_log_level() -> FfmpegLogLevel {
    FfmpegLogLevel::from_raw(THRESHOLD.load(Ordering::Relaxed))
}

/// Route FFmpeg log lines to `handler` instead of the `log` facade.
///
/// Installs the bridge if it is not installed yet.
pub fn set_log_handler<F>(handler: F)
where
    F: Fn(FfmpegLogLevel, &str) + Send + Sync + 'static,
{
    *HANDLER.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    install_log_bridge();
}

/// Restore the default routing to the `log` facade.
pub fn clear_log_handler() {
    *HANDLER.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Replace FFmpeg's stderr printer with the bridge. Idempotent.
pub fn install_log_bridge() {
    BRIDGE.call_once(|| unsafe {
        ffmpeg_sys_next::av_log_set_callback(Some(log_callback));
    });
}

#[cfg(all(target_arch = "x86_64", not(windows)))]
type VaList = *mut ffmpeg_sys_next::__va_list_tag;
#[cfg(not(all(target_arch = "x86_64", not(windows))))]
type VaList = ffmpeg_sys_next::va_list;

unsafe extern "C" fn log_callback(
    class: *mut c_void,
    level: c_int,
    format: *const c_char,
    arguments: VaList,
) {
    if level > THRESHOLD.load(Ordering::Relaxed) {
        return;
    }
    let mut line = [0 as c_char; LINE_SIZE];
    let mut print_prefix: c_int = 1;
    let written = unsafe {
        ffmpeg_sys_next::av_log_format_line2(
            class,
            level,
            format,
            arguments,
            line.as_mut_ptr(),
            LINE_SIZE as c_int,
            &mut print_prefix,
        )
    };
    if written < 0 {
        return;
    }
    let message = unsafe { CStr::from_ptr(line.as_ptr()) }.to_string_lossy();
    relay(level, &message);
}

/// Gate, normalise and deliver one formatted line.
fn relay(level: c_int, message: &str) {
    if level > THRESHOLD.load(Ordering::Relaxed) {
        return;
    }
    let message = normalize_line(message);
    if message.is_empty() {
        return;
    }
    let level = FfmpegLogLevel::from_raw(level);
    let handler = HANDLER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match handler {
        Some(handler) => handler(level, message),
        None => match level {
            FfmpegLogLevel::Trace | FfmpegLogLevel::Debug | FfmpegLogLevel::Verbose => {
                log::debug!(target: "ffmpeg", "{message}")
            }
            FfmpegLogLevel::Info => log::info!(target: "ffmpeg", "{message}"),
            _ => log::warn!(target: "ffmpeg", "{message}"),
        },
    }
}

fn normalize_line(message: &str) -> &str {
    message.strip_suffix('\n').unwrap_or(message)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn raw_levels_bucket_downwards() {
        assert_eq!(FfmpegLogLevel::from_raw(-8), FfmpegLogLevel::Quiet);
        assert_eq!(FfmpegLogLevel::from_raw(16), FfmpegLogLevel::Error);
        assert_eq!(FfmpegLogLevel::from_raw(20), FfmpegLogLevel::Error);
        assert_eq!(FfmpegLogLevel::from_raw(56), FfmpegLogLevel::Trace);
        for level in [
            FfmpegLogLevel::Quiet,
            FfmpegLogLevel::Panic,
            FfmpegLogLevel::Fatal,
            FfmpegLogLevel::Error,
            FfmpegLogLevel::Warning,
            FfmpegLogLevel::Info,
            FfmpegLogLevel::Verbose,
            FfmpegLogLevel::Debug,
            FfmpegLogLevel::Trace,
        ] {
            assert_eq!(FfmpegLogLevel::from_raw(level.as_raw()), level);
        }
    }

    #[test]
    fn trailing_newline_is_stripped_once() {
        assert_eq!(normalize_line("opened input\n"), "opened input");
        assert_eq!(normalize_line("two\n\n"), "two\n");
        assert_eq!(normalize_line("none"), "none");
    }

    #[test]
    fn handler_receives_gated_lines() {
        let captured: Arc<Mutex<Vec<(FfmpegLogLevel, String)>>> = Arc::default();
        let sink = Arc::clone(&captured);
        set_log_handler(move |level, message| {
            sink.lock().unwrap().push((level, message.to_string()));
        });
        set_ffmpeg_log_level(FfmpegLogLevel::Warning);

        relay(FfmpegLogLevel::Error.as_raw(), "moov atom not found\n");
        relay(FfmpegLogLevel::Debug.as_raw(), "probing\n");
        relay(FfmpegLogLevel::Warning.as_raw(), "\n");

        clear_log_handler();
        set_ffmpeg_log_level(FfmpegLogLevel::Info);

        let captured = captured.lock().unwrap();
        assert_eq!(
            captured.as_slice(),
            &[(FfmpegLogLevel::Error, "moov atom not found".to_string())]
        );
    }
}
