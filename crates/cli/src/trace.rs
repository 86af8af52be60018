//! Diagnostic traces for internal failures.
//!
//! The user sees a short internal-error block; the full trace (error chain
//! or panic message, plus a backtrace) goes to `error_<UTC timestamp>.txt`.

use std::backtrace::Backtrace;
use std::error::Error;
use std::fs;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

static LAST_PANIC: Mutex<Option<String>> = Mutex::new(None);

/// `err` followed by each of its sources, one per line.
pub fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}

pub fn trace_file_name(now: DateTime<Utc>) -> String {
    format!("error_{}.txt", now.format("%Y-%m-%dT%H-%M-%S%.6fZ"))
}

/// Trace body for an error value, with a backtrace captured here.
pub fn error_trace(err: &dyn Error) -> String {
    format!("{}\n\n{}", error_chain(err), Backtrace::force_capture())
}

/// Write `body` to a fresh trace file in `dir` (system temp dir if None).
pub fn write_trace(dir: Option<&Path>, body: &str) -> io::Result<PathBuf> {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&dir)?;
    let path = dir.join(trace_file_name(Utc::now()));
    fs::write(&path, body)?;
    Ok(path)
}

/// Record each panic's message and backtrace for [`take_panic_trace`], then
/// run the previously installed hook.
pub fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let report = format!("{}\n\n{}", info, Backtrace::force_capture());
        if let Ok(mut slot) = LAST_PANIC.lock() {
            *slot = Some(report);
        }
        previous(info);
    }));
}

/// Trace of the most recent panic, if the hook saw one.
pub fn take_panic_trace() -> Option<String> {
    LAST_PANIC.lock().ok().and_then(|mut slot| slot.take())
}

/// One-line description of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic: <non-string payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(Inner);
    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "cannot open snapshot")
        }
    }
    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "unable to open database file")
        }
    }
    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }
    impl Error for Inner {}

    #[test]
    fn chain_lists_sources() {
        assert_eq!(
            error_chain(&Outer(Inner)),
            "cannot open snapshot\ncaused by: unable to open database file"
        );
    }

    #[test]
    fn file_name_is_timestamped() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(trace_file_name(t), "error_2024-03-09T14-05-07.000000Z.txt");
    }

    #[test]
    fn trace_written_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_trace(Some(dir.path()), "boom").unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "boom");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("error_") && name.ends_with(".txt"));
    }

    #[test]
    fn panic_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("oops");
        assert_eq!(panic_message(payload.as_ref()), "panic: oops");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bad"));
        assert_eq!(panic_message(payload.as_ref()), "panic: bad");
        let payload: Box<dyn std::any::Any + Send> = Box::new(3);
        assert_eq!(panic_message(payload.as_ref()), "panic: <non-string payload>");
    }
}
