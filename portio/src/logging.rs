//! Global logger setup.
//!
//! Lines go to stdout, to an optional log file next to the host module, and
//! on Windows to the debugger output channel that kernel-driver tooling
//! (DebugView, WinDbg) already watches.

use chrono::Local;
use fern::Dispatch;
use std::{path::Path, process, thread};

use crate::config::LoggingConfig;

/// Configure global logging as requested in `cfg`.
///
/// Fails if another logger is already installed; hosts that bring their own
/// logger simply skip this.
pub fn init(base_dir: &Path, cfg: &LoggingConfig) -> Result<(), fern::InitError> {
    let log_path = cfg
        .enable
        .then(|| base_dir.join(cfg.file.as_deref().unwrap_or("portio.log")));

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(cfg.level_filter())
        .chain(std::io::stdout());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    #[cfg(windows)]
    {
        if cfg.debug_output {
            dispatch = dispatch.chain(debug_output());
        }
    }

    dispatch.apply()?;
    Ok(())
}

#[cfg(windows)]
fn debug_output() -> fern::Output {
    use windows_sys::Win32::System::Diagnostics::Debug::OutputDebugStringW;

    fern::Output::call(|record| {
        let wide: Vec<u16> = format!("{}\n", record.args())
            .encode_utf16()
            .chain(Some(0))
            .collect();
        unsafe { OutputDebugStringW(wide.as_ptr()) };
    })
}
