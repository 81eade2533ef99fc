/// Logs one line under a per-component target (`portio::<component>`).
///
/// The macro only picks the target; timestamp, level, pid and tid come from
/// the format installed by `logging::init`.
///
/// Usage:
/// ```rust,ignore
/// portio_log!(Level::Info, "service", "Driver {} opened", name);
/// portio_log!(Level::Warn, "deploy", "Image missing for {}", name);
/// ```
/// With the dispatcher from `logging::init` this renders as:
/// `[2026-03-02T09:14:55+01:00][INFO ][portio::service][pid=7120][tid=ThreadId(1)] Driver inpoutx64 opened`
#[macro_export]
macro_rules! portio_log {
    ($level:expr, $component:expr, $fmt:expr $(, $($arg:tt)+)?) => {
        log::log!(
            target: concat!("portio::", $component),
            $level,
            $fmt
            $(, $($arg)+)?
        )
    };
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    type Captured = (Level, String, String);

    /// Keeps `(level, target, message)` for everything up to DEBUG.
    struct Capture(Mutex<Vec<Captured>>);

    static CAPTURE: Capture = Capture(Mutex::new(Vec::new()));

    impl Log for Capture {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= LevelFilter::Debug
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            self.0.lock().unwrap().push((
                record.level(),
                record.target().to_owned(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    #[test]
    fn target_is_prefixed_with_crate_name() {
        log::set_logger(&CAPTURE).unwrap();
        log::set_max_level(LevelFilter::Debug);

        portio_log!(Level::Debug, "service", "Answer={}!", 42);
        portio_log!(Level::Warn, "deploy", "plain message");
        portio_log!(Level::Trace, "deploy", "below the max level");

        let seen = std::mem::take(&mut *CAPTURE.0.lock().unwrap());
        assert_eq!(
            seen,
            vec![
                (Level::Debug, "portio::service".to_owned(), "Answer=42!".to_owned()),
                (Level::Warn, "portio::deploy".to_owned(), "plain message".to_owned()),
            ]
        );
    }
}
