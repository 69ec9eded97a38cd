macro_rules! missing_metadata_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::MissingMetadata {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MissingMetadata {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

// Abort the process with a diagnostic. Reserved for load-time configuration
// defects (module table overflow) that no caller can recover from.
macro_rules! fail_fast {
    ($($arg:tt)*) => {{
        tracing::error!($($arg)*);
        eprintln!($($arg)*);
        std::process::abort();
    }};
}
