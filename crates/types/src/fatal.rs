//! Abort path for unrecoverable initialization failures.

/// Logs `message` with its origin and aborts the process.
#[cold]
#[track_caller]
pub fn fatal(message: &str) -> ! {
    let loc = std::panic::Location::caller();
    tracing::error!(file = loc.file(), line = loc.line(), "fatal: {message}");
    eprintln!("fatal: {message} ({}:{})", loc.file(), loc.line());
    std::process::abort()
}

/// Asserts `cond`; on failure logs the expression, file, line and module and aborts.
#[macro_export]
macro_rules! rhi_assert {
    ($cond:expr $(,)?) => {
        $crate::rhi_assert!($cond, "assertion failed")
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            let msg = format!($($arg)+);
            ::tracing::error!(
                expr = stringify!($cond),
                file = file!(),
                line = line!(),
                module = module_path!(),
                "{msg}"
            );
            eprintln!(
                "assertion `{}` failed at {}:{} in {}: {}",
                stringify!($cond),
                file!(),
                line!(),
                module_path!(),
                msg
            );
            ::std::process::abort();
        }
    };
}

/// Unwraps a `Result`, routing the error through [`fatal`].
pub trait OrFatal<T> {
    fn or_fatal(self, what: &str) -> T;
}

impl<T, E: std::fmt::Display> OrFatal<T> for Result<T, E> {
    #[track_caller]
    fn or_fatal(self, what: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => fatal(&format!("{what}: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_passes_through() {
        let r: Result<u32, String> = Ok(7);
        assert_eq!(r.or_fatal("unreachable"), 7);
        rhi_assert!(1 + 1 == 2, "math works");
    }
}
