//! Logging macros prefixing every record with the simulated time and the
//! name of the emitting component.

#[doc(hidden)]
#[macro_export]
macro_rules! log_with_level {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {
        if $crate::__log::log_enabled!($level) {
            $crate::__log::log!(
                $level,
                "[{} {:5} {}] {}",
                $ctx.time(),
                $level,
                $ctx.name(),
                format_args!($($arg)+)
            );
        }
    };
}

#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::log_with_level!($crate::__log::Level::Trace, $ctx, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::log_with_level!($crate::__log::Level::Debug, $ctx, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::log_with_level!($crate::__log::Level::Info, $ctx, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::log_with_level!($crate::__log::Level::Warn, $ctx, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => {
        $crate::log_with_level!($crate::__log::Level::Error, $ctx, $($arg)+)
    };
}
