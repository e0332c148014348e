/// Macro to return early with an error
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Generic(format!($($arg)*)))
    };
}

/// Macro to abort the current build because a node cannot be translated
#[macro_export]
macro_rules! unsupported {
    ($node:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::Unsupported {
            node: $node,
            reason: format!($($arg)*),
        })
    };
}

/// Log a warning message
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::tracing::warn!($($arg)*)
    };
}

/// Log a debug message
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::tracing::debug!($($arg)*)
    };
}

/// Log an info message
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::tracing::info!($($arg)*)
    };
}

/// Log an error message
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::tracing::error!($($arg)*)
    };
}

/// Log a trace message
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::tracing::trace!($($arg)*)
    };
}

/// Assert expression is true at runtime, with formatted message
#[macro_export]
macro_rules! assert_expr {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            panic!("assertion failed: {}", format_args!($($arg)*));
        }
    };
}
