pub mod config;
pub mod error;
pub mod identity;
pub mod server;

// Debug printing helper: expands to eprintln! in tests and debug builds and is absent otherwise.
// Usage: tprintln!("session.create user={}", user_id);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
