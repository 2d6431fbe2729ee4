// SPDX-License-Identifier: MIT

/// Logs an inconsistency and records it in the session report.
///
/// Evaluates to `true` when the condition holds, so callers can branch on it:
///
/// ```ignore
/// if fsck_bug!(self, ino != nid, "NODE.INO", "[{:#x}] ino mismatch", nid) { ... }
/// ```
#[macro_export]
macro_rules! fsck_bug {
    ($sess:expr, $cond:expr, $code:expr, $($arg:tt)+) => {{
        let hit: bool = $cond;
        if hit {
            let msg = ::alloc::format!($($arg)+);
            log::warn!("[{}] {}", $code, msg);
            $sess.note_bug($code, msg);
        }
        hit
    }};
}

/// Logs a correction and records it in the session report; check-only runs
/// get a warning instead.
#[macro_export]
macro_rules! fsck_fix {
    ($sess:expr, $code:expr, $($arg:tt)+) => {{
        let msg = ::alloc::format!($($arg)+);
        log::info!("FIX: [{}] {}", $code, msg);
        $sess.note_fix($code, msg);
    }};
}
