//! Host symbol name table.
//!
//! Compiled code calls external functions through symbol once-tags; the
//! linker turns each name into an address through [`resolve`].

use crate::runtime::host;

pub(crate) const PIPE: &str = "pipe";
pub(crate) const FORK: &str = "fork";
pub(crate) const DUP2: &str = "dup2";
pub(crate) const OPEN: &str = "open";
pub(crate) const CLOSE: &str = "close";
pub(crate) const EXECVP: &str = "execvp";
pub(crate) const EXIT: &str = "_exit";
pub(crate) const ENQUEUE: &str = "jish_enqueue";
pub(crate) const DETACH: &str = "jish_detach";
pub(crate) const CAPTURE: &str = "jish_capture";
pub(crate) const RUN_NESTED: &str = "jish_run_nested";
pub(crate) const FAULT: &str = "jish_fault";
pub(crate) const CHILD_FAIL: &str = "jish_child_fail";
pub(crate) const CHILD_BUILTIN: &str = "jish_child_builtin";
pub(crate) const CD: &str = "jish_cd";
pub(crate) const CD_REPORT: &str = "jish_cd_report";
pub(crate) const EXIT_BUILTIN: &str = "jish_exit";
pub(crate) const UNIMPLEMENTED: &str = "jish_unimplemented";
pub(crate) const CLOSE_PAIR: &str = "jish_close_pair";
pub(crate) const REAP_BLOCKING: &str = "jish_reap_blocking";

/// Every name [`resolve`] knows.
pub const HOST_SYMBOLS: [&str; 20] = [
    PIPE,
    FORK,
    DUP2,
    OPEN,
    CLOSE,
    EXECVP,
    EXIT,
    ENQUEUE,
    DETACH,
    CAPTURE,
    RUN_NESTED,
    FAULT,
    CHILD_FAIL,
    CHILD_BUILTIN,
    CD,
    CD_REPORT,
    EXIT_BUILTIN,
    UNIMPLEMENTED,
    CLOSE_PAIR,
    REAP_BLOCKING,
];

/// Returns the address of a host function.
pub fn resolve(name: &str) -> Option<usize> {
    let address = match name {
        PIPE => libc::pipe as *const () as usize,
        FORK => libc::fork as *const () as usize,
        DUP2 => libc::dup2 as *const () as usize,
        OPEN => libc::open as *const () as usize,
        CLOSE => libc::close as *const () as usize,
        EXECVP => libc::execvp as *const () as usize,
        EXIT => libc::_exit as *const () as usize,
        ENQUEUE => host::jish_enqueue as *const () as usize,
        DETACH => host::jish_detach as *const () as usize,
        CAPTURE => host::jish_capture as *const () as usize,
        RUN_NESTED => host::jish_run_nested as *const () as usize,
        FAULT => host::jish_fault as *const () as usize,
        CHILD_FAIL => host::jish_child_fail as *const () as usize,
        CHILD_BUILTIN => host::jish_child_builtin as *const () as usize,
        CD => host::jish_cd as *const () as usize,
        CD_REPORT => host::jish_cd_report as *const () as usize,
        EXIT_BUILTIN => host::jish_exit as *const () as usize,
        UNIMPLEMENTED => host::jish_unimplemented as *const () as usize,
        CLOSE_PAIR => host::jish_close_pair as *const () as usize,
        REAP_BLOCKING => host::jish_reap_blocking as *const () as usize,
        _ => return None,
    };
    Some(address)
}
