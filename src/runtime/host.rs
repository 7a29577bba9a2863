//! Host helpers called from compiled steps.
//!
//! Every helper is `extern "C"` and reached only through the symbol name
//! table. Helpers whose name ends the child side of a `fork` never return.

use std::ffi::{c_void, CStr, CString};
use std::io::Write;
use std::os::raw::c_char;

use crate::parser::ast::Builtin;
use crate::runtime::closure::{decode_wait_status, last_errno, ClosureState};
use crate::runtime::error::{ClosureError, FaultKind, RawFault};
use crate::runtime::runner::Runner;
use crate::runtime::status::Status;

/// Recovers the runner behind the opaque pointer handed to compiled code.
///
/// # Safety
/// `runner` must come from [`ClosureState::invoke`] and the invocation must
/// still be running.
unsafe fn runner_from<'a>(runner: *mut c_void) -> &'a mut dyn Runner {
    &mut **runner.cast::<&mut dyn Runner>()
}

/// Lossy view of a nullable C string.
unsafe fn text_from(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

fn report(message: std::fmt::Arguments<'_>) {
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "jish: {message}");
}

fn child_exit(code: i32) -> ! {
    // SAFETY: _exit skips atexit handlers and stdio flushing inherited from
    // the parent, which is what a forked child wants.
    unsafe { libc::_exit(code) }
}

// ---------------------------------------------------------------------------
// Wait queue and faults
// ---------------------------------------------------------------------------

/// Appends a child to the closure's wait queue.
pub(crate) unsafe extern "C" fn jish_enqueue(closure: *mut ClosureState, pid: libc::pid_t) {
    (*closure).queue.push_back(pid);
}

/// Hands a background child to the process-wide detachables.
pub(crate) unsafe extern "C" fn jish_detach(closure: *mut ClosureState, pid: libc::pid_t) {
    (*closure).detachables.push(pid);
}

/// Records a syscall failure using the current `errno`.
pub(crate) unsafe extern "C" fn jish_fault(fault: *mut RawFault, kind: u32) {
    let errno = last_errno();
    if let Some(kind) = FaultKind::from_raw(kind) {
        (*fault).record(kind, errno);
    }
}

/// Closes both ends of a pipe pair that are still open.
pub(crate) unsafe extern "C" fn jish_close_pair(pair: *mut [libc::c_int; 2]) {
    for fd in (*pair).iter_mut() {
        if *fd >= 0 {
            libc::close(*fd);
            *fd = -1;
        }
    }
}

/// Blocking reap used on the failure path after a partial fork sequence.
pub(crate) unsafe extern "C" fn jish_reap_blocking(pid: libc::pid_t) {
    if pid <= 0 {
        return;
    }
    let mut raw = 0;
    while libc::waitpid(pid, &mut raw, 0) < 0 && last_errno() == libc::EINTR {}
}

/// Raises the fault of a builtin without compiled behavior.
pub(crate) unsafe extern "C" fn jish_unimplemented(fault: *mut RawFault, builtin: u32) -> u32 {
    match Builtin::from_id(builtin) {
        Some(Builtin::Again) => (*fault).record(FaultKind::Again, 0),
        _ => (*fault).record(FaultKind::NotImplemented, builtin as i32),
    }
    Status::FAULT.bits()
}

// ---------------------------------------------------------------------------
// Nested programs
// ---------------------------------------------------------------------------

/// Drives a nested program to completion and returns its exit status.
///
/// Runs in a forked child: the wait queue inherited from the parent is
/// discarded and children are reaped with a blocking wait.
unsafe fn drive_nested(closure: *mut ClosureState, runner: *mut c_void, entry: usize) -> i32 {
    let state = &mut *closure;
    state.queue.clear();
    state.blocking_reap = true;
    state.next = entry;
    state.status = 0;
    let runner = runner_from(runner);
    loop {
        match state.invoke(runner) {
            Ok(status) if status.contains(Status::REMOVE) => return state.status,
            Ok(_) => {}
            Err(error) => {
                if let Some(code) = error.exit_code() {
                    return code;
                }
                report(format_args!("{error}"));
                return 1;
            }
        }
    }
}

/// Child side of a detached compound command.
pub(crate) unsafe extern "C" fn jish_run_nested(
    closure: *mut ClosureState,
    runner: *mut c_void,
    entry: usize,
) -> ! {
    let code = drive_nested(closure, runner, entry);
    child_exit(code)
}

/// Runs the nested program at `entry` with its output on a pipe and stores
/// that output in capture `slot`. Returns 0, or -1 after writing `fault`.
pub(crate) unsafe extern "C" fn jish_capture(
    closure: *mut ClosureState,
    runner: *mut c_void,
    fault: *mut RawFault,
    slot: u32,
    entry: usize,
) -> i32 {
    // The read end stays in the slot while later children are forked.
    let mut fds = [-1; 2];
    if libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) < 0 {
        (*fault).record(FaultKind::Pipe, last_errno());
        return -1;
    }
    let pid = libc::fork();
    if pid < 0 {
        (*fault).record(FaultKind::Fork, last_errno());
        jish_close_pair(&mut fds);
        return -1;
    }
    if pid == 0 {
        libc::close(fds[0]);
        if libc::dup2(fds[1], libc::STDOUT_FILENO) < 0 {
            report(format_args!("{}", ClosureError::Dup2(last_errno())));
            child_exit(1);
        }
        libc::close(fds[1]);
        jish_run_nested(closure, runner, entry);
    }
    libc::close(fds[1]);

    let mut output = Vec::new();
    let mut buffer = [0u8; 4096];
    loop {
        let n = libc::read(fds[0], buffer.as_mut_ptr().cast(), buffer.len());
        if n > 0 {
            output.extend_from_slice(&buffer[..n as usize]);
        } else if n == 0 || last_errno() != libc::EINTR {
            break;
        }
    }

    let mut raw = 0;
    while libc::waitpid(pid, &mut raw, 0) < 0 {
        let errno = last_errno();
        if errno != libc::EINTR {
            (*fault).record(FaultKind::Waitpid, errno);
            libc::close(fds[0]);
            return -1;
        }
    }
    tracing::debug!(
        pid,
        slot,
        status = decode_wait_status(raw),
        bytes = output.len(),
        "captured substitution"
    );

    let value = capture_text(output);
    if !(*closure).fill_slot(slot as usize, fds[0], value) {
        libc::close(fds[0]);
    }
    0
}

/// Trims trailing newlines; output stops at the first NUL byte.
pub(crate) fn capture_text(mut output: Vec<u8>) -> CString {
    if let Some(nul) = output.iter().position(|&byte| byte == 0) {
        output.truncate(nul);
    }
    while output.last() == Some(&b'\n') {
        output.pop();
    }
    CString::new(output).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

/// Reports a failed `open`, `dup2` or `execvp` in a child and exits.
pub(crate) unsafe extern "C" fn jish_child_fail(kind: u32, name: *const c_char) -> ! {
    let errno = last_errno();
    let error = FaultKind::from_raw(kind).map_or(ClosureError::Execvp(errno), |k| k.error(errno));
    match text_from(name) {
        Some(name) => report(format_args!("{name}: {error}")),
        None => report(format_args!("{error}")),
    }
    let code = match error {
        ClosureError::Execvp(libc::ENOENT) => 127,
        ClosureError::Execvp(_) => 126,
        _ => 1,
    };
    child_exit(code)
}

/// Runs a builtin inside a forked child (`cd` or `exit` behind a pipe).
pub(crate) unsafe extern "C" fn jish_child_builtin(builtin: u32, argv: *const *const c_char) -> ! {
    let argument = if argv.is_null() { None } else { text_from(*argv.add(1)) };
    let code = match Builtin::from_id(builtin) {
        Some(Builtin::True) => 0,
        Some(Builtin::False) => 1,
        Some(Builtin::Exit) => match argument {
            Some(text) => exit_status_or_report(&text),
            None => 0,
        },
        Some(Builtin::Cd) => {
            let target = argument.or_else(|| std::env::var("HOME").ok());
            match target {
                Some(target) => match std::env::set_current_dir(&target) {
                    Ok(()) => 0,
                    Err(err) => {
                        let errno = err.raw_os_error().unwrap_or(libc::EIO);
                        report(format_args!("cd: {target}: {}", ClosureError::Chdir(errno)));
                        1
                    }
                },
                None => {
                    report(format_args!("cd: HOME not set"));
                    1
                }
            }
        }
        Some(other) => {
            report(format_args!("{}", ClosureError::NotImplemented(other.name())));
            2
        }
        None => 2,
    };
    child_exit(code)
}

// ---------------------------------------------------------------------------
// In-process builtins
// ---------------------------------------------------------------------------

/// Changes the shell's working directory. Returns 0, an errno, or -1 when
/// `HOME` is needed but unset.
pub(crate) unsafe extern "C" fn jish_cd(runner: *mut c_void, path: *const c_char) -> i32 {
    let runner = runner_from(runner);
    let Some(target) = text_from(path).or_else(|| runner.get_var("HOME")) else {
        return -1;
    };
    let previous = std::env::current_dir().ok();
    if let Err(err) = std::env::set_current_dir(&target) {
        return err.raw_os_error().unwrap_or(libc::EIO);
    }
    if let Some(previous) = previous {
        runner.set_var("OLDPWD", &previous.to_string_lossy());
    }
    if let Ok(current) = std::env::current_dir() {
        runner.set_var("PWD", &current.to_string_lossy());
    }
    tracing::debug!(dir = %target, "changed directory");
    0
}

/// Child that reports a failed in-process `cd` and exits 1.
pub(crate) unsafe extern "C" fn jish_cd_report(path: *const c_char, code: i32) -> ! {
    match text_from(path) {
        Some(path) if code > 0 => {
            report(format_args!("cd: {path}: {}", ClosureError::Chdir(code)));
        }
        _ => report(format_args!("cd: HOME not set")),
    }
    child_exit(1)
}

/// Raises the `exit` control signal.
pub(crate) unsafe extern "C" fn jish_exit(
    closure: *mut ClosureState,
    runner: *mut c_void,
    fault: *mut RawFault,
    argument: *const c_char,
) -> u32 {
    let code = match text_from(argument) {
        Some(text) => exit_status_or_report(&text),
        None => (*closure).status,
    };
    if runner_from(runner).is_interactive() {
        let _ = writeln!(std::io::stderr(), "exit");
    }
    (*fault).record(FaultKind::Exit, code);
    Status::FAULT.bits()
}

fn exit_status_or_report(text: &str) -> i32 {
    parse_exit_status(text).unwrap_or_else(|| {
        report(format_args!("exit: {text}: numeric argument required"));
        2
    })
}

/// Parses an `exit` argument: optional sign, then `0x`, `0o`, `0b` or `0d`
/// (any case) or plain decimal digits. The result is truncated to `0..=255`.
pub fn parse_exit_status(text: &str) -> Option<i32> {
    let text = text.trim();
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = match lower.get(..2) {
        Some("0x") => (16, &lower[2..]),
        Some("0o") => (8, &lower[2..]),
        Some("0b") => (2, &lower[2..]),
        Some("0d") => (10, &lower[2..]),
        _ => (10, lower.as_str()),
    };
    if body.is_empty() || body.starts_with(['+', '-']) {
        return None;
    }
    let value = i128::from_str_radix(body, radix).ok()?;
    let value = if negative { -value } else { value };
    Some(value.rem_euclid(256) as i32)
}
