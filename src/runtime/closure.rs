//! Compiled closures and the invocation contract.
//!
//! A closure owns its executable block and a `ClosureState` whose leading
//! fields are read and written by the machine code at fixed offsets. Each
//! [`Closure::invoke`] first drains the wait queue, then calls the step the
//! state's `next` field points at.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::{c_void, CString};
use std::fmt;
use std::os::raw::c_char;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::codegen::block::ExecBlock;
use crate::codegen::trampoline::SharedTrampolines;
use crate::runtime::detach::Detachables;
use crate::runtime::error::{ClosureError, RawFault};
use crate::runtime::runner::Runner;
use crate::runtime::status::Status;

/// Debug registration kept alive alongside the code it describes.
#[cfg(feature = "jit-debug")]
pub(crate) type DebugHandle = Option<crate::debug::Registration>;
/// Debug registration kept alive alongside the code it describes.
#[cfg(not(feature = "jit-debug"))]
pub(crate) type DebugHandle = ();

/// Signature of every compiled step.
pub(crate) type StepFn =
    unsafe extern "C" fn(*mut ClosureState, *mut c_void, *mut RawFault) -> u32;

pub(crate) const NEXT_OFFSET: i32 = std::mem::offset_of!(ClosureState, next) as i32;
pub(crate) const STATUS_OFFSET: i32 = std::mem::offset_of!(ClosureState, status) as i32;
pub(crate) const EXPANSIONS_OFFSET: i32 = std::mem::offset_of!(ClosureState, expansions) as i32;

const EMPTY: &[u8] = b"\0";

/// Decodes a `waitpid` status word into a shell exit status.
pub(crate) fn decode_wait_status(raw: i32) -> i32 {
    if libc::WIFEXITED(raw) {
        libc::WEXITSTATUS(raw)
    } else if libc::WIFSIGNALED(raw) {
        128 + libc::WTERMSIG(raw)
    } else {
        raw
    }
}

pub(crate) fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

// ---------------------------------------------------------------------------
// Capture slots
// ---------------------------------------------------------------------------

/// Output of one command substitution, alive until the closure is released.
#[derive(Debug)]
pub(crate) struct CaptureSlot {
    fd: RawFd,
    value: CString,
}

impl CaptureSlot {
    fn empty() -> Self {
        Self {
            fd: -1,
            value: CString::default(),
        }
    }

    /// Stores a captured value and the read end it came from.
    pub(crate) fn fill(&mut self, fd: RawFd, value: CString) {
        self.close();
        self.fd = fd;
        self.value = value;
    }

    pub(crate) fn as_ptr(&self) -> *const c_char {
        self.value.as_ptr()
    }

    fn close(&mut self) {
        if self.fd >= 0 {
            // SAFETY: the slot owns this descriptor.
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }
    }
}

impl Drop for CaptureSlot {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Closure state
// ---------------------------------------------------------------------------

/// Run-time bookkeeping of one closure.
///
/// The first three fields are part of the machine-code ABI.
#[repr(C)]
pub(crate) struct ClosureState {
    /// Address of the step to run on the next invocation.
    pub(crate) next: usize,
    /// Condition flag: last failing exit status, 0 when everything succeeded.
    pub(crate) status: i32,
    /// One C string pointer per capture slot.
    pub(crate) expansions: *const *const c_char,
    pub(crate) queue: VecDeque<libc::pid_t>,
    pub(crate) slots: Vec<CaptureSlot>,
    pointers: Vec<*const c_char>,
    pub(crate) detachables: Arc<Detachables>,
    /// Nested programs in forked children reap with a blocking wait.
    pub(crate) blocking_reap: bool,
    stalled: bool,
}

impl ClosureState {
    fn new(entry: usize, slot_count: usize, detachables: Arc<Detachables>) -> Box<Self> {
        let pointers = vec![EMPTY.as_ptr().cast::<c_char>(); slot_count];
        let mut state = Box::new(Self {
            next: entry,
            status: 0,
            expansions: std::ptr::null(),
            queue: VecDeque::new(),
            slots: (0..slot_count).map(|_| CaptureSlot::empty()).collect(),
            pointers,
            detachables,
            blocking_reap: false,
            stalled: false,
        });
        state.expansions = state.pointers.as_ptr();
        state
    }

    /// Stores a substitution result and publishes it to the machine code.
    pub(crate) fn fill_slot(&mut self, slot: usize, fd: RawFd, value: CString) -> bool {
        let (Some(capture), Some(pointer)) = (self.slots.get_mut(slot), self.pointers.get_mut(slot))
        else {
            return false;
        };
        capture.fill(fd, value);
        *pointer = capture.as_ptr();
        true
    }

    /// Reaps queued children in order. Returns `false` when one is still
    /// running; each status is consumed exactly once.
    fn drain(&mut self) -> Result<bool, ClosureError> {
        while let Some(&pid) = self.queue.front() {
            let flags = if self.blocking_reap { 0 } else { libc::WNOHANG };
            let mut raw = 0;
            // SAFETY: waitpid only writes the status word.
            let rc = unsafe { libc::waitpid(pid, &mut raw, flags) };
            if rc == 0 {
                self.stalled = true;
                return Ok(false);
            }
            if rc < 0 {
                let errno = last_errno();
                if errno == libc::EINTR {
                    continue;
                }
                self.queue.pop_front();
                return Err(ClosureError::Waitpid(errno));
            }
            self.queue.pop_front();
            let code = decode_wait_status(raw);
            debug!(pid, code, "reaped child");
            if code != 0 {
                self.status = code;
            }
        }
        Ok(true)
    }

    /// Runs one invocation against this state.
    pub(crate) fn invoke(&mut self, runner: &mut dyn Runner) -> Result<Status, ClosureError> {
        self.stalled = false;
        if !self.drain()? {
            return Ok(Status::CONTINUE);
        }

        let mut fault = RawFault::default();
        let mut runner: &mut dyn Runner = runner;
        let runner_ptr = (&mut runner as *mut &mut dyn Runner).cast::<c_void>();
        let next = self.next;
        // SAFETY: `next` always holds the address of a compiled step inside
        // the live block, and every step honors `StepFn`.
        let bits = unsafe {
            let step = std::mem::transmute::<usize, StepFn>(next);
            step(self, runner_ptr, &mut fault)
        };
        let status = Status::from_bits(bits);
        trace!(step = next, %status, "invoked step");
        if status.contains(Status::FAULT) {
            return Err(fault.into_error());
        }
        Ok(status)
    }
}

impl Drop for ClosureState {
    fn drop(&mut self) {
        // Children still running when the closure goes away become background jobs.
        for pid in self.queue.drain(..) {
            self.detachables.push(pid);
        }
    }
}

// ---------------------------------------------------------------------------
// Closure
// ---------------------------------------------------------------------------

struct ClosureInner {
    state: RefCell<Box<ClosureState>>,
    // Field order is drop order: unregister before unmapping.
    _debug: DebugHandle,
    block: ExecBlock,
    // Host calls out of range of `block` jump through these.
    _trampolines: SharedTrampolines,
    entry: usize,
}

/// Reference-counted compiled command line.
///
/// Released (block unmapped, capture pipes closed, debug entry unregistered)
/// when the last clone is dropped.
#[derive(Clone)]
pub struct Closure {
    inner: Rc<ClosureInner>,
}

impl Closure {
    pub(crate) fn new(
        block: ExecBlock,
        entry: usize,
        slot_count: usize,
        detachables: Arc<Detachables>,
        trampolines: SharedTrampolines,
        debug: DebugHandle,
    ) -> Self {
        Self {
            inner: Rc::new(ClosureInner {
                state: RefCell::new(ClosureState::new(entry, slot_count, detachables)),
                _debug: debug,
                block,
                _trampolines: trampolines,
                entry,
            }),
        }
    }

    /// Runs until the next suspension point.
    ///
    /// Returns [`Status::CONTINUE`] while there is more to do (including
    /// children still running) and [`Status::REMOVE`] once the program ended.
    pub fn invoke(&self, runner: &mut dyn Runner) -> Result<Status, ClosureError> {
        self.inner.state.borrow_mut().invoke(runner)
    }

    /// Invokes until completion and returns the final condition flag.
    ///
    /// Sleeps `poll` between invocations that stopped at a running child.
    pub fn run_to_completion(
        &self,
        runner: &mut dyn Runner,
        poll: Duration,
    ) -> Result<i32, ClosureError> {
        loop {
            let status = self.invoke(runner)?;
            if status.contains(Status::REMOVE) {
                return Ok(self.status());
            }
            if self.is_waiting() {
                std::thread::sleep(poll);
            }
        }
    }

    /// Returns the condition flag (0 = success).
    pub fn status(&self) -> i32 {
        self.inner.state.borrow().status
    }

    /// Returns `true` when the last invocation stopped at a running child.
    pub fn is_waiting(&self) -> bool {
        self.inner.state.borrow().stalled
    }

    /// Returns the number of children in the wait queue.
    pub fn pending_children(&self) -> usize {
        self.inner.state.borrow().queue.len()
    }

    /// Returns the captured output of substitution `slot`.
    pub fn capture(&self, slot: usize) -> Option<String> {
        let state = self.inner.state.borrow();
        state
            .slots
            .get(slot)
            .map(|capture| capture.value.to_string_lossy().into_owned())
    }

    /// Returns the capture read ends currently held open.
    pub fn capture_fds(&self) -> Vec<RawFd> {
        let state = self.inner.state.borrow();
        state
            .slots
            .iter()
            .map(|capture| capture.fd)
            .filter(|fd| *fd >= 0)
            .collect()
    }

    /// Returns the address of the entry step.
    pub fn entry_address(&self) -> usize {
        self.inner.entry
    }

    /// Returns the address range of the executable block.
    pub fn code_range(&self) -> std::ops::Range<usize> {
        let block = &self.inner.block;
        block.base()..block.base() + block.len()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("entry", &format_args!("{:#x}", self.inner.entry))
            .field("block", &self.inner.block)
            .finish_non_exhaustive()
    }
}
