//! GDB JIT registration interface.
//!
//! Debuggers look up `__jit_debug_descriptor` and break on
//! `__jit_debug_register_code`; both names and the descriptor layout are
//! fixed by that protocol.

use std::ptr::{self, addr_of_mut};
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::trace;

const JIT_NOACTION: u32 = 0;
const JIT_REGISTER_FN: u32 = 1;
const JIT_UNREGISTER_FN: u32 = 2;

#[repr(C)]
pub struct JitCodeEntry {
    next_entry: *mut JitCodeEntry,
    prev_entry: *mut JitCodeEntry,
    symfile_addr: *const u8,
    symfile_size: u64,
}

#[repr(C)]
pub struct JitDescriptor {
    version: u32,
    action_flag: u32,
    relevant_entry: *mut JitCodeEntry,
    first_entry: *mut JitCodeEntry,
}

#[no_mangle]
#[allow(non_upper_case_globals)]
pub static mut __jit_debug_descriptor: JitDescriptor = JitDescriptor {
    version: 1,
    action_flag: JIT_NOACTION,
    relevant_entry: ptr::null_mut(),
    first_entry: ptr::null_mut(),
};

/// Breakpoint hook for debuggers.
#[no_mangle]
#[inline(never)]
pub extern "C" fn __jit_debug_register_code() {
    std::hint::black_box(());
}

/// Process-wide owner of the descriptor list.
#[derive(Debug)]
pub struct DebugRegistry {
    registered: Mutex<usize>,
}

impl DebugRegistry {
    /// Returns the registry shared by every engine in the process.
    pub fn global() -> &'static DebugRegistry {
        static REGISTRY: OnceLock<DebugRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| DebugRegistry {
            registered: Mutex::new(0),
        })
    }

    /// Publishes a symbol file until the returned handle is dropped.
    pub fn register(&'static self, symfile: Vec<u8>) -> Registration {
        let symfile = symfile.into_boxed_slice();
        let entry = Box::into_raw(Box::new(JitCodeEntry {
            next_entry: ptr::null_mut(),
            prev_entry: ptr::null_mut(),
            symfile_addr: symfile.as_ptr(),
            symfile_size: symfile.len() as u64,
        }));
        let mut count = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: the descriptor and every linked entry are only touched with
        // the registry lock held.
        unsafe {
            let descriptor = addr_of_mut!(__jit_debug_descriptor);
            let first = (*descriptor).first_entry;
            (*entry).next_entry = first;
            if !first.is_null() {
                (*first).prev_entry = entry;
            }
            (*descriptor).first_entry = entry;
            (*descriptor).relevant_entry = entry;
            (*descriptor).action_flag = JIT_REGISTER_FN;
            __jit_debug_register_code();
        }
        *count += 1;
        trace!(bytes = symfile.len(), "registered jit symbol file");
        Registration {
            registry: self,
            entry,
            symfile,
        }
    }

    /// Returns the number of live registrations.
    pub fn registered(&self) -> usize {
        *self.registered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` when `registration` is currently linked.
    pub fn is_linked(&self, registration: &Registration) -> bool {
        let _count = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: list walk under the registry lock.
        unsafe {
            let mut cursor = (*addr_of_mut!(__jit_debug_descriptor)).first_entry;
            while !cursor.is_null() {
                if cursor == registration.entry {
                    return true;
                }
                cursor = (*cursor).next_entry;
            }
        }
        false
    }

    fn unregister(&self, entry: *mut JitCodeEntry) {
        let mut count = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: `entry` was linked by `register` and is unlinked exactly once.
        unsafe {
            let descriptor = addr_of_mut!(__jit_debug_descriptor);
            let prev = (*entry).prev_entry;
            let next = (*entry).next_entry;
            if prev.is_null() {
                (*descriptor).first_entry = next;
            } else {
                (*prev).next_entry = next;
            }
            if !next.is_null() {
                (*next).prev_entry = prev;
            }
            (*descriptor).relevant_entry = entry;
            (*descriptor).action_flag = JIT_UNREGISTER_FN;
            __jit_debug_register_code();
            (*descriptor).relevant_entry = ptr::null_mut();
            drop(Box::from_raw(entry));
        }
        *count = count.saturating_sub(1);
        trace!("unregistered jit symbol file");
    }
}

/// A published symbol file. Unlinks itself on drop.
pub struct Registration {
    registry: &'static DebugRegistry,
    entry: *mut JitCodeEntry,
    symfile: Box<[u8]>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.entry);
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("entry", &self.entry)
            .field("bytes", &self.symfile.len())
            .finish()
    }
}
