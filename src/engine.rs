//! Compile service shared by every closure of one shell.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::codegen::{self, CodegenError, SharedTrampolines, TrampolineCache, WritableBlock};
use crate::ir::{verify_program, ChainProgram, CompileOptions, LoweringContext};
use crate::parser::ast::Scope;
use crate::runtime::{Closure, Detachables};

#[cfg(feature = "jit-debug")]
use crate::debug::DebugRegistry;

/// Owns the process-wide pieces compiled code depends on: the trampoline
/// cache, the background-job table and the debugger registration list.
#[derive(Debug)]
pub struct Engine {
    options: CompileOptions,
    trampolines: SharedTrampolines,
    detachables: Arc<Detachables>,
    #[cfg(feature = "jit-debug")]
    registry: Option<&'static DebugRegistry>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl Engine {
    /// Creates an engine with the given limits.
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            trampolines: Arc::new(Mutex::new(TrampolineCache::new())),
            detachables: Arc::new(Detachables::new()),
            #[cfg(feature = "jit-debug")]
            registry: Some(DebugRegistry::global()),
        }
    }

    /// Disables debugger registration for closures compiled from now on.
    #[cfg(feature = "jit-debug")]
    pub fn without_debug_registration(mut self) -> Self {
        self.registry = None;
        self
    }

    /// Returns the compile limits.
    pub fn options(&self) -> CompileOptions {
        self.options
    }

    /// Lowers and verifies `scope` without generating code.
    pub fn lower(&self, scope: &Scope) -> Result<ChainProgram, CodegenError> {
        let program = LoweringContext::new(self.options).lower(scope)?;
        verify_program(&program)?;
        Ok(program)
    }

    /// Compiles one parsed command line into a runnable closure.
    pub fn compile(&self, scope: &Scope) -> Result<Closure, CodegenError> {
        let program = self.lower(scope)?;
        self.compile_program(program)
    }

    /// Generates, links and maps an already lowered program.
    pub fn compile_program(&self, mut program: ChainProgram) -> Result<Closure, CodegenError> {
        let assembly = codegen::emit(&mut program)?;
        let mut block = WritableBlock::allocate(codegen::image_len(&assembly, &program.tags))?;
        let image = {
            let mut trampolines = self
                .trampolines
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            codegen::link(assembly, &program.tags, block.base(), &mut trampolines)?
        };
        block.write(&image.bytes)?;
        let block = block.finalize()?;
        let base = block.base();
        debug!(
            steps = program.steps.len(),
            code = image.code_len,
            data = image.bytes.len() - image.data_offset,
            base,
            "compiled command line"
        );

        #[cfg(feature = "jit-debug")]
        let debug_handle = self
            .registry
            .map(|registry| crate::debug::register(registry, &image, base));
        #[cfg(not(feature = "jit-debug"))]
        let debug_handle = ();

        Ok(Closure::new(
            block,
            base + image.entry_offset,
            program.slot_count as usize,
            Arc::clone(&self.detachables),
            Arc::clone(&self.trampolines),
            debug_handle,
        ))
    }

    /// Returns the background-job table.
    pub fn detachables(&self) -> &Arc<Detachables> {
        &self.detachables
    }

    /// Reaps finished background jobs without blocking.
    pub fn reap_detached(&self) -> Vec<(libc::pid_t, i32)> {
        self.detachables.reap()
    }

    /// Returns the number of trampolines built so far.
    pub fn trampoline_count(&self) -> usize {
        self.trampolines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
