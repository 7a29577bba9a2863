//! Chain step emitter.
//!
//! Every step is a function with the step ABI
//! `(closure: rdi, runner: rsi, fault: rdx) -> eax`. Steps that call out
//! build an `rbp` frame; leaf steps (`Pass`, `Terminal`, `Test`) do not.
//! A `Test` step tail-jumps into the selected successor with the incoming
//! arguments untouched.

use std::collections::HashMap;
use std::ops::Range;

use crate::codegen::error::CodegenError;
use crate::codegen::symbols;
use crate::codegen::x86_64::asm::{Assembler, Cond, Reg, Reloc};
use crate::ir::chain::{
    Argument, Branch, InvokeDescriptor, InvokeTarget, PipelineStep, StdTarget, StepKind,
};
use crate::ir::ids::Tag;
use crate::ir::program::ChainProgram;
use crate::ir::tags::TagTable;
use crate::parser::ast::Builtin;
use crate::runtime::closure::{EXPANSIONS_OFFSET, NEXT_OFFSET, STATUS_OFFSET};
use crate::runtime::error::FaultKind;
use crate::runtime::Status;

/// Position-independent code plus everything the linker needs.
#[derive(Debug)]
pub struct Assembly {
    /// Machine code.
    pub code: Vec<u8>,
    /// Code offset of every bound tag.
    pub labels: HashMap<Tag, usize>,
    /// Pending `rel32` fields.
    pub relocs: Vec<Reloc>,
    /// Code range of each step, in layout order.
    pub steps: Vec<(Tag, Range<usize>)>,
    /// Entry step.
    pub entry: Tag,
}

/// Emits every step of `program`. Local labels and symbol references are
/// allocated in the program's tag table.
pub fn emit(program: &mut ChainProgram) -> Result<Assembly, CodegenError> {
    let ChainProgram {
        entry, steps, tags, ..
    } = program;
    let mut emitter = Emitter {
        asm: Assembler::new(),
        tags,
    };
    let mut ranges = Vec::with_capacity(steps.len());
    for step in steps.iter() {
        let start = emitter.asm.offset();
        emitter.asm.bind(step.tag)?;
        emitter.step(&step.kind)?;
        ranges.push((step.tag, start..emitter.asm.offset()));
    }
    let (code, labels, relocs) = emitter.asm.finish();
    Ok(Assembly {
        code,
        labels,
        relocs,
        steps: ranges,
        entry: *entry,
    })
}

// ---------------------------------------------------------------------------
// Frame layout
// ---------------------------------------------------------------------------

const CLOSURE: i32 = -8;
const RUNNER: i32 = -16;
const FAULT: i32 = -24;
const SCRATCH: i32 = -32;
const FIXED: i32 = 32;

/// `rbp`-relative slots of a pipeline step.
///
/// Below the four fixed slots: one qword per pipe (`[read, write]` as two
/// `c_int`), one qword per child pid, then the argv array at the bottom.
#[derive(Debug, Clone, Copy)]
struct Frame {
    pipes: i32,
    size: i32,
}

impl Frame {
    fn fixed() -> Self {
        Self {
            pipes: 0,
            size: FIXED,
        }
    }

    fn for_pipeline(pipeline: &PipelineStep) -> Self {
        let argv = pipeline
            .commands
            .iter()
            .map(|command| command.arguments.len() + 2)
            .max()
            .unwrap_or(1) as i32;
        let pipes = pipeline.pipes as i32;
        let children = pipeline.commands.len() as i32;
        let raw = FIXED + 8 * pipes + 8 * children + 8 * argv;
        Self {
            pipes,
            size: (raw + 15) & !15,
        }
    }

    fn pipe(self, index: u32) -> i32 {
        -FIXED - 8 * (index as i32 + 1)
    }

    fn pid(self, index: usize) -> i32 {
        -FIXED - 8 * self.pipes - 8 * (index as i32 + 1)
    }

    fn argv(self, index: usize) -> i32 {
        -self.size + 8 * index as i32
    }
}

fn fault_code(kind: FaultKind) -> u32 {
    kind as u32
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

struct Emitter<'p> {
    asm: Assembler,
    tags: &'p mut TagTable,
}

impl Emitter<'_> {
    fn step(&mut self, kind: &StepKind) -> Result<(), CodegenError> {
        match kind {
            StepKind::Invoke { pipeline, next } => self.invoke(pipeline, *next),
            StepKind::Test(branch) => {
                self.test(*branch);
                Ok(())
            }
            StepKind::Pass { next } => {
                self.asm.lea_tag(Reg::Rax, *next);
                self.asm.store64(Reg::Rdi, NEXT_OFFSET, Reg::Rax);
                self.asm.mov_imm32(Reg::Rax, Status::CONTINUE.bits());
                self.asm.ret();
                Ok(())
            }
            StepKind::Terminal => {
                self.asm.mov_imm32(Reg::Rax, Status::REMOVE.bits());
                self.asm.ret();
                Ok(())
            }
            StepKind::Detach { entry, next } => self.detach(*entry, *next),
            StepKind::Unimplemented { builtin, .. } => self.unimplemented(*builtin),
        }
    }

    fn fresh(&mut self) -> Result<Tag, CodegenError> {
        Ok(self.tags.fresh()?)
    }

    fn call(&mut self, name: &str) -> Result<(), CodegenError> {
        let tag = self.tags.symbol(name)?;
        self.asm.call(tag);
        Ok(())
    }

    fn prologue(&mut self, frame: Frame) {
        self.asm.push(Reg::Rbp);
        self.asm.mov_rr(Reg::Rbp, Reg::Rsp);
        self.asm.sub_rsp(frame.size);
        self.asm.store64(Reg::Rbp, CLOSURE, Reg::Rdi);
        self.asm.store64(Reg::Rbp, RUNNER, Reg::Rsi);
        self.asm.store64(Reg::Rbp, FAULT, Reg::Rdx);
    }

    fn reset_status(&mut self) {
        self.asm.load64(Reg::Rdi, Reg::Rbp, CLOSURE);
        self.asm.store32_imm(Reg::Rdi, STATUS_OFFSET, 0);
    }

    /// Stores `next` as the continuation and returns CONTINUE from a framed step.
    fn continue_with(&mut self, next: Tag) {
        self.asm.load64(Reg::Rdi, Reg::Rbp, CLOSURE);
        self.asm.lea_tag(Reg::Rax, next);
        self.asm.store64(Reg::Rdi, NEXT_OFFSET, Reg::Rax);
        self.leave_with(Status::CONTINUE);
    }

    fn leave_with(&mut self, status: Status) {
        self.asm.mov_imm32(Reg::Rax, status.bits());
        self.asm.leave();
        self.asm.ret();
    }

    /// Records `kind` with the current errno.
    fn record_fault(&mut self, kind: FaultKind) -> Result<(), CodegenError> {
        self.asm.load64(Reg::Rdi, Reg::Rbp, FAULT);
        self.asm.mov_imm32(Reg::Rsi, fault_code(kind));
        self.call(symbols::FAULT)
    }

    fn load_argument(&mut self, dst: Reg, argument: Argument) {
        match argument {
            Argument::Literal(tag) => self.asm.lea_tag(dst, tag),
            Argument::Expansion(slot) => {
                self.asm.load64(dst, Reg::Rbp, CLOSURE);
                self.asm.load64(dst, dst, EXPANSIONS_OFFSET);
                self.asm.load64(dst, dst, 8 * slot.value() as i32);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Control steps
    // -----------------------------------------------------------------------

    fn test(&mut self, branch: Branch) {
        match branch {
            Branch::Chain(target) => self.asm.jmp(target),
            Branch::If { direct, reverse } => {
                self.asm.load32(Reg::Rax, Reg::Rdi, STATUS_OFFSET);
                self.asm.test32(Reg::Rax, Reg::Rax);
                self.asm.jcc(Cond::NotZero, reverse);
                self.asm.jmp(direct);
            }
        }
    }

    fn unimplemented(&mut self, builtin: Builtin) -> Result<(), CodegenError> {
        self.asm.push(Reg::Rbp);
        self.asm.mov_rr(Reg::Rbp, Reg::Rsp);
        self.asm.mov_rr(Reg::Rdi, Reg::Rdx);
        self.asm.mov_imm32(Reg::Rsi, builtin.id());
        self.call(symbols::UNIMPLEMENTED)?;
        self.asm.pop(Reg::Rbp);
        self.asm.ret();
        Ok(())
    }

    fn detach(&mut self, entry: Tag, next: Tag) -> Result<(), CodegenError> {
        let child = self.fresh()?;
        let failed = self.fresh()?;
        self.prologue(Frame::fixed());
        self.reset_status();
        self.call(symbols::FORK)?;
        self.asm.test32(Reg::Rax, Reg::Rax);
        self.asm.jcc(Cond::Sign, failed);
        self.asm.jcc(Cond::Zero, child);
        self.asm.load64(Reg::Rdi, Reg::Rbp, CLOSURE);
        self.asm.mov_rr(Reg::Rsi, Reg::Rax);
        self.call(symbols::DETACH)?;
        self.continue_with(next);

        self.asm.bind(failed)?;
        self.record_fault(FaultKind::Fork)?;
        self.leave_with(Status::FAULT);

        self.asm.bind(child)?;
        self.asm.load64(Reg::Rdi, Reg::Rbp, CLOSURE);
        self.asm.load64(Reg::Rsi, Reg::Rbp, RUNNER);
        self.asm.lea_tag(Reg::Rdx, entry);
        self.call(symbols::RUN_NESTED)
    }

    // -----------------------------------------------------------------------
    // Invocations
    // -----------------------------------------------------------------------

    fn invoke(&mut self, pipeline: &PipelineStep, next: Tag) -> Result<(), CodegenError> {
        if let [command] = pipeline.commands.as_slice() {
            if pipeline.pipes == 0 && !pipeline.detached {
                match command.target {
                    InvokeTarget::Builtin(Builtin::Cd) => {
                        return self.cd(pipeline, command, next);
                    }
                    InvokeTarget::Builtin(Builtin::Exit) => return self.exit(pipeline, command),
                    _ => {}
                }
            }
        }
        self.pipeline(pipeline, next)
    }

    /// Runs the captures of a step; any failure jumps to `failed` with the
    /// fault already recorded.
    fn captures(&mut self, pipeline: &PipelineStep, failed: Tag) -> Result<(), CodegenError> {
        for capture in &pipeline.captures {
            self.asm.load64(Reg::Rdi, Reg::Rbp, CLOSURE);
            self.asm.load64(Reg::Rsi, Reg::Rbp, RUNNER);
            self.asm.load64(Reg::Rdx, Reg::Rbp, FAULT);
            self.asm.mov_imm32(Reg::Rcx, capture.slot.value());
            self.asm.lea_tag(Reg::R8, capture.entry);
            self.call(symbols::CAPTURE)?;
            self.asm.test32(Reg::Rax, Reg::Rax);
            self.asm.jcc(Cond::NotZero, failed);
        }
        Ok(())
    }

    fn cd(
        &mut self,
        pipeline: &PipelineStep,
        command: &InvokeDescriptor,
        next: Tag,
    ) -> Result<(), CodegenError> {
        let failed = self.fresh()?;
        let done = self.fresh()?;
        let report = self.fresh()?;
        let fork_failed = self.fresh()?;
        self.prologue(Frame::fixed());
        self.reset_status();
        self.captures(pipeline, failed)?;

        self.asm.load64(Reg::Rdi, Reg::Rbp, RUNNER);
        self.load_path(Reg::Rsi, command);
        self.call(symbols::CD)?;
        self.asm.test32(Reg::Rax, Reg::Rax);
        self.asm.jcc(Cond::Zero, done);
        self.asm.store32(Reg::Rbp, SCRATCH, Reg::Rax);
        self.call(symbols::FORK)?;
        self.asm.test32(Reg::Rax, Reg::Rax);
        self.asm.jcc(Cond::Sign, fork_failed);
        self.asm.jcc(Cond::Zero, report);
        self.asm.load64(Reg::Rdi, Reg::Rbp, CLOSURE);
        self.asm.mov_rr(Reg::Rsi, Reg::Rax);
        self.call(symbols::ENQUEUE)?;
        self.asm.bind(done)?;
        self.continue_with(next);

        self.asm.bind(fork_failed)?;
        self.record_fault(FaultKind::Fork)?;
        self.asm.bind(failed)?;
        self.leave_with(Status::FAULT);

        self.asm.bind(report)?;
        self.load_path(Reg::Rdi, command);
        self.asm.load32(Reg::Rsi, Reg::Rbp, SCRATCH);
        self.call(symbols::CD_REPORT)
    }

    fn exit(
        &mut self,
        pipeline: &PipelineStep,
        command: &InvokeDescriptor,
    ) -> Result<(), CodegenError> {
        let failed = self.fresh()?;
        self.prologue(Frame::fixed());
        self.captures(pipeline, failed)?;
        self.asm.load64(Reg::Rdi, Reg::Rbp, CLOSURE);
        self.asm.load64(Reg::Rsi, Reg::Rbp, RUNNER);
        self.asm.load64(Reg::Rdx, Reg::Rbp, FAULT);
        self.load_path(Reg::Rcx, command);
        self.call(symbols::EXIT_BUILTIN)?;
        self.asm.leave();
        self.asm.ret();

        self.asm.bind(failed)?;
        self.leave_with(Status::FAULT);
        Ok(())
    }

    /// Loads the first argument of `command`, or a null pointer.
    fn load_path(&mut self, dst: Reg, command: &InvokeDescriptor) {
        match command.arguments.first() {
            Some(argument) => self.load_argument(dst, *argument),
            None => self.asm.zero(dst),
        }
    }

    fn pipeline(&mut self, pipeline: &PipelineStep, next: Tag) -> Result<(), CodegenError> {
        let frame = Frame::for_pipeline(pipeline);
        let cleanup = self.fresh()?;
        let pipe_failed = self.fresh()?;
        let fork_failed = self.fresh()?;
        let children = (0..pipeline.commands.len())
            .map(|_| self.fresh())
            .collect::<Result<Vec<_>, _>>()?;

        self.prologue(frame);
        self.reset_status();
        for index in 0..pipeline.pipes {
            self.asm.store64_imm(Reg::Rbp, frame.pipe(index), -1);
        }
        for index in 0..pipeline.commands.len() {
            self.asm.store64_imm(Reg::Rbp, frame.pid(index), 0);
        }
        self.captures(pipeline, cleanup)?;

        for index in 0..pipeline.pipes {
            self.asm.lea(Reg::Rdi, Reg::Rbp, frame.pipe(index));
            self.call(symbols::PIPE)?;
            self.asm.test32(Reg::Rax, Reg::Rax);
            self.asm.jcc(Cond::Sign, pipe_failed);
        }
        for (index, child) in children.iter().enumerate() {
            self.call(symbols::FORK)?;
            self.asm.test32(Reg::Rax, Reg::Rax);
            self.asm.jcc(Cond::Sign, fork_failed);
            self.asm.jcc(Cond::Zero, *child);
            self.asm.store32(Reg::Rbp, frame.pid(index), Reg::Rax);
        }
        self.close_pipes(frame)?;
        let register = if pipeline.detached {
            symbols::DETACH
        } else {
            symbols::ENQUEUE
        };
        for index in 0..pipeline.commands.len() {
            self.asm.load64(Reg::Rdi, Reg::Rbp, CLOSURE);
            self.asm.load32(Reg::Rsi, Reg::Rbp, frame.pid(index));
            self.call(register)?;
        }
        self.continue_with(next);

        self.asm.bind(pipe_failed)?;
        self.record_fault(FaultKind::Pipe)?;
        self.asm.jmp(cleanup);
        self.asm.bind(fork_failed)?;
        self.record_fault(FaultKind::Fork)?;
        self.asm.bind(cleanup)?;
        self.close_pipes(frame)?;
        for index in 0..pipeline.commands.len() {
            self.asm.load32(Reg::Rdi, Reg::Rbp, frame.pid(index));
            self.call(symbols::REAP_BLOCKING)?;
        }
        self.leave_with(Status::FAULT);

        for (command, child) in pipeline.commands.iter().zip(children) {
            self.asm.bind(child)?;
            self.child(frame, command)?;
        }
        Ok(())
    }

    fn close_pipes(&mut self, frame: Frame) -> Result<(), CodegenError> {
        for index in 0..frame.pipes as u32 {
            self.asm.lea(Reg::Rdi, Reg::Rbp, frame.pipe(index));
            self.call(symbols::CLOSE_PAIR)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Child side
    // -----------------------------------------------------------------------

    /// Code run by the forked child of one command. Never returns.
    fn child(&mut self, frame: Frame, command: &InvokeDescriptor) -> Result<(), CodegenError> {
        let dup2_failed = self.fresh()?;
        let mut open_failures = Vec::new();

        let bindings = [
            (libc::STDIN_FILENO, command.stdin, 0),
            (libc::STDOUT_FILENO, command.stdout, 4),
        ];
        for (fd, binding, end) in bindings {
            match binding {
                None => {}
                Some(StdTarget::File { path, mode }) => {
                    let open_failed = self.fresh()?;
                    open_failures.push((open_failed, path));
                    self.load_argument(Reg::Rdi, path);
                    self.asm.mov_imm32(Reg::Rsi, mode.flags() as u32);
                    self.asm.mov_imm32(Reg::Rdx, 0o644);
                    self.asm.zero(Reg::Rax);
                    self.call(symbols::OPEN)?;
                    self.asm.test32(Reg::Rax, Reg::Rax);
                    self.asm.jcc(Cond::Sign, open_failed);
                    self.asm.store32(Reg::Rbp, SCRATCH, Reg::Rax);
                    self.asm.mov_rr(Reg::Rdi, Reg::Rax);
                    self.asm.mov_imm32(Reg::Rsi, fd as u32);
                    self.call(symbols::DUP2)?;
                    self.asm.test32(Reg::Rax, Reg::Rax);
                    self.asm.jcc(Cond::Sign, dup2_failed);
                    self.asm.load32(Reg::Rdi, Reg::Rbp, SCRATCH);
                    self.call(symbols::CLOSE)?;
                }
                Some(StdTarget::PipeEnd(index)) => {
                    self.asm.load32(Reg::Rdi, Reg::Rbp, frame.pipe(index) + end);
                    self.asm.mov_imm32(Reg::Rsi, fd as u32);
                    self.call(symbols::DUP2)?;
                    self.asm.test32(Reg::Rax, Reg::Rax);
                    self.asm.jcc(Cond::Sign, dup2_failed);
                }
            }
        }
        self.close_pipes(frame)?;

        match command.target {
            InvokeTarget::Builtin(Builtin::True) => {
                self.asm.mov_imm32(Reg::Rdi, 0);
                self.call(symbols::EXIT)?;
            }
            InvokeTarget::Builtin(Builtin::False) => {
                self.asm.mov_imm32(Reg::Rdi, 1);
                self.call(symbols::EXIT)?;
            }
            InvokeTarget::Builtin(builtin) => {
                let name = self.tags.literal(builtin.name())?;
                self.build_argv(frame, Argument::Literal(name), &command.arguments);
                self.asm.mov_imm32(Reg::Rdi, builtin.id());
                self.asm.lea(Reg::Rsi, Reg::Rbp, frame.argv(0));
                self.call(symbols::CHILD_BUILTIN)?;
            }
            InvokeTarget::Program(program) => {
                self.build_argv(frame, program, &command.arguments);
                self.load_argument(Reg::Rdi, program);
                self.asm.lea(Reg::Rsi, Reg::Rbp, frame.argv(0));
                self.call(symbols::EXECVP)?;
                self.asm.mov_imm32(Reg::Rdi, fault_code(FaultKind::Execvp));
                self.load_argument(Reg::Rsi, program);
                self.call(symbols::CHILD_FAIL)?;
            }
        }

        for (label, path) in open_failures {
            self.asm.bind(label)?;
            self.asm.mov_imm32(Reg::Rdi, fault_code(FaultKind::Open));
            self.load_argument(Reg::Rsi, path);
            self.call(symbols::CHILD_FAIL)?;
        }
        self.asm.bind(dup2_failed)?;
        self.asm.mov_imm32(Reg::Rdi, fault_code(FaultKind::Dup2));
        self.asm.zero(Reg::Rsi);
        self.call(symbols::CHILD_FAIL)
    }

    fn build_argv(&mut self, frame: Frame, first: Argument, rest: &[Argument]) {
        let all = std::iter::once(first).chain(rest.iter().copied());
        let mut count = 0;
        for (index, argument) in all.enumerate() {
            self.load_argument(Reg::Rax, argument);
            self.asm.store64(Reg::Rbp, frame.argv(index), Reg::Rax);
            count = index + 1;
        }
        self.asm.store64_imm(Reg::Rbp, frame.argv(count), 0);
    }
}
