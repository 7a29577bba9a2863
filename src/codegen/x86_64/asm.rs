//! Minimal x86-64 instruction builder.
//!
//! Only the forms the step emitter needs: 64/32-bit moves through
//! `[base + disp32]`, RIP-relative `lea`, `rel32` calls and jumps, and frame
//! setup. Every tag reference is a 4-byte field at the very end of its
//! instruction, so the linker computes displacements from `at + 4`.

use std::collections::HashMap;

use crate::codegen::error::CodegenError;
use crate::ir::ids::Tag;

/// General purpose registers, numbered as in the ModRM encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
}

impl Reg {
    fn low(self) -> u8 {
        self as u8 & 7
    }

    fn extended(self) -> bool {
        self as u8 >= 8
    }
}

/// Condition codes for `jcc rel32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Zero,
    NotZero,
    Sign,
}

impl Cond {
    fn opcode(self) -> u8 {
        match self {
            Cond::Zero => 0x84,
            Cond::NotZero => 0x85,
            Cond::Sign => 0x88,
        }
    }
}

/// A `rel32` field waiting for its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reloc {
    /// Offset of the 4-byte field.
    pub at: usize,
    /// Tag the field refers to.
    pub target: Tag,
}

/// Growable code buffer with label bookkeeping.
#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<u8>,
    labels: HashMap<Tag, usize>,
    relocs: Vec<Reloc>,
}

impl Assembler {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current code offset.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Binds `tag` to the current offset.
    pub fn bind(&mut self, tag: Tag) -> Result<(), CodegenError> {
        if self.labels.insert(tag, self.code.len()).is_some() {
            return Err(CodegenError::encode(format!("label {tag} bound twice")));
        }
        Ok(())
    }

    /// Returns the encoded bytes.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Consumes the builder.
    pub fn finish(self) -> (Vec<u8>, HashMap<Tag, usize>, Vec<Reloc>) {
        (self.code, self.labels, self.relocs)
    }

    // -----------------------------------------------------------------------
    // Encoding helpers
    // -----------------------------------------------------------------------

    fn byte(&mut self, byte: u8) {
        self.code.push(byte);
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    fn imm32(&mut self, value: i32) {
        self.bytes(&value.to_le_bytes());
    }

    fn rel32(&mut self, target: Tag) {
        self.relocs.push(Reloc {
            at: self.code.len(),
            target,
        });
        self.imm32(0);
    }

    fn rex(&mut self, wide: bool, reg: u8, rm: u8) {
        let rex = 0x40 | (u8::from(wide) << 3) | ((reg >> 3) << 2) | (rm >> 3);
        if rex != 0x40 {
            self.byte(rex);
        }
    }

    /// `mod=10` ModRM (plus SIB for rsp-based) with a 32-bit displacement.
    fn mem(&mut self, reg: u8, base: Reg, disp: i32) {
        self.byte(0x80 | ((reg & 7) << 3) | base.low());
        if base.low() == Reg::Rsp.low() {
            self.byte(0x24);
        }
        self.imm32(disp);
    }

    fn direct(&mut self, reg: u8, rm: u8) {
        self.byte(0xC0 | ((reg & 7) << 3) | (rm & 7));
    }

    // -----------------------------------------------------------------------
    // Instructions
    // -----------------------------------------------------------------------

    /// `push reg`
    pub fn push(&mut self, reg: Reg) {
        if reg.extended() {
            self.byte(0x41);
        }
        self.byte(0x50 + reg.low());
    }

    /// `pop reg`
    pub fn pop(&mut self, reg: Reg) {
        if reg.extended() {
            self.byte(0x41);
        }
        self.byte(0x58 + reg.low());
    }

    /// `mov dst, src` (64-bit)
    pub fn mov_rr(&mut self, dst: Reg, src: Reg) {
        self.rex(true, src as u8, dst as u8);
        self.byte(0x89);
        self.direct(src as u8, dst as u8);
    }

    /// `mov dst, [base + disp]` (64-bit)
    pub fn load64(&mut self, dst: Reg, base: Reg, disp: i32) {
        self.rex(true, dst as u8, base as u8);
        self.byte(0x8B);
        self.mem(dst as u8, base, disp);
    }

    /// `mov dst, [base + disp]` (32-bit)
    pub fn load32(&mut self, dst: Reg, base: Reg, disp: i32) {
        self.rex(false, dst as u8, base as u8);
        self.byte(0x8B);
        self.mem(dst as u8, base, disp);
    }

    /// `mov [base + disp], src` (64-bit)
    pub fn store64(&mut self, base: Reg, disp: i32, src: Reg) {
        self.rex(true, src as u8, base as u8);
        self.byte(0x89);
        self.mem(src as u8, base, disp);
    }

    /// `mov [base + disp], src` (32-bit)
    pub fn store32(&mut self, base: Reg, disp: i32, src: Reg) {
        self.rex(false, src as u8, base as u8);
        self.byte(0x89);
        self.mem(src as u8, base, disp);
    }

    /// `mov qword [base + disp], imm32` (sign-extended)
    pub fn store64_imm(&mut self, base: Reg, disp: i32, imm: i32) {
        self.rex(true, 0, base as u8);
        self.byte(0xC7);
        self.mem(0, base, disp);
        self.imm32(imm);
    }

    /// `mov dword [base + disp], imm32`
    pub fn store32_imm(&mut self, base: Reg, disp: i32, imm: i32) {
        self.rex(false, 0, base as u8);
        self.byte(0xC7);
        self.mem(0, base, disp);
        self.imm32(imm);
    }

    /// `mov dst32, imm32` (zero-extends into the full register)
    pub fn mov_imm32(&mut self, dst: Reg, imm: u32) {
        if dst.extended() {
            self.byte(0x41);
        }
        self.byte(0xB8 + dst.low());
        self.bytes(&imm.to_le_bytes());
    }

    /// `xor reg32, reg32`
    pub fn zero(&mut self, reg: Reg) {
        self.rex(false, reg as u8, reg as u8);
        self.byte(0x31);
        self.direct(reg as u8, reg as u8);
    }

    /// `test a32, b32`
    pub fn test32(&mut self, a: Reg, b: Reg) {
        self.rex(false, b as u8, a as u8);
        self.byte(0x85);
        self.direct(b as u8, a as u8);
    }

    /// `lea dst, [base + disp]`
    pub fn lea(&mut self, dst: Reg, base: Reg, disp: i32) {
        self.rex(true, dst as u8, base as u8);
        self.byte(0x8D);
        self.mem(dst as u8, base, disp);
    }

    /// `lea dst, [rip + tag]`
    pub fn lea_tag(&mut self, dst: Reg, target: Tag) {
        self.rex(true, dst as u8, 0);
        self.byte(0x8D);
        self.byte(((dst.low()) << 3) | 0b101);
        self.rel32(target);
    }

    /// `sub rsp, imm32`
    pub fn sub_rsp(&mut self, imm: i32) {
        self.bytes(&[0x48, 0x81, 0xEC]);
        self.imm32(imm);
    }

    /// `call rel32`
    pub fn call(&mut self, target: Tag) {
        self.byte(0xE8);
        self.rel32(target);
    }

    /// `jmp rel32`
    pub fn jmp(&mut self, target: Tag) {
        self.byte(0xE9);
        self.rel32(target);
    }

    /// `jcc rel32`
    pub fn jcc(&mut self, cond: Cond, target: Tag) {
        self.bytes(&[0x0F, cond.opcode()]);
        self.rel32(target);
    }

    /// `leave`
    pub fn leave(&mut self) {
        self.byte(0xC9);
    }

    /// `ret`
    pub fn ret(&mut self) {
        self.byte(0xC3);
    }
}
