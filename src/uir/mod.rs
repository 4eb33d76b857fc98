//! A small platform-neutral IR, organized into basic blocks.
//!
//! One lifted function is a vector of blocks linked by indices. The links
//! (fall-through and branch target) form a directed graph that is
//! frequently cyclic; storing indices into the block vector sidesteps the
//! ownership cycles that owned links would create.

pub mod lift;

use core::fmt;
use std::fmt::Write as _;

pub use self::lift::lift;
pub use crate::decode::Cond;

/// The IR operation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // data movement
    Mov,
    Load,
    Store,
    Push,
    Pop,
    Lea,
    Movzx,
    Movsx,
    // arithmetic
    Add,
    Sub,
    Mul,
    Imul,
    Div,
    Idiv,
    Neg,
    Inc,
    Dec,
    // logic
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Sar,
    // comparison
    Cmp,
    Test,
    // control flow
    Jmp,
    Jcc,
    Call,
    Ret,
    // port I/O
    PortIn,
    PortOut,
    // system
    Cli,
    Sti,
    Hlt,
    Nop,
}

impl Op {
    pub fn name(self) -> &'static str {
        use Op::*;
        match self {
            Mov => "mov",
            Load => "load",
            Store => "store",
            Push => "push",
            Pop => "pop",
            Lea => "lea",
            Movzx => "movzx",
            Movsx => "movsx",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Imul => "imul",
            Div => "div",
            Idiv => "idiv",
            Neg => "neg",
            Inc => "inc",
            Dec => "dec",
            And => "and",
            Or => "or",
            Xor => "xor",
            Not => "not",
            Shl => "shl",
            Shr => "shr",
            Sar => "sar",
            Cmp => "cmp",
            Test => "test",
            Jmp => "jmp",
            Jcc => "jcc",
            Call => "call",
            Ret => "ret",
            PortIn => "port-in",
            PortOut => "port-out",
            Cli => "cli",
            Sti => "sti",
            Hlt => "hlt",
            Nop => "nop",
        }
    }
}

/// An IR operand. Registers keep the machine numbering (EAX = 0 .. EDI = 7);
/// renumbering buys nothing while x86-32 is the only source ISA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(u8),
    Mem {
        base: Option<u8>,
        index: Option<u8>,
        scale: u8,
        disp: i32,
    },
    Imm(u32),
    /// Branch or call target address
    Target(u32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::Reg(reg) => write!(f, "{}", crate::decode::Reg(reg).name(4)),
            Operand::Mem {
                base,
                index,
                scale,
                disp,
            } => {
                write!(f, "[")?;
                let mut wrote = false;
                if let Some(base) = base {
                    write!(f, "{}", crate::decode::Reg(base).name(4))?;
                    wrote = true;
                }
                if let Some(index) = index {
                    if wrote {
                        write!(f, "+")?;
                    }
                    write!(f, "{}", crate::decode::Reg(index).name(4))?;
                    if scale > 1 {
                        write!(f, "*{}", scale)?;
                    }
                    wrote = true;
                }
                if disp != 0 || !wrote {
                    if !wrote {
                        write!(f, "{:#x}", disp as u32)?;
                    } else if disp < 0 {
                        write!(f, "-{:#x}", disp.unsigned_abs())?;
                    } else {
                        write!(f, "+{:#x}", disp)?;
                    }
                }
                write!(f, "]")
            }
            Operand::Imm(value) => write!(f, "{:#x}", value),
            Operand::Target(target) => write!(f, "{:#x}", target),
        }
    }
}

/// One IR instruction. At most one destination and two sources; the
/// original machine address is kept for traceability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inst {
    pub op: Op,
    pub dst: Option<Operand>,
    pub src1: Option<Operand>,
    pub src2: Option<Operand>,
    /// Access width in bytes
    pub width: u8,
    /// Machine address this instruction was lifted from
    pub addr: u32,
    /// Condition code, used by `Jcc`
    pub cond: Option<Cond>,
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.op, self.cond) {
            (Op::Jcc, Some(cond)) => write!(f, "jcc.{}", cond.suffix())?,
            _ => write!(f, "{}", self.op.name())?,
        }
        let mut first = true;
        for operand in [self.dst, self.src1, self.src2].into_iter().flatten() {
            if first {
                write!(f, " {}", operand)?;
                first = false;
            } else {
                write!(f, ", {}", operand)?;
            }
        }
        Ok(())
    }
}

/// A maximal straight-line run of IR instructions with at most two exits.
#[derive(Debug, Clone)]
pub struct Block {
    /// Address of the first instruction
    pub start: u32,
    pub insts: Vec<Inst>,
    /// Index of the block control falls into, if any
    pub fall_through: Option<usize>,
    /// Index of the branch-target block, if any
    pub branch: Option<usize>,
    /// Whether this block is the function entry
    pub is_entry: bool,
}

impl Block {
    fn new(start: u32, is_entry: bool) -> Self {
        Block {
            start,
            insts: Vec::new(),
            fall_through: None,
            branch: None,
            is_entry,
        }
    }
}

/// A lifted function: its blocks plus summaries of the port traffic seen
/// while lifting.
#[derive(Debug, Clone)]
pub struct Function {
    /// Entry address
    pub entry: u32,
    pub blocks: Vec<Block>,
    /// Ports read through immediate-port IN, sorted and deduplicated
    pub ports_read: Vec<u16>,
    /// Ports written through immediate-port OUT, sorted and deduplicated
    pub ports_written: Vec<u16>,
    /// Any port traffic at all, including DX-relative
    pub has_port_io: bool,
    /// At least one port operation addressed its port through DX, so the
    /// port value is not statically known
    pub dynamic_port: bool,
}

impl Function {
    /// Render the function in the `uir` listing format: a port-I/O
    /// summary header, then each block with its instructions and
    /// successor links.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "function @ {:#x}", self.entry);
        if self.has_port_io {
            if !self.ports_read.is_empty() {
                let _ = writeln!(out, "  ports read: {}", join_ports(&self.ports_read));
            }
            if !self.ports_written.is_empty() {
                let _ = writeln!(out, "  ports written: {}", join_ports(&self.ports_written));
            }
            if self.dynamic_port {
                let _ = writeln!(out, "  dynamic port access via dx");
            }
        } else {
            let _ = writeln!(out, "  no port i/o");
        }
        for (i, block) in self.blocks.iter().enumerate() {
            let _ = writeln!(out, "block_{} @ {:#x}:", i, block.start);
            for inst in &block.insts {
                let _ = writeln!(out, "  {:08x}: {}", inst.addr, inst);
            }
            if let Some(fall) = block.fall_through {
                let _ = writeln!(out, "  -> fall_through: block_{}", fall);
            }
            if let Some(branch) = block.branch {
                let _ = writeln!(out, "  -> branch: block_{}", branch);
            }
        }
        out
    }
}

fn join_ports(ports: &[u16]) -> String {
    let mut out = String::new();
    for (i, port) in ports.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{:#x}", port);
    }
    out
}
