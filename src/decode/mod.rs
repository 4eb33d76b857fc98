//! A variable-length x86-32 instruction decoder.
//!
//! Coverage targets driver-relevant code, not the whole ISA: data
//! movement, the ALU block, shifts, control flow, port I/O in all four
//! encodings, and the handful of system instructions kernel drivers use.
//! Anything else decodes to [`Mnemonic::Unknown`] with its consumed
//! length rather than an error, so one exotic instruction never sinks a
//! whole section.

pub mod fmt;
pub mod inst;
mod modrm;

use log::debug;
use scroll::Pread;

use crate::error;

pub use self::inst::{Cond, Inst, MemOperand, Mnemonic, Operand, Prefixes, Reg};

/// Longest legal x86 instruction.
pub const MAX_INST_LEN: usize = 15;

/// Bounds-checked byte cursor over the instruction stream. Running off
/// the end surfaces as [`error::Error::TruncatedInstruction`] carrying
/// the offset of the instruction being decoded.
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    start: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8], start: usize) -> Self {
        Cursor {
            bytes,
            pos: start,
            start,
        }
    }

    fn truncated(&self) -> error::Error {
        error::Error::TruncatedInstruction { offset: self.start }
    }

    pub(crate) fn u8(&mut self) -> error::Result<u8> {
        self.bytes
            .gread_with(&mut self.pos, scroll::LE)
            .map_err(|_| self.truncated())
    }

    pub(crate) fn u16(&mut self) -> error::Result<u16> {
        self.bytes
            .gread_with(&mut self.pos, scroll::LE)
            .map_err(|_| self.truncated())
    }

    pub(crate) fn u32(&mut self) -> error::Result<u32> {
        self.bytes
            .gread_with(&mut self.pos, scroll::LE)
            .map_err(|_| self.truncated())
    }

    pub(crate) fn i8(&mut self) -> error::Result<i8> {
        self.u8().map(|byte| byte as i8)
    }

    pub(crate) fn i32(&mut self) -> error::Result<i32> {
        self.u32().map(|word| word as i32)
    }
}

/// Group-1 ALU operations selected by ModR/M.reg for opcodes 0x80-0x83.
const GROUP1: [Mnemonic; 8] = [
    Mnemonic::Add,
    Mnemonic::Or,
    Mnemonic::Adc,
    Mnemonic::Sbb,
    Mnemonic::And,
    Mnemonic::Sub,
    Mnemonic::Xor,
    Mnemonic::Cmp,
];

/// Shift/rotate operations selected by ModR/M.reg for 0xC0/0xC1/0xD0-0xD3.
/// RCL/RCR are left unknown.
const SHIFT_GROUP: [Mnemonic; 8] = [
    Mnemonic::Rol,
    Mnemonic::Ror,
    Mnemonic::Unknown,
    Mnemonic::Unknown,
    Mnemonic::Shl,
    Mnemonic::Shr,
    Mnemonic::Shl,
    Mnemonic::Sar,
];

/// Unary operations selected by ModR/M.reg for 0xF6/0xF7. Selectors 0 and
/// 1 are TEST with a trailing immediate.
const UNARY_GROUP: [Mnemonic; 8] = [
    Mnemonic::Test,
    Mnemonic::Test,
    Mnemonic::Not,
    Mnemonic::Neg,
    Mnemonic::Mul,
    Mnemonic::Imul,
    Mnemonic::Div,
    Mnemonic::Idiv,
];

/// INC/DEC/CALL/JMP/PUSH group selected by ModR/M.reg for 0xFF.
const FF_GROUP: [Mnemonic; 8] = [
    Mnemonic::Inc,
    Mnemonic::Dec,
    Mnemonic::Call,
    Mnemonic::Unknown,
    Mnemonic::Jmp,
    Mnemonic::Unknown,
    Mnemonic::Push,
    Mnemonic::Unknown,
];

fn alu_mnemonic(row: u8) -> Mnemonic {
    GROUP1[(row & 7) as usize]
}

struct Builder {
    vaddr: u32,
    mnemonic: Mnemonic,
    cond: Option<Cond>,
    operands: Vec<Operand>,
    width: u8,
}

impl Builder {
    fn new(vaddr: u32, width: u8) -> Self {
        Builder {
            vaddr,
            mnemonic: Mnemonic::Unknown,
            cond: None,
            operands: Vec::new(),
            width,
        }
    }

    fn finish(self, prefixes: Prefixes, cur: &Cursor<'_>) -> Inst {
        Inst {
            addr: self.vaddr,
            len: (cur.pos - cur.start) as u8,
            mnemonic: self.mnemonic,
            cond: self.cond,
            prefixes,
            operands: self.operands,
            width: self.width,
        }
    }

    /// Absolute target of a relative branch whose displacement was the
    /// instruction's final field.
    fn rel_target(&self, cur: &Cursor<'_>, disp: i32) -> Operand {
        let end = self
            .vaddr
            .wrapping_add((cur.pos - cur.start) as u32);
        Operand::Rel {
            target: end.wrapping_add(disp as u32),
        }
    }

    fn reg(&mut self, reg: Reg, width: u8) {
        self.operands.push(Operand::Reg { reg, width });
    }

    fn imm(&mut self, value: u32, width: u8) {
        self.operands.push(Operand::Imm { value, width });
    }
}

/// Decode one instruction starting at `bytes[*offset]`, which sits at
/// virtual address `vaddr`.
///
/// Returns `Ok(None)` on clean end-of-input and
/// [`error::Error::TruncatedInstruction`] when the buffer ends inside an
/// instruction; the two are deliberately distinct outcomes. On success,
/// `*offset` advances by the instruction's length (always at least one).
pub fn decode_one(bytes: &[u8], offset: &mut usize, vaddr: u32) -> error::Result<Option<Inst>> {
    if *offset >= bytes.len() {
        return Ok(None);
    }
    let mut cur = Cursor::new(bytes, *offset);
    let mut prefixes = Prefixes::default();

    let opcode = loop {
        let byte = cur.u8()?;
        match byte {
            0xf3 => prefixes.rep = true,
            0xf2 => prefixes.repne = true,
            0xf0 => prefixes.lock = true,
            0x66 => prefixes.operand_size = true,
            0x67 => prefixes.address_size = true,
            0x26 | 0x2e | 0x36 | 0x3e | 0x64 | 0x65 => prefixes.segment = Some(byte),
            _ => break byte,
        }
        if cur.pos - cur.start >= MAX_INST_LEN {
            // degenerate all-prefix run; emit an unknown of maximal length
            let unknown = Builder::new(vaddr, 4).finish(prefixes, &cur);
            *offset = cur.pos;
            return Ok(Some(unknown));
        }
    };

    // The operand-size override drops the default width to 16-bit.
    let width: u8 = if prefixes.operand_size { 2 } else { 4 };
    let mut b = Builder::new(vaddr, width);

    match opcode {
        0x0f => decode_two_byte(&mut cur, &mut b)?,

        // The ALU block: ADD/OR/ADC/SBB/AND/SUB/XOR/CMP, six encodings each.
        op if op < 0x40 && (op & 7) < 6 => {
            b.mnemonic = alu_mnemonic(op >> 3);
            match op & 7 {
                0 => {
                    let (reg, rm) = modrm::decode_rm(&mut cur, 1)?;
                    b.operands.push(rm);
                    b.reg(Reg(reg), 1);
                    b.width = 1;
                }
                1 => {
                    let (reg, rm) = modrm::decode_rm(&mut cur, width)?;
                    b.operands.push(rm);
                    b.reg(Reg(reg), width);
                }
                2 => {
                    let (reg, rm) = modrm::decode_rm(&mut cur, 1)?;
                    b.reg(Reg(reg), 1);
                    b.operands.push(rm);
                    b.width = 1;
                }
                3 => {
                    let (reg, rm) = modrm::decode_rm(&mut cur, width)?;
                    b.reg(Reg(reg), width);
                    b.operands.push(rm);
                }
                4 => {
                    b.reg(Reg::EAX, 1);
                    let imm = cur.u8()?;
                    b.imm(u32::from(imm), 1);
                    b.width = 1;
                }
                _ => {
                    b.reg(Reg::EAX, width);
                    let imm = read_imm(&mut cur, width)?;
                    b.imm(imm, width);
                }
            }
        }

        0x40..=0x47 => {
            b.mnemonic = Mnemonic::Inc;
            b.reg(Reg(opcode - 0x40), width);
        }
        0x48..=0x4f => {
            b.mnemonic = Mnemonic::Dec;
            b.reg(Reg(opcode - 0x48), width);
        }
        0x50..=0x57 => {
            b.mnemonic = Mnemonic::Push;
            b.reg(Reg(opcode - 0x50), width);
        }
        0x58..=0x5f => {
            b.mnemonic = Mnemonic::Pop;
            b.reg(Reg(opcode - 0x58), width);
        }
        0x60 => b.mnemonic = Mnemonic::Pushad,
        0x61 => b.mnemonic = Mnemonic::Popad,

        0x68 => {
            b.mnemonic = Mnemonic::Push;
            let imm = read_imm(&mut cur, width)?;
            b.imm(imm, width);
        }
        0x69 => {
            b.mnemonic = Mnemonic::Imul;
            let (reg, rm) = modrm::decode_rm(&mut cur, width)?;
            b.reg(Reg(reg), width);
            b.operands.push(rm);
            let imm = read_imm(&mut cur, width)?;
            b.imm(imm, width);
        }
        0x6a => {
            b.mnemonic = Mnemonic::Push;
            let imm = cur.i8()?;
            b.imm(imm as i32 as u32, 1);
        }
        0x6b => {
            b.mnemonic = Mnemonic::Imul;
            let (reg, rm) = modrm::decode_rm(&mut cur, width)?;
            b.reg(Reg(reg), width);
            b.operands.push(rm);
            let imm = cur.i8()?;
            b.imm(imm as i32 as u32, 1);
        }

        0x70..=0x7f => {
            b.mnemonic = Mnemonic::Jcc;
            b.cond = Some(Cond::from_bits(opcode));
            let disp = cur.i8()?;
            let target = b.rel_target(&cur, i32::from(disp));
            b.operands.push(target);
        }

        0x80 => {
            let (sel, rm) = modrm::decode_rm(&mut cur, 1)?;
            b.mnemonic = GROUP1[sel as usize];
            b.operands.push(rm);
            let imm = cur.u8()?;
            b.imm(u32::from(imm), 1);
            b.width = 1;
        }
        0x81 => {
            let (sel, rm) = modrm::decode_rm(&mut cur, width)?;
            b.mnemonic = GROUP1[sel as usize];
            b.operands.push(rm);
            let imm = read_imm(&mut cur, width)?;
            b.imm(imm, width);
        }
        0x83 => {
            let (sel, rm) = modrm::decode_rm(&mut cur, width)?;
            b.mnemonic = GROUP1[sel as usize];
            b.operands.push(rm);
            let imm = cur.i8()?;
            b.imm(imm as i32 as u32, 1);
        }

        0x84 => {
            b.mnemonic = Mnemonic::Test;
            let (reg, rm) = modrm::decode_rm(&mut cur, 1)?;
            b.operands.push(rm);
            b.reg(Reg(reg), 1);
            b.width = 1;
        }
        0x85 => {
            b.mnemonic = Mnemonic::Test;
            let (reg, rm) = modrm::decode_rm(&mut cur, width)?;
            b.operands.push(rm);
            b.reg(Reg(reg), width);
        }
        0x86 => {
            b.mnemonic = Mnemonic::Xchg;
            let (reg, rm) = modrm::decode_rm(&mut cur, 1)?;
            b.operands.push(rm);
            b.reg(Reg(reg), 1);
            b.width = 1;
        }
        0x87 => {
            b.mnemonic = Mnemonic::Xchg;
            let (reg, rm) = modrm::decode_rm(&mut cur, width)?;
            b.operands.push(rm);
            b.reg(Reg(reg), width);
        }

        0x88 => {
            b.mnemonic = Mnemonic::Mov;
            let (reg, rm) = modrm::decode_rm(&mut cur, 1)?;
            b.operands.push(rm);
            b.reg(Reg(reg), 1);
            b.width = 1;
        }
        0x89 => {
            b.mnemonic = Mnemonic::Mov;
            let (reg, rm) = modrm::decode_rm(&mut cur, width)?;
            b.operands.push(rm);
            b.reg(Reg(reg), width);
        }
        0x8a => {
            b.mnemonic = Mnemonic::Mov;
            let (reg, rm) = modrm::decode_rm(&mut cur, 1)?;
            b.reg(Reg(reg), 1);
            b.operands.push(rm);
            b.width = 1;
        }
        0x8b => {
            b.mnemonic = Mnemonic::Mov;
            let (reg, rm) = modrm::decode_rm(&mut cur, width)?;
            b.reg(Reg(reg), width);
            b.operands.push(rm);
        }
        0x8d => {
            b.mnemonic = Mnemonic::Lea;
            let (reg, rm) = modrm::decode_rm(&mut cur, width)?;
            b.reg(Reg(reg), width);
            b.operands.push(rm);
        }

        0x90 => b.mnemonic = Mnemonic::Nop,
        0x91..=0x97 => {
            b.mnemonic = Mnemonic::Xchg;
            b.reg(Reg::EAX, width);
            b.reg(Reg(opcode - 0x90), width);
        }
        0x98 => {
            b.mnemonic = if prefixes.operand_size {
                Mnemonic::Cbw
            } else {
                Mnemonic::Cwde
            };
        }
        0x99 => b.mnemonic = Mnemonic::Cdq,

        // MOV between the accumulator and an absolute address
        0xa0 | 0xa1 | 0xa2 | 0xa3 => {
            b.mnemonic = Mnemonic::Mov;
            let data_width = if opcode & 1 == 0 { 1 } else { width };
            let disp = cur.i32()?;
            let moffs = Operand::Mem {
                mem: MemOperand {
                    base: None,
                    index: None,
                    scale: 1,
                    disp,
                },
                width: data_width,
            };
            if opcode < 0xa2 {
                b.reg(Reg::EAX, data_width);
                b.operands.push(moffs);
            } else {
                b.operands.push(moffs);
                b.reg(Reg::EAX, data_width);
            }
            b.width = data_width;
        }

        0xa4 | 0xa5 => {
            b.mnemonic = Mnemonic::Movs;
            b.width = if opcode == 0xa4 { 1 } else { width };
        }
        0xa6 | 0xa7 => {
            b.mnemonic = Mnemonic::Cmps;
            b.width = if opcode == 0xa6 { 1 } else { width };
        }
        0xa8 => {
            b.mnemonic = Mnemonic::Test;
            b.reg(Reg::EAX, 1);
            let imm = cur.u8()?;
            b.imm(u32::from(imm), 1);
            b.width = 1;
        }
        0xa9 => {
            b.mnemonic = Mnemonic::Test;
            b.reg(Reg::EAX, width);
            let imm = read_imm(&mut cur, width)?;
            b.imm(imm, width);
        }
        0xaa | 0xab => {
            b.mnemonic = Mnemonic::Stos;
            b.width = if opcode == 0xaa { 1 } else { width };
        }
        0xac | 0xad => {
            b.mnemonic = Mnemonic::Lods;
            b.width = if opcode == 0xac { 1 } else { width };
        }
        0xae | 0xaf => {
            b.mnemonic = Mnemonic::Scas;
            b.width = if opcode == 0xae { 1 } else { width };
        }

        0xb0..=0xb7 => {
            b.mnemonic = Mnemonic::Mov;
            b.reg(Reg(opcode - 0xb0), 1);
            let imm = cur.u8()?;
            b.imm(u32::from(imm), 1);
            b.width = 1;
        }
        0xb8..=0xbf => {
            b.mnemonic = Mnemonic::Mov;
            b.reg(Reg(opcode - 0xb8), width);
            let imm = read_imm(&mut cur, width)?;
            b.imm(imm, width);
        }

        0xc0 => {
            let (sel, rm) = modrm::decode_rm(&mut cur, 1)?;
            b.mnemonic = SHIFT_GROUP[sel as usize];
            b.operands.push(rm);
            let imm = cur.u8()?;
            b.imm(u32::from(imm), 1);
            b.width = 1;
        }
        0xc1 => {
            let (sel, rm) = modrm::decode_rm(&mut cur, width)?;
            b.mnemonic = SHIFT_GROUP[sel as usize];
            b.operands.push(rm);
            let imm = cur.u8()?;
            b.imm(u32::from(imm), 1);
        }
        0xc2 => {
            b.mnemonic = Mnemonic::Ret;
            let imm = cur.u16()?;
            b.imm(u32::from(imm), 2);
        }
        0xc3 => b.mnemonic = Mnemonic::Ret,
        0xc6 => {
            let (sel, rm) = modrm::decode_rm(&mut cur, 1)?;
            b.mnemonic = if sel == 0 {
                Mnemonic::Mov
            } else {
                Mnemonic::Unknown
            };
            b.operands.push(rm);
            let imm = cur.u8()?;
            b.imm(u32::from(imm), 1);
            b.width = 1;
        }
        0xc7 => {
            let (sel, rm) = modrm::decode_rm(&mut cur, width)?;
            b.mnemonic = if sel == 0 {
                Mnemonic::Mov
            } else {
                Mnemonic::Unknown
            };
            b.operands.push(rm);
            let imm = read_imm(&mut cur, width)?;
            b.imm(imm, width);
        }
        0xc9 => b.mnemonic = Mnemonic::Leave,
        0xcc => b.mnemonic = Mnemonic::Int3,
        0xcd => {
            b.mnemonic = Mnemonic::Int;
            let imm = cur.u8()?;
            b.imm(u32::from(imm), 1);
        }

        0xd0 | 0xd1 => {
            let w = if opcode == 0xd0 { 1 } else { width };
            let (sel, rm) = modrm::decode_rm(&mut cur, w)?;
            b.mnemonic = SHIFT_GROUP[sel as usize];
            b.operands.push(rm);
            b.imm(1, 1);
            b.width = w;
        }
        0xd2 | 0xd3 => {
            let w = if opcode == 0xd2 { 1 } else { width };
            let (sel, rm) = modrm::decode_rm(&mut cur, w)?;
            b.mnemonic = SHIFT_GROUP[sel as usize];
            b.operands.push(rm);
            b.reg(Reg::ECX, 1);
            b.width = w;
        }

        0xe0..=0xe2 => {
            b.mnemonic = Mnemonic::Loop;
            let disp = cur.i8()?;
            let target = b.rel_target(&cur, i32::from(disp));
            b.operands.push(target);
        }

        // IN/OUT with a fixed 8-bit port
        0xe4 | 0xe5 => {
            b.mnemonic = Mnemonic::In;
            let data_width = if opcode == 0xe4 { 1 } else { width };
            b.reg(Reg::EAX, data_width);
            let port = cur.u8()?;
            b.imm(u32::from(port), 1);
            b.width = data_width;
        }
        0xe6 | 0xe7 => {
            b.mnemonic = Mnemonic::Out;
            let data_width = if opcode == 0xe6 { 1 } else { width };
            let port = cur.u8()?;
            b.imm(u32::from(port), 1);
            b.reg(Reg::EAX, data_width);
            b.width = data_width;
        }

        0xe8 => {
            b.mnemonic = Mnemonic::Call;
            let disp = cur.i32()?;
            let target = b.rel_target(&cur, disp);
            b.operands.push(target);
        }
        0xe9 => {
            b.mnemonic = Mnemonic::Jmp;
            let disp = cur.i32()?;
            let target = b.rel_target(&cur, disp);
            b.operands.push(target);
        }
        0xeb => {
            b.mnemonic = Mnemonic::Jmp;
            let disp = cur.i8()?;
            let target = b.rel_target(&cur, i32::from(disp));
            b.operands.push(target);
        }

        // IN/OUT with the port in DX
        0xec | 0xed => {
            b.mnemonic = Mnemonic::In;
            let data_width = if opcode == 0xec { 1 } else { width };
            b.reg(Reg::EAX, data_width);
            b.reg(Reg::EDX, 2);
            b.width = data_width;
        }
        0xee | 0xef => {
            b.mnemonic = Mnemonic::Out;
            let data_width = if opcode == 0xee { 1 } else { width };
            b.reg(Reg::EDX, 2);
            b.reg(Reg::EAX, data_width);
            b.width = data_width;
        }

        0xf4 => b.mnemonic = Mnemonic::Hlt,

        0xf6 => {
            let (sel, rm) = modrm::decode_rm(&mut cur, 1)?;
            b.mnemonic = UNARY_GROUP[sel as usize];
            b.operands.push(rm);
            if sel < 2 {
                let imm = cur.u8()?;
                b.imm(u32::from(imm), 1);
            }
            b.width = 1;
        }
        0xf7 => {
            let (sel, rm) = modrm::decode_rm(&mut cur, width)?;
            b.mnemonic = UNARY_GROUP[sel as usize];
            b.operands.push(rm);
            if sel < 2 {
                let imm = read_imm(&mut cur, width)?;
                b.imm(imm, width);
            }
        }

        0xfa => b.mnemonic = Mnemonic::Cli,
        0xfb => b.mnemonic = Mnemonic::Sti,
        0xfc => b.mnemonic = Mnemonic::Cld,
        0xfd => b.mnemonic = Mnemonic::Std,

        0xfe => {
            let (sel, rm) = modrm::decode_rm(&mut cur, 1)?;
            b.mnemonic = match sel {
                0 => Mnemonic::Inc,
                1 => Mnemonic::Dec,
                _ => Mnemonic::Unknown,
            };
            b.operands.push(rm);
            b.width = 1;
        }
        0xff => {
            let (sel, rm) = modrm::decode_rm(&mut cur, width)?;
            b.mnemonic = FF_GROUP[sel as usize];
            b.operands.push(rm);
        }

        _ => b.mnemonic = Mnemonic::Unknown,
    }

    let decoded = b.finish(prefixes, &cur);
    if decoded.mnemonic == Mnemonic::Unknown {
        debug!("unknown opcode {:#04x} at {:#x}", opcode, vaddr);
    }
    *offset = cur.pos;
    Ok(Some(decoded))
}

/// Dispatch on the second opcode byte after the 0x0F escape.
fn decode_two_byte(cur: &mut Cursor<'_>, b: &mut Builder) -> error::Result<()> {
    let opcode = cur.u8()?;
    match opcode {
        // near conditional jumps with a 32-bit displacement
        0x80..=0x8f => {
            b.mnemonic = Mnemonic::Jcc;
            b.cond = Some(Cond::from_bits(opcode));
            let disp = cur.i32()?;
            let target = b.rel_target(cur, disp);
            b.operands.push(target);
        }
        // byte set on condition
        0x90..=0x9f => {
            b.mnemonic = Mnemonic::Setcc;
            b.cond = Some(Cond::from_bits(opcode));
            let (_, rm) = modrm::decode_rm(cur, 1)?;
            b.operands.push(rm);
            b.width = 1;
        }
        0xae => {
            // only the MFENCE encoding of this group is recognized
            let modrm = cur.u8()?;
            b.mnemonic = if modrm == 0xf0 {
                Mnemonic::Mfence
            } else {
                Mnemonic::Unknown
            };
        }
        0xaf => {
            b.mnemonic = Mnemonic::Imul;
            let (reg, rm) = modrm::decode_rm(cur, b.width)?;
            b.reg(Reg(reg), b.width);
            b.operands.push(rm);
        }
        0xb6 | 0xb7 => {
            b.mnemonic = Mnemonic::Movzx;
            let src_width = if opcode == 0xb6 { 1 } else { 2 };
            let (reg, rm) = modrm::decode_rm(cur, src_width)?;
            b.reg(Reg(reg), b.width);
            b.operands.push(rm);
        }
        0xbe | 0xbf => {
            b.mnemonic = Mnemonic::Movsx;
            let src_width = if opcode == 0xbe { 1 } else { 2 };
            let (reg, rm) = modrm::decode_rm(cur, src_width)?;
            b.reg(Reg(reg), b.width);
            b.operands.push(rm);
        }
        _ => b.mnemonic = Mnemonic::Unknown,
    }
    Ok(())
}

fn read_imm(cur: &mut Cursor<'_>, width: u8) -> error::Result<u32> {
    match width {
        2 => Ok(u32::from(cur.u16()?)),
        _ => cur.u32(),
    }
}

/// Decode the whole byte slice starting at virtual address `base`.
pub fn decode_range(bytes: &[u8], base: u32) -> error::Result<Vec<Inst>> {
    let mut insts = Vec::new();
    let mut offset = 0;
    loop {
        let addr = base.wrapping_add(offset as u32);
        match decode_one(bytes, &mut offset, addr)? {
            Some(inst) => insts.push(inst),
            None => break,
        }
    }
    Ok(insts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], base: u32) -> Vec<Inst> {
        decode_range(bytes, base).unwrap()
    }

    #[test]
    fn prologue_and_epilogue() {
        // push ebp; mov ebp, esp; pop ebp; ret
        let insts = decode(&[0x55, 0x89, 0xe5, 0x5d, 0xc3], 0x1000);
        assert_eq!(insts.len(), 4);
        let lens: Vec<u8> = insts.iter().map(|inst| inst.len).collect();
        assert_eq!(lens, [1, 2, 1, 1]);
        assert_eq!(insts[0].mnemonic, Mnemonic::Push);
        assert_eq!(insts[1].mnemonic, Mnemonic::Mov);
        assert_eq!(insts[2].mnemonic, Mnemonic::Pop);
        assert_eq!(insts[3].mnemonic, Mnemonic::Ret);
        assert_eq!(insts[1].addr, 0x1001);
        assert_eq!(insts[3].addr, 0x1004);
    }

    #[test]
    fn call_target_arithmetic() {
        let insts = decode(&[0xe8, 0x10, 0x00, 0x00, 0x00], 0x1000);
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].mnemonic, Mnemonic::Call);
        assert_eq!(insts[0].len, 5);
        assert_eq!(insts[0].operands[0], Operand::Rel { target: 0x1015 });
    }

    #[test]
    fn backward_jump_target() {
        // jmp short -2 (to its own first byte)
        let insts = decode(&[0xeb, 0xfe], 0x2000);
        assert_eq!(insts[0].operands[0], Operand::Rel { target: 0x2000 });
    }

    #[test]
    fn port_io_fixed_and_dx() {
        // in al, 0x60; out 0x61, al; in al, dx; out dx, eax
        let insts = decode(&[0xe4, 0x60, 0xe6, 0x61, 0xec, 0xef], 0);
        assert_eq!(insts.len(), 4);
        assert_eq!(insts[0].mnemonic, Mnemonic::In);
        assert_eq!(insts[0].len, 2);
        assert_eq!(insts[0].operands[1], Operand::Imm { value: 0x60, width: 1 });
        assert_eq!(insts[1].mnemonic, Mnemonic::Out);
        assert_eq!(insts[1].operands[0], Operand::Imm { value: 0x61, width: 1 });
        assert_eq!(insts[2].operands[1], Operand::Reg { reg: Reg::EDX, width: 2 });
        assert_eq!(insts[3].mnemonic, Mnemonic::Out);
        assert_eq!(insts[3].width, 4);
    }

    #[test]
    fn group1_compare_immediate() {
        // cmp eax, 0
        let insts = decode(&[0x83, 0xf8, 0x00], 0x1000);
        assert_eq!(insts[0].mnemonic, Mnemonic::Cmp);
        assert_eq!(insts[0].len, 3);
        assert_eq!(
            insts[0].operands[0],
            Operand::Reg { reg: Reg::EAX, width: 4 }
        );
    }

    #[test]
    fn modrm_with_sib_and_disp() {
        // mov eax, [edx+ecx*4+0x10]
        let insts = decode(&[0x8b, 0x44, 0x8a, 0x10], 0);
        assert_eq!(insts[0].len, 4);
        assert_eq!(
            insts[0].operands[1],
            Operand::Mem {
                mem: MemOperand {
                    base: Some(Reg::EDX),
                    index: Some(Reg::ECX),
                    scale: 4,
                    disp: 0x10
                },
                width: 4
            }
        );
    }

    #[test]
    fn moffs_load() {
        // mov eax, [0x1234]
        let insts = decode(&[0xa1, 0x34, 0x12, 0x00, 0x00], 0);
        assert_eq!(insts[0].mnemonic, Mnemonic::Mov);
        assert_eq!(insts[0].len, 5);
        assert_eq!(
            insts[0].operands[1],
            Operand::Mem {
                mem: MemOperand {
                    base: None,
                    index: None,
                    scale: 1,
                    disp: 0x1234
                },
                width: 4
            }
        );
    }

    #[test]
    fn near_conditional_jump() {
        // je +5
        let insts = decode(&[0x0f, 0x84, 0x05, 0x00, 0x00, 0x00], 0x1000);
        assert_eq!(insts[0].mnemonic, Mnemonic::Jcc);
        assert_eq!(insts[0].cond, Some(Cond::E));
        assert_eq!(insts[0].len, 6);
        assert_eq!(insts[0].operands[0], Operand::Rel { target: 0x100b });
    }

    #[test]
    fn movzx_from_byte() {
        // movzx eax, al
        let insts = decode(&[0x0f, 0xb6, 0xc0], 0);
        assert_eq!(insts[0].mnemonic, Mnemonic::Movzx);
        assert_eq!(insts[0].len, 3);
        assert_eq!(insts[0].operands[0], Operand::Reg { reg: Reg::EAX, width: 4 });
        assert_eq!(insts[0].operands[1], Operand::Reg { reg: Reg::EAX, width: 1 });
    }

    #[test]
    fn operand_size_override() {
        // mov ax, 0x1234
        let insts = decode(&[0x66, 0xb8, 0x34, 0x12], 0);
        assert_eq!(insts[0].mnemonic, Mnemonic::Mov);
        assert_eq!(insts[0].len, 4);
        assert_eq!(insts[0].width, 2);
        assert!(insts[0].prefixes.operand_size);
    }

    #[test]
    fn rep_string_store() {
        // rep stosd
        let insts = decode(&[0xf3, 0xab], 0);
        assert_eq!(insts[0].mnemonic, Mnemonic::Stos);
        assert_eq!(insts[0].len, 2);
        assert!(insts[0].prefixes.rep);
    }

    #[test]
    fn indirect_call_through_memory() {
        // call dword [0x2040]
        let insts = decode(&[0xff, 0x15, 0x40, 0x20, 0x00, 0x00], 0);
        assert_eq!(insts[0].mnemonic, Mnemonic::Call);
        assert_eq!(insts[0].len, 6);
        assert_eq!(
            insts[0].operands[0],
            Operand::Mem {
                mem: MemOperand {
                    base: None,
                    index: None,
                    scale: 1,
                    disp: 0x2040
                },
                width: 4
            }
        );
    }

    #[test]
    fn unknown_opcode_still_advances() {
        // x87 escape is outside the supported subset
        let insts = decode(&[0xd8, 0x90], 0);
        assert_eq!(insts[0].mnemonic, Mnemonic::Unknown);
        assert_eq!(insts[0].len, 1);
        assert_eq!(insts[1].mnemonic, Mnemonic::Nop);
    }

    #[test]
    fn truncated_instruction_is_an_error() {
        let mut offset = 0;
        let err = decode_one(&[0x8b], &mut offset, 0).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::TruncatedInstruction { offset: 0 }
        ));
    }

    #[test]
    fn end_of_input_is_not_an_error() {
        let mut offset = 0;
        assert!(decode_one(&[], &mut offset, 0).unwrap().is_none());
    }

    #[test]
    fn decoder_always_makes_progress() {
        // one byte of every value, padded so nothing is truncated
        for opcode in 0u8..=0xff {
            let bytes = [opcode, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
            let mut offset = 0;
            match decode_one(&bytes, &mut offset, 0) {
                Ok(Some(inst)) => {
                    assert!(inst.len >= 1, "opcode {:#x} did not advance", opcode);
                    assert_eq!(offset, inst.len as usize);
                }
                Ok(None) => panic!("opcode {:#x} reported end of input", opcode),
                Err(err) => panic!("opcode {:#x} errored: {}", opcode, err),
            }
        }
    }
}
