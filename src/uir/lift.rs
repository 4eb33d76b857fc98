//! Three-pass basic-block construction over a decoded instruction
//! sequence: collect block boundaries, fill blocks, link successors.

use std::collections::{BTreeSet, HashSet};

use log::debug;

use crate::decode::{self, Mnemonic};

use super::{Block, Function, Inst, Op, Operand};

/// Lift a decoded instruction sequence into basic blocks.
///
/// Every machine instruction becomes exactly one IR instruction; opcodes
/// with no IR counterpart become `Nop` rather than failing, so an exotic
/// instruction in scaffolding code never aborts extraction.
pub fn lift(insts: &[decode::Inst], entry: u32) -> Function {
    // Pass 1: every branch target starts a block, as does every
    // instruction following a branch, RET, or HLT. The entry always does.
    let mut boundaries: HashSet<u32> = HashSet::new();
    boundaries.insert(entry);
    for inst in insts {
        match inst.mnemonic {
            Mnemonic::Jmp | Mnemonic::Jcc | Mnemonic::Loop => {
                if let Some(decode::Operand::Rel { target }) = inst.operands.first() {
                    boundaries.insert(*target);
                }
                boundaries.insert(inst.end());
            }
            Mnemonic::Ret | Mnemonic::Hlt => {
                boundaries.insert(inst.end());
            }
            _ => {}
        }
    }
    debug!("{} block boundaries in {} instructions", boundaries.len(), insts.len());

    // Pass 2: walk again, opening a block at each boundary.
    let mut blocks: Vec<Block> = Vec::new();
    let mut ports_read: BTreeSet<u16> = BTreeSet::new();
    let mut ports_written: BTreeSet<u16> = BTreeSet::new();
    let mut dynamic_port = false;
    for inst in insts {
        if blocks.is_empty() || boundaries.contains(&inst.addr) {
            blocks.push(Block::new(inst.addr, inst.addr == entry));
        }
        note_ports(inst, &mut ports_read, &mut ports_written, &mut dynamic_port);
        let index = blocks.len() - 1;
        blocks[index].insts.push(lift_inst(inst));
    }

    // Pass 3: resolve successor links to block indices.
    let count = blocks.len();
    for i in 0..count {
        let terminator = blocks[i].insts.last().copied();
        let next = if i + 1 < count { Some(i + 1) } else { None };
        let (fall_through, branch) = match terminator {
            Some(Inst { op: Op::Jcc, src1, .. }) => {
                (next, branch_target(&blocks, src1))
            }
            Some(Inst { op: Op::Jmp, src1, .. }) => (None, branch_target(&blocks, src1)),
            Some(Inst { op: Op::Ret, .. }) => (None, None),
            _ => (next, None),
        };
        blocks[i].fall_through = fall_through;
        blocks[i].branch = branch;
    }

    let has_port_io = !ports_read.is_empty() || !ports_written.is_empty() || dynamic_port;
    Function {
        entry,
        blocks,
        ports_read: ports_read.into_iter().collect(),
        ports_written: ports_written.into_iter().collect(),
        has_port_io,
        dynamic_port,
    }
}

/// Linear search for the block starting at the branch target. Targets
/// outside the function resolve to no link.
fn branch_target(blocks: &[Block], target: Option<Operand>) -> Option<usize> {
    match target {
        Some(Operand::Target(addr)) => blocks.iter().position(|block| block.start == addr),
        _ => None,
    }
}

fn convert(operand: &decode::Operand) -> Operand {
    match *operand {
        decode::Operand::Reg { reg, .. } => Operand::Reg(reg.0),
        decode::Operand::Mem { mem, .. } => Operand::Mem {
            base: mem.base.map(|reg| reg.0),
            index: mem.index.map(|reg| reg.0),
            scale: mem.scale,
            disp: mem.disp,
        },
        decode::Operand::Imm { value, .. } => Operand::Imm(value),
        decode::Operand::Rel { target } => Operand::Target(target),
    }
}

fn operand(inst: &decode::Inst, index: usize) -> Option<Operand> {
    inst.operands.get(index).map(convert)
}

fn is_mem(operand: Option<&decode::Operand>) -> bool {
    matches!(operand, Some(decode::Operand::Mem { .. }))
}

/// Translate one machine instruction to one IR instruction.
fn lift_inst(inst: &decode::Inst) -> Inst {
    let mut out = Inst {
        op: Op::Nop,
        dst: None,
        src1: None,
        src2: None,
        width: inst.width,
        addr: inst.addr,
        cond: None,
    };
    match inst.mnemonic {
        Mnemonic::In => {
            out.op = Op::PortIn;
            out.dst = operand(inst, 0);
            out.src1 = operand(inst, 1);
        }
        Mnemonic::Out => {
            out.op = Op::PortOut;
            out.dst = operand(inst, 0);
            out.src1 = operand(inst, 1);
        }
        // XCHG degrades to a one-direction move, which is enough for
        // extraction purposes.
        Mnemonic::Mov | Mnemonic::Xchg => {
            let dst_is_mem = is_mem(inst.operands.first());
            let src_is_mem = is_mem(inst.operands.get(1));
            out.op = match (dst_is_mem, src_is_mem) {
                (true, false) => Op::Store,
                (false, true) => Op::Load,
                _ => Op::Mov,
            };
            out.dst = operand(inst, 0);
            out.src1 = operand(inst, 1);
        }
        Mnemonic::Movzx => {
            out.op = Op::Movzx;
            out.dst = operand(inst, 0);
            out.src1 = operand(inst, 1);
        }
        Mnemonic::Movsx => {
            out.op = Op::Movsx;
            out.dst = operand(inst, 0);
            out.src1 = operand(inst, 1);
        }
        Mnemonic::Lea => {
            out.op = Op::Lea;
            out.dst = operand(inst, 0);
            out.src1 = operand(inst, 1);
        }
        Mnemonic::Push => {
            out.op = Op::Push;
            out.src1 = operand(inst, 0);
        }
        Mnemonic::Pop => {
            out.op = Op::Pop;
            out.dst = operand(inst, 0);
        }
        Mnemonic::Add
        | Mnemonic::Adc
        | Mnemonic::Sub
        | Mnemonic::Sbb
        | Mnemonic::And
        | Mnemonic::Or
        | Mnemonic::Xor
        | Mnemonic::Shl
        | Mnemonic::Shr
        | Mnemonic::Sar
        | Mnemonic::Imul => {
            out.op = match inst.mnemonic {
                Mnemonic::Add | Mnemonic::Adc => Op::Add,
                Mnemonic::Sub | Mnemonic::Sbb => Op::Sub,
                Mnemonic::And => Op::And,
                Mnemonic::Or => Op::Or,
                Mnemonic::Xor => Op::Xor,
                Mnemonic::Shl => Op::Shl,
                Mnemonic::Shr => Op::Shr,
                Mnemonic::Sar => Op::Sar,
                _ => Op::Imul,
            };
            out.dst = operand(inst, 0);
            out.src1 = operand(inst, 1);
            out.src2 = operand(inst, 2);
        }
        Mnemonic::Not => {
            out.op = Op::Not;
            out.dst = operand(inst, 0);
        }
        Mnemonic::Neg => {
            out.op = Op::Neg;
            out.dst = operand(inst, 0);
        }
        Mnemonic::Inc => {
            out.op = Op::Inc;
            out.dst = operand(inst, 0);
        }
        Mnemonic::Dec => {
            out.op = Op::Dec;
            out.dst = operand(inst, 0);
        }
        Mnemonic::Mul => {
            out.op = Op::Mul;
            out.src1 = operand(inst, 0);
        }
        Mnemonic::Div => {
            out.op = Op::Div;
            out.src1 = operand(inst, 0);
        }
        Mnemonic::Idiv => {
            out.op = Op::Idiv;
            out.src1 = operand(inst, 0);
        }
        Mnemonic::Cmp => {
            out.op = Op::Cmp;
            out.src1 = operand(inst, 0);
            out.src2 = operand(inst, 1);
        }
        Mnemonic::Test => {
            out.op = Op::Test;
            out.src1 = operand(inst, 0);
            out.src2 = operand(inst, 1);
        }
        Mnemonic::Jmp => {
            out.op = Op::Jmp;
            out.src1 = operand(inst, 0);
        }
        Mnemonic::Jcc => {
            out.op = Op::Jcc;
            out.src1 = operand(inst, 0);
            out.cond = inst.cond;
        }
        // LOOP is a conditional branch once the counter update is
        // abstracted away.
        Mnemonic::Loop => {
            out.op = Op::Jcc;
            out.src1 = operand(inst, 0);
        }
        Mnemonic::Call => {
            out.op = Op::Call;
            out.src1 = operand(inst, 0);
        }
        Mnemonic::Ret => out.op = Op::Ret,
        Mnemonic::Cli => out.op = Op::Cli,
        Mnemonic::Sti => out.op = Op::Sti,
        Mnemonic::Hlt => out.op = Op::Hlt,
        Mnemonic::Nop => out.op = Op::Nop,
        // No IR counterpart: string ops, SETcc, stack-frame sugar,
        // converts, fences, software interrupts, unknown opcodes.
        _ => out.op = Op::Nop,
    }
    out
}

/// Update the function's port summaries from one machine instruction.
fn note_ports(
    inst: &decode::Inst,
    ports_read: &mut BTreeSet<u16>,
    ports_written: &mut BTreeSet<u16>,
    dynamic_port: &mut bool,
) {
    match inst.mnemonic {
        Mnemonic::In => match inst.operands.get(1) {
            Some(decode::Operand::Imm { value, .. }) => {
                ports_read.insert(*value as u16);
            }
            Some(decode::Operand::Reg { .. }) => *dynamic_port = true,
            _ => {}
        },
        Mnemonic::Out => match inst.operands.first() {
            Some(decode::Operand::Imm { value, .. }) => {
                ports_written.insert(*value as u16);
            }
            Some(decode::Operand::Reg { .. }) => *dynamic_port = true,
            _ => {}
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::super::Op;
    use super::*;
    use crate::decode::decode_range;

    fn lift_bytes(bytes: &[u8], base: u32) -> Function {
        let insts = decode_range(bytes, base).unwrap();
        lift(&insts, base)
    }

    #[test]
    fn conditional_jump_splits_blocks() {
        // cmp eax, 0; je +1; nop; nop; ret
        let func = lift_bytes(&[0x83, 0xf8, 0x00, 0x74, 0x01, 0x90, 0x90, 0xc3], 0x1000);
        assert!(func.blocks.len() >= 2);
        assert_eq!(func.blocks.len(), 3);
        assert_eq!(func.blocks[0].start, 0x1000);
        assert_eq!(func.blocks[1].start, 0x1005);
        assert_eq!(func.blocks[2].start, 0x1006);
        assert!(func.blocks[0].is_entry);
        // the conditional branch has both exits
        assert_eq!(func.blocks[0].fall_through, Some(1));
        assert_eq!(func.blocks[0].branch, Some(2));
        // the straight-line block only falls through
        assert_eq!(func.blocks[1].fall_through, Some(2));
        assert_eq!(func.blocks[1].branch, None);
        // the returning block exits the function
        assert_eq!(func.blocks[2].fall_through, None);
        assert_eq!(func.blocks[2].branch, None);
    }

    #[test]
    fn block_partition_is_exact() {
        let bytes = [0x83, 0xf8, 0x00, 0x74, 0x01, 0x90, 0x90, 0xc3];
        let insts = decode_range(&bytes, 0x1000).unwrap();
        let func = lift(&insts, 0x1000);
        let total: usize = func.blocks.iter().map(|block| block.insts.len()).sum();
        assert_eq!(total, insts.len());
        // block starts are pairwise distinct
        let mut starts: Vec<u32> = func.blocks.iter().map(|block| block.start).collect();
        starts.sort_unstable();
        starts.dedup();
        assert_eq!(starts.len(), func.blocks.len());
        // every instruction address appears in exactly one block
        let mut addrs: Vec<u32> = func
            .blocks
            .iter()
            .flat_map(|block| block.insts.iter().map(|inst| inst.addr))
            .collect();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), insts.len());
    }

    #[test]
    fn links_match_block_starts() {
        let func = lift_bytes(&[0x83, 0xf8, 0x00, 0x74, 0x01, 0x90, 0x90, 0xc3], 0x1000);
        for block in &func.blocks {
            for link in [block.fall_through, block.branch].into_iter().flatten() {
                assert!(link < func.blocks.len());
            }
            if let Some(branch) = block.branch {
                if let Some(Inst {
                    src1: Some(Operand::Target(target)),
                    ..
                }) = block.insts.last()
                {
                    assert_eq!(func.blocks[branch].start, *target);
                }
            }
        }
    }

    #[test]
    fn unconditional_jump_has_no_fall_through() {
        // jmp +1; nop; ret
        let func = lift_bytes(&[0xeb, 0x01, 0x90, 0xc3], 0x1000);
        assert_eq!(func.blocks[0].fall_through, None);
        assert_eq!(
            func.blocks[0].branch.map(|i| func.blocks[i].start),
            Some(0x1003)
        );
    }

    #[test]
    fn backward_branch_forms_a_loop() {
        // poll: in al, 0x64; test al, 0x1; je poll; ret
        let func = lift_bytes(&[0xe4, 0x64, 0xa8, 0x01, 0x74, 0xfa, 0xc3], 0x1000);
        let poll = func
            .blocks
            .iter()
            .position(|block| block.start == 0x1000)
            .unwrap();
        let branch_block = func
            .blocks
            .iter()
            .position(|block| block.branch == Some(poll))
            .unwrap();
        // the loop edge points backwards
        assert!(func.blocks[branch_block].start >= func.blocks[poll].start);
    }

    #[test]
    fn port_summaries_from_immediate_ports() {
        // in al, 0x60; out 0x61, al; ret
        let func = lift_bytes(&[0xe4, 0x60, 0xe6, 0x61, 0xc3], 0x1000);
        assert_eq!(func.ports_read, [0x60]);
        assert_eq!(func.ports_written, [0x61]);
        assert!(func.has_port_io);
        assert!(!func.dynamic_port);
    }

    #[test]
    fn duplicate_ports_are_deduplicated() {
        // in al, 0x60; in al, 0x60; ret
        let func = lift_bytes(&[0xe4, 0x60, 0xe4, 0x60, 0xc3], 0);
        assert_eq!(func.ports_read, [0x60]);
    }

    #[test]
    fn dx_relative_port_sets_dynamic_flag() {
        // mov dx, 0x3f8 is elided; in al, dx; ret
        let func = lift_bytes(&[0xec, 0xc3], 0);
        assert!(func.dynamic_port);
        assert!(func.has_port_io);
        assert!(func.ports_read.is_empty());
    }

    #[test]
    fn unknown_opcode_lifts_to_nop() {
        let func = lift_bytes(&[0xd8, 0xc3], 0);
        assert_eq!(func.blocks[0].insts[0].op, Op::Nop);
    }

    #[test]
    fn port_ops_carry_port_operand_verbatim() {
        let func = lift_bytes(&[0xe4, 0x60, 0xc3], 0);
        let inst = func.blocks[0].insts[0];
        assert_eq!(inst.op, Op::PortIn);
        assert_eq!(inst.dst, Some(Operand::Reg(0)));
        assert_eq!(inst.src1, Some(Operand::Imm(0x60)));
        assert_eq!(inst.width, 1);
    }
}
