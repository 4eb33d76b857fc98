//! Textual rendering of decoded instructions, one line per instruction
//! in classic disassembly style.

use core::fmt;

use super::inst::{Inst, MemOperand, Mnemonic, Operand};

fn size_prefix(width: u8) -> &'static str {
    match width {
        1 => "byte",
        2 => "word",
        _ => "dword",
    }
}

impl fmt::Display for MemOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        let mut wrote = false;
        if let Some(base) = self.base {
            write!(f, "{}", base.name(4))?;
            wrote = true;
        }
        if let Some(index) = self.index {
            if wrote {
                write!(f, "+")?;
            }
            write!(f, "{}", index.name(4))?;
            if self.scale > 1 {
                write!(f, "*{}", self.scale)?;
            }
            wrote = true;
        }
        if self.disp != 0 || !wrote {
            if !wrote {
                write!(f, "{:#x}", self.disp as u32)?;
            } else if self.disp < 0 {
                write!(f, "-{:#x}", self.disp.unsigned_abs())?;
            } else {
                write!(f, "+{:#x}", self.disp)?;
            }
        }
        write!(f, "]")
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::Reg { reg, width } => write!(f, "{}", reg.name(width)),
            Operand::Mem { mem, width } => write!(f, "{} {}", size_prefix(width), mem),
            Operand::Imm { value, .. } => write!(f, "{:#x}", value),
            Operand::Rel { target } => write!(f, "{:#x}", target),
        }
    }
}

impl Inst {
    /// The mnemonic as it appears in a disassembly listing, including the
    /// condition suffix of `Jcc`/`SETcc` and the width suffix of string
    /// operations.
    pub fn mnemonic_str(&self) -> String {
        use Mnemonic::*;
        let string_suffix = match self.width {
            1 => "b",
            2 => "w",
            _ => "d",
        };
        let fixed = match self.mnemonic {
            Mov => "mov",
            Movzx => "movzx",
            Movsx => "movsx",
            Lea => "lea",
            Xchg => "xchg",
            Push => "push",
            Pop => "pop",
            Pushad => "pushad",
            Popad => "popad",
            Add => "add",
            Or => "or",
            Adc => "adc",
            Sbb => "sbb",
            And => "and",
            Sub => "sub",
            Xor => "xor",
            Cmp => "cmp",
            Test => "test",
            Not => "not",
            Neg => "neg",
            Inc => "inc",
            Dec => "dec",
            Mul => "mul",
            Imul => "imul",
            Div => "div",
            Idiv => "idiv",
            Shl => "shl",
            Shr => "shr",
            Sar => "sar",
            Rol => "rol",
            Ror => "ror",
            Jmp => "jmp",
            Call => "call",
            Ret => "ret",
            Loop => "loop",
            Int => "int",
            Int3 => "int3",
            In => "in",
            Out => "out",
            Cli => "cli",
            Sti => "sti",
            Hlt => "hlt",
            Nop => "nop",
            Leave => "leave",
            Cld => "cld",
            Std => "std",
            Cbw => "cbw",
            Cwde => "cwde",
            Cdq => "cdq",
            Mfence => "mfence",
            Unknown => "(bad)",
            Jcc => {
                return match self.cond {
                    Some(cond) => format!("j{}", cond.suffix()),
                    None => "jcc".to_string(),
                }
            }
            Setcc => {
                return match self.cond {
                    Some(cond) => format!("set{}", cond.suffix()),
                    None => "setcc".to_string(),
                }
            }
            Movs => return format!("movs{}", string_suffix),
            Cmps => return format!("cmps{}", string_suffix),
            Stos => return format!("stos{}", string_suffix),
            Lods => return format!("lods{}", string_suffix),
            Scas => return format!("scas{}", string_suffix),
        };
        fixed.to_string()
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefixes.lock {
            write!(f, "lock ")?;
        }
        if self.prefixes.rep {
            write!(f, "rep ")?;
        } else if self.prefixes.repne {
            write!(f, "repne ")?;
        }
        write!(f, "{}", self.mnemonic_str())?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {}", operand)?;
            } else {
                write!(f, ", {}", operand)?;
            }
        }
        Ok(())
    }
}

/// One disassembly listing line: `ADDRESS:  MNEMONIC OPERAND, OPERAND`.
pub fn line(inst: &Inst) -> String {
    format!("{:08x}:  {}", inst.addr, inst)
}

#[cfg(test)]
mod tests {
    use super::super::decode_range;
    use super::line;

    fn first_line(bytes: &[u8], base: u32) -> String {
        let insts = decode_range(bytes, base).unwrap();
        line(&insts[0])
    }

    #[test]
    fn formats_register_move() {
        assert_eq!(first_line(&[0x89, 0xe5], 0x1000), "00001000:  mov ebp, esp");
    }

    #[test]
    fn formats_memory_operand() {
        assert_eq!(
            first_line(&[0x8b, 0x44, 0x8a, 0x10], 0),
            "00000000:  mov eax, dword [edx+ecx*4+0x10]"
        );
    }

    #[test]
    fn formats_negative_displacement() {
        assert_eq!(
            first_line(&[0x8b, 0x45, 0xfc], 0),
            "00000000:  mov eax, dword [ebp-0x4]"
        );
    }

    #[test]
    fn formats_port_read() {
        assert_eq!(first_line(&[0xe4, 0x60], 0), "00000000:  in al, 0x60");
    }

    #[test]
    fn formats_conditional_jump() {
        assert_eq!(first_line(&[0x74, 0x01], 0x1003), "00001003:  je 0x1006");
    }

    #[test]
    fn formats_byte_immediate_store() {
        assert_eq!(
            first_line(&[0xc6, 0x05, 0x00, 0x20, 0x00, 0x00, 0x7f], 0),
            "00000000:  mov byte [0x2000], 0x7f"
        );
    }

    #[test]
    fn formats_rep_string_op() {
        assert_eq!(first_line(&[0xf3, 0xab], 0), "00000000:  rep stosd");
    }
}
