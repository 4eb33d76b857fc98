//! ModR/M and SIB effective-address decoding.

use crate::error;

use super::inst::{MemOperand, Operand, Reg};
use super::Cursor;

/// Decode a ModR/M byte (and any SIB byte and displacement it implies)
/// into the `reg` selector and the r/m operand at `width` bytes.
///
/// mod = 3 names a direct register. Otherwise: rm = 4 pulls in a SIB
/// byte; rm = 5 with mod = 0 is a bare 32-bit displacement; any other rm
/// is a base register. mod = 1 adds a sign-extended 8-bit displacement,
/// mod = 2 a 32-bit one.
pub(super) fn decode_rm(cur: &mut Cursor<'_>, width: u8) -> error::Result<(u8, Operand)> {
    let modrm = cur.u8()?;
    let mode = modrm >> 6;
    let reg = (modrm >> 3) & 7;
    let rm = modrm & 7;

    if mode == 3 {
        return Ok((
            reg,
            Operand::Reg {
                reg: Reg(rm),
                width,
            },
        ));
    }

    let mut base = None;
    let mut index = None;
    let mut scale = 1u8;
    let mut disp = 0i32;

    if rm == 4 {
        let sib = cur.u8()?;
        let ss = sib >> 6;
        let idx = (sib >> 3) & 7;
        let b = sib & 7;
        scale = 1 << ss;
        // index = 4 encodes "no index"
        if idx != 4 {
            index = Some(Reg(idx));
        }
        if b == 5 && mode == 0 {
            disp = cur.i32()?;
        } else {
            base = Some(Reg(b));
        }
    } else if rm == 5 && mode == 0 {
        disp = cur.i32()?;
    } else {
        base = Some(Reg(rm));
    }

    match mode {
        1 => disp = i32::from(cur.i8()?),
        2 => disp = cur.i32()?,
        _ => {}
    }

    Ok((
        reg,
        Operand::Mem {
            mem: MemOperand {
                base,
                index,
                scale,
                disp,
            },
            width,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::super::Cursor;
    use super::*;

    fn decode(bytes: &[u8], width: u8) -> (u8, Operand, usize) {
        let mut cur = Cursor::new(bytes, 0);
        let (reg, rm) = decode_rm(&mut cur, width).unwrap();
        (reg, rm, cur.pos)
    }

    #[test]
    fn direct_register() {
        // mod=11 reg=000 rm=001
        let (reg, rm, used) = decode(&[0xc1], 4);
        assert_eq!(reg, 0);
        assert_eq!(
            rm,
            Operand::Reg {
                reg: Reg::ECX,
                width: 4
            }
        );
        assert_eq!(used, 1);
    }

    #[test]
    fn base_plus_disp8() {
        // mod=01 reg=000 rm=101 disp8=-4
        let (_, rm, used) = decode(&[0x45, 0xfc], 4);
        assert_eq!(
            rm,
            Operand::Mem {
                mem: MemOperand {
                    base: Some(Reg::EBP),
                    index: None,
                    scale: 1,
                    disp: -4
                },
                width: 4
            }
        );
        assert_eq!(used, 2);
    }

    #[test]
    fn absolute_disp32() {
        // mod=00 rm=101: bare 32-bit displacement
        let (_, rm, used) = decode(&[0x05, 0x78, 0x56, 0x34, 0x12], 4);
        assert_eq!(
            rm,
            Operand::Mem {
                mem: MemOperand {
                    base: None,
                    index: None,
                    scale: 1,
                    disp: 0x12345678
                },
                width: 4
            }
        );
        assert_eq!(used, 5);
    }

    #[test]
    fn sib_base_index_scale_disp8() {
        // mod=01 rm=100, sib: scale=10(x4) index=001(ecx) base=010(edx), disp8=0x10
        let (_, rm, used) = decode(&[0x44, 0x8a, 0x10], 4);
        assert_eq!(
            rm,
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
        assert_eq!(used, 3);
    }

    #[test]
    fn sib_no_base_disp32() {
        // mod=00 rm=100, sib: scale=00 index=100(none) base=101 -> disp32, no base
        let (_, rm, used) = decode(&[0x04, 0x25, 0x00, 0x10, 0x00, 0x00], 4);
        assert_eq!(
            rm,
            Operand::Mem {
                mem: MemOperand {
                    base: None,
                    index: None,
                    scale: 1,
                    disp: 0x1000
                },
                width: 4
            }
        );
        assert_eq!(used, 6);
    }

    #[test]
    fn truncated_modrm_errors() {
        let mut cur = Cursor::new(&[0x45], 0);
        assert!(decode_rm(&mut cur, 4).is_err());
    }
}
