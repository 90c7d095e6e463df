//! Disassembly of the VLE instruction subset seen in CPUSCR scans.
//!
//! The instruction word is the 32-bit CPUSCR IR slot; 16-bit `se_`
//! instructions sit in its upper half. Only the handful of opcodes the
//! debugger is known to inject is recognised.

use crate::bits::sign_extend;
use crate::error::{Error, ProtocolViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    /// D-form load/store: `<mnem> rS, D(rA)`.
    D,
    /// 16-bit SD4-form load/store with short register fields.
    Sd4,
    /// 16-bit conditional branch with an 8-bit displacement.
    Bd8Bo16,
    /// Scaled 8-bit immediate with record bit.
    Sci8Rc,
    /// Move to condition-register fields.
    Xfx,
}

struct Pattern {
    mask: u32,
    value: u32,
    form: Form,
    mnemonic: &'static str,
}

const PATTERNS: [Pattern; 6] = [
    Pattern {
        mask: 0xF000_0000,
        value: 0x8000_0000,
        form: Form::Sd4,
        mnemonic: "se_lbz",
    },
    Pattern {
        mask: 0xF800_0000,
        value: 0xE000_0000,
        form: Form::Bd8Bo16,
        mnemonic: "se_bc",
    },
    Pattern {
        mask: 0xFC00_0000,
        value: 0x3400_0000,
        form: Form::D,
        mnemonic: "e_stb",
    },
    Pattern {
        mask: 0xFC00_0000,
        value: 0x5000_0000,
        form: Form::D,
        mnemonic: "e_lwz",
    },
    Pattern {
        mask: 0xFC00_F000,
        value: 0x1800_D000,
        form: Form::Sci8Rc,
        mnemonic: "e_ori",
    },
    Pattern {
        mask: 0xFC00_07FE,
        value: 0x7C00_0120,
        form: Form::Xfx,
        mnemonic: "mtcrf",
    },
];

/// Disassembles `ir`. `ffra_wbbrlo` carries the write-path WBBRlo value
/// when the CTL FFRA bit requests the rA substitution. Returns `Ok(None)`
/// for an unrecognised opcode; an `mtcrf` with the reserved spr bit set is
/// a protocol violation.
pub fn disassemble(ir: u32, ffra_wbbrlo: Option<u32>) -> Result<Option<String>, Error> {
    let Some(pattern) = PATTERNS.iter().find(|p| ir & p.mask == p.value) else {
        return Ok(None);
    };
    let text = match pattern.form {
        Form::D => d_form(pattern.mnemonic, ir, ffra_wbbrlo),
        Form::Sd4 => sd4_form(pattern.mnemonic, ir),
        Form::Bd8Bo16 => bd8_form(pattern.mnemonic, ir),
        Form::Sci8Rc => sci8_form(pattern.mnemonic, ir),
        Form::Xfx => mtcrf(pattern.mnemonic, ir)?,
    };
    Ok(Some(text))
}

fn d_form(mnemonic: &str, ir: u32, ffra_wbbrlo: Option<u32>) -> String {
    let rs = (ir >> 21) & 0x1F;
    let ra = (ir >> 16) & 0x1F;
    let d = sign_extend(ir & 0xFFFF, 16);
    let base = match ffra_wbbrlo {
        Some(wbbrlo) => format!("wbbrlo(0x{wbbrlo:08x})"),
        None => format!("r{ra}"),
    };
    format!("{mnemonic} r{rs},{d}({base})")
}

fn sd4_form(mnemonic: &str, ir: u32) -> String {
    let sd4 = (ir >> 24) & 0xF;
    let rz = short_gpr((ir >> 20) & 0xF);
    let rx = short_gpr((ir >> 16) & 0xF);
    format!("{mnemonic} r{rz},{sd4}(r{rx})")
}

/// The 4-bit register fields of 16-bit instructions address r0-r7 and
/// r24-r31.
fn short_gpr(field: u32) -> u32 {
    if field < 8 {
        field
    } else {
        field + 16
    }
}

fn bd8_form(mnemonic: &str, ir: u32) -> String {
    let bo16 = (ir >> 26) & 1;
    let bi16 = (ir >> 24) & 3;
    let bd8 = (ir >> 16) & 0xFF;
    let displacement = sign_extend(bd8 << 2, 10);
    format!("{mnemonic} {bo16},{bi16},{displacement:+}")
}

fn sci8_form(mnemonic: &str, ir: u32) -> String {
    let rs = (ir >> 21) & 0x1F;
    let ra = (ir >> 16) & 0x1F;
    let rc = (ir >> 12) & 1 != 0;
    let f = (ir >> 10) & 1 != 0;
    let scl = (ir >> 8) & 3;
    let ui8 = (ir & 0xFF) as u64;
    let fill = if f { !(0xFFu64 << (8 * scl)) } else { 0 };
    let sci8 = fill | (ui8 << (8 * scl));
    let dot = if rc { "." } else { "" };
    if sci8 > 0xFFFF {
        format!("{mnemonic}{dot} r{ra},r{rs},0x{sci8:016x}")
    } else {
        format!("{mnemonic}{dot} r{ra},r{rs},{sci8}")
    }
}

fn mtcrf(mnemonic: &str, ir: u32) -> Result<String, Error> {
    let rs = (ir >> 21) & 0x1F;
    if (ir >> 20) & 1 != 0 {
        return Err(ProtocolViolation::MtcrfSprField { ir }.into());
    }
    let fxm = (ir >> 12) & 0xFF;
    Ok(format!("{mnemonic} 0x{fxm:02x},r{rs}"))
}
