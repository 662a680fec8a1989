//! The execution engine: fetch, decode and execute one instruction at a
//! time against the Core. Arithmetic goes through the Flags ALU so every
//! step leaves the flag register bit-exact.
use super::*;
use instructions::Cond;
use registers::{Reg16, Reg8};

/// What a single step produced.
#[derive(Debug, Default)]
pub struct Outcome {
    pub interrupt: Option<Interrupt>,
    pub deltas: Vec<(u32, u8)>,
}

/// Accumulated result of a run to halt.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub interrupts: Vec<Interrupt>,
    pub deltas: Vec<(u32, u8)>,
}

/// A decoded ModRM byte. For memory operands ea holds the effective
/// (segment, offset) with any displacement already fetched and applied.
struct ModRm {
    reg: u8,
    rm: u8,
    ea: Option<(u16, u16)>,
}

impl Core {
    /// Execute one instruction. A halted machine steps to a no-op so a
    /// front end can keep a "step" button wired up without state checks;
    /// a faulted machine refuses until a new program is loaded.
    pub fn step(&mut self) -> Result<Outcome, Error> {
        match self.state {
            RunState::Faulted => {
                return Err(runtime_err!("the machine has faulted; assemble again to recover"))
            }
            RunState::Halted => return Ok(Outcome::default()),
            _ => {}
        }
        if self.reg.ip >= self.program_end {
            self.state = RunState::Halted;
            return Ok(Outcome::default());
        }
        self.state = RunState::Running;
        let at = self.reg.ip;
        let interrupt = match self.exec_one() {
            Ok(i) => i,
            Err(e) => {
                self.state = RunState::Faulted;
                return Err(e);
            }
        };
        self.instruction_count += 1;
        if self.trace {
            println!("{:04x}  {}  {}", at, self.reg, self.reg.flags);
        }
        if self.state != RunState::Halted && self.reg.ip >= self.program_end {
            self.state = RunState::Halted;
        }
        Ok(Outcome {
            interrupt,
            deltas: self.mem.take_deltas(),
        })
    }

    /// Step until the machine halts, accumulating interrupts and memory
    /// deltas. Gives up after `limit` instructions, leaving the machine
    /// resumable.
    pub fn run(&mut self, limit: u64) -> Result<RunOutcome, Error> {
        let mut out = RunOutcome::default();
        let mut budget = limit;
        while self.state != RunState::Halted {
            if budget == 0 {
                return Err(Error::new(
                    ErrorKind::StepLimit,
                    None,
                    format!("exceeded step limit of {} instructions", limit).as_str(),
                ));
            }
            budget -= 1;
            let o = self.step()?;
            if let Some(i) = o.interrupt {
                out.interrupts.push(i);
            }
            out.deltas.extend(o.deltas);
        }
        Ok(out)
    }

    fn fetch_u8(&mut self) -> u8 {
        let b = self.mem.read_u8(self.reg.cs, self.reg.ip);
        self.reg.ip = self.reg.ip.wrapping_add(1);
        b
    }
    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch_u8() as u16;
        let hi = self.fetch_u8() as u16;
        (hi << 8) | lo
    }

    fn fetch_modrm(&mut self) -> ModRm {
        let b = self.fetch_u8();
        let (mode, reg, rm) = (b >> 6, (b >> 3) & 7, b & 7);
        let ea = if mode == 3 {
            None
        } else {
            let base = match rm {
                0 => self.reg.bx.wrapping_add(self.reg.si),
                1 => self.reg.bx.wrapping_add(self.reg.di),
                2 => self.reg.bp.wrapping_add(self.reg.si),
                3 => self.reg.bp.wrapping_add(self.reg.di),
                4 => self.reg.si,
                5 => self.reg.di,
                6 => self.reg.bp,
                _ => self.reg.bx,
            };
            let direct = mode == 0 && rm == 6;
            let off = if direct {
                self.fetch_u16()
            } else {
                match mode {
                    0 => base,
                    1 => base.wrapping_add(self.fetch_u8() as i8 as u16),
                    _ => base.wrapping_add(self.fetch_u16()),
                }
            };
            // BP-based addressing defaults to the stack segment
            let seg = if matches!(rm, 2 | 3 | 6) && !direct {
                self.reg.ss
            } else {
                self.reg.ds
            };
            Some((seg, off))
        };
        ModRm { reg, rm, ea }
    }

    fn rm_read_u8(&self, m: &ModRm) -> u8 {
        match m.ea {
            Some((seg, off)) => self.mem.read_u8(seg, off),
            None => self.reg.get_r8(Reg8::from_idx(m.rm)),
        }
    }
    fn rm_read_u16(&self, m: &ModRm) -> u16 {
        match m.ea {
            Some((seg, off)) => self.mem.read_u16(seg, off),
            None => self.reg.get_r16(Reg16::from_idx(m.rm)),
        }
    }
    fn rm_write_u8(&mut self, m: &ModRm, val: u8) {
        match m.ea {
            Some((seg, off)) => self.mem.write_u8(seg, off, val),
            None => self.reg.set_r8(Reg8::from_idx(m.rm), val),
        }
    }
    fn rm_write_u16(&mut self, m: &ModRm, val: u16) {
        match m.ea {
            Some((seg, off)) => self.mem.write_u16(seg, off, val),
            None => self.reg.set_r16(Reg16::from_idx(m.rm), val),
        }
    }

    fn push16(&mut self, val: u16) {
        self.reg.sp = self.reg.sp.wrapping_sub(2);
        self.mem.write_u16(self.reg.ss, self.reg.sp, val);
    }
    fn pop16(&mut self) -> u16 {
        let v = self.mem.read_u16(self.reg.ss, self.reg.sp);
        self.reg.sp = self.reg.sp.wrapping_add(2);
        v
    }

    // dispatch on the 0x80/0x81 group index (also the (op>>3)&7 of the
    // 0x00-0x3f matrix); CMP computes flags only, the caller skips the
    // write-back for group 7
    fn alu_u8(&mut self, group: u8, a: u8, b: u8) -> u8 {
        let fl = &mut self.reg.flags;
        match group {
            0 => fl.add_u8(a, b, false),
            1 => fl.or_u8(a, b),
            2 => fl.add_u8(a, b, true),
            3 => fl.sub_u8(a, b, true),
            4 => fl.and_u8(a, b),
            5 => fl.sub_u8(a, b, false),
            6 => fl.xor_u8(a, b),
            _ => {
                fl.cmp_u8(a, b);
                a
            }
        }
    }
    fn alu_u16(&mut self, group: u8, a: u16, b: u16) -> u16 {
        let fl = &mut self.reg.flags;
        match group {
            0 => fl.add_u16(a, b, false),
            1 => fl.or_u16(a, b),
            2 => fl.add_u16(a, b, true),
            3 => fl.sub_u16(a, b, true),
            4 => fl.and_u16(a, b),
            5 => fl.sub_u16(a, b, false),
            6 => fl.xor_u16(a, b),
            _ => {
                fl.cmp_u16(a, b);
                a
            }
        }
    }

    fn jump_rel8(&mut self, disp: u8, taken: bool) {
        if taken {
            self.reg.ip = self.reg.ip.wrapping_add(disp as i8 as u16);
        }
    }

    fn exec_one(&mut self) -> Result<Option<Interrupt>, Error> {
        let at = self.reg.ip;
        let op = self.fetch_u8();
        match op {
            // the two-operand ALU matrix
            _ if op < 0x40 && op & 7 <= 5 => {
                let group = (op >> 3) & 7;
                match op & 7 {
                    0 => {
                        let m = self.fetch_modrm();
                        let (a, b) = (self.rm_read_u8(&m), self.reg.get_r8(Reg8::from_idx(m.reg)));
                        let r = self.alu_u8(group, a, b);
                        if group != 7 {
                            self.rm_write_u8(&m, r);
                        }
                    }
                    1 => {
                        let m = self.fetch_modrm();
                        let (a, b) = (self.rm_read_u16(&m), self.reg.get_r16(Reg16::from_idx(m.reg)));
                        let r = self.alu_u16(group, a, b);
                        if group != 7 {
                            self.rm_write_u16(&m, r);
                        }
                    }
                    2 => {
                        let m = self.fetch_modrm();
                        let dst = Reg8::from_idx(m.reg);
                        let (a, b) = (self.reg.get_r8(dst), self.rm_read_u8(&m));
                        let r = self.alu_u8(group, a, b);
                        if group != 7 {
                            self.reg.set_r8(dst, r);
                        }
                    }
                    3 => {
                        let m = self.fetch_modrm();
                        let dst = Reg16::from_idx(m.reg);
                        let (a, b) = (self.reg.get_r16(dst), self.rm_read_u16(&m));
                        let r = self.alu_u16(group, a, b);
                        if group != 7 {
                            self.reg.set_r16(dst, r);
                        }
                    }
                    4 => {
                        let b = self.fetch_u8();
                        let a = self.reg.get_r8(Reg8::AL);
                        let r = self.alu_u8(group, a, b);
                        if group != 7 {
                            self.reg.set_r8(Reg8::AL, r);
                        }
                    }
                    _ => {
                        let b = self.fetch_u16();
                        let a = self.reg.ax;
                        let r = self.alu_u16(group, a, b);
                        if group != 7 {
                            self.reg.ax = r;
                        }
                    }
                }
            }
            0x40..=0x47 => {
                let reg = Reg16::from_idx(op & 7);
                let v = self.reg.get_r16(reg);
                let r = self.reg.flags.inc_u16(v);
                self.reg.set_r16(reg, r);
            }
            0x48..=0x4f => {
                let reg = Reg16::from_idx(op & 7);
                let v = self.reg.get_r16(reg);
                let r = self.reg.flags.dec_u16(v);
                self.reg.set_r16(reg, r);
            }
            0x50..=0x57 => {
                let v = self.reg.get_r16(Reg16::from_idx(op & 7));
                self.push16(v);
            }
            0x58..=0x5f => {
                let v = self.pop16();
                self.reg.set_r16(Reg16::from_idx(op & 7), v);
            }
            0x70..=0x7f => {
                let disp = self.fetch_u8();
                let taken = Cond::from_offset(op & 0xf).eval(&self.reg.flags);
                self.jump_rel8(disp, taken);
            }
            // ALU group with an immediate operand
            0x80 => {
                let m = self.fetch_modrm();
                let a = self.rm_read_u8(&m);
                let b = self.fetch_u8();
                let r = self.alu_u8(m.reg, a, b);
                if m.reg != 7 {
                    self.rm_write_u8(&m, r);
                }
            }
            0x81 => {
                let m = self.fetch_modrm();
                let a = self.rm_read_u16(&m);
                let b = self.fetch_u16();
                let r = self.alu_u16(m.reg, a, b);
                if m.reg != 7 {
                    self.rm_write_u16(&m, r);
                }
            }
            0x84 => {
                let m = self.fetch_modrm();
                let (a, b) = (self.rm_read_u8(&m), self.reg.get_r8(Reg8::from_idx(m.reg)));
                self.reg.flags.and_u8(a, b);
            }
            0x85 => {
                let m = self.fetch_modrm();
                let (a, b) = (self.rm_read_u16(&m), self.reg.get_r16(Reg16::from_idx(m.reg)));
                self.reg.flags.and_u16(a, b);
            }
            0x86 => {
                let m = self.fetch_modrm();
                let reg = Reg8::from_idx(m.reg);
                let (a, b) = (self.rm_read_u8(&m), self.reg.get_r8(reg));
                self.rm_write_u8(&m, b);
                self.reg.set_r8(reg, a);
            }
            0x87 => {
                let m = self.fetch_modrm();
                let reg = Reg16::from_idx(m.reg);
                let (a, b) = (self.rm_read_u16(&m), self.reg.get_r16(reg));
                self.rm_write_u16(&m, b);
                self.reg.set_r16(reg, a);
            }
            0x88 => {
                let m = self.fetch_modrm();
                let v = self.reg.get_r8(Reg8::from_idx(m.reg));
                self.rm_write_u8(&m, v);
            }
            0x89 => {
                let m = self.fetch_modrm();
                let v = self.reg.get_r16(Reg16::from_idx(m.reg));
                self.rm_write_u16(&m, v);
            }
            0x8a => {
                let m = self.fetch_modrm();
                let v = self.rm_read_u8(&m);
                self.reg.set_r8(Reg8::from_idx(m.reg), v);
            }
            0x8b => {
                let m = self.fetch_modrm();
                let v = self.rm_read_u16(&m);
                self.reg.set_r16(Reg16::from_idx(m.reg), v);
            }
            0x8d => {
                let m = self.fetch_modrm();
                match m.ea {
                    Some((_, off)) => self.reg.set_r16(Reg16::from_idx(m.reg), off),
                    None => return Err(runtime_err!("LEA requires a memory operand (offset 0x{:04x})", at)),
                }
            }
            0x8f => {
                let m = self.fetch_modrm();
                let v = self.pop16();
                self.rm_write_u16(&m, v);
            }
            // XCHG AX, r16 (0x90 is NOP: XCHG AX, AX)
            0x90..=0x97 => {
                let reg = Reg16::from_idx(op & 7);
                let v = self.reg.get_r16(reg);
                let ax = self.reg.ax;
                self.reg.set_r16(reg, ax);
                self.reg.ax = v;
            }
            0xa8 => {
                let b = self.fetch_u8();
                let a = self.reg.get_r8(Reg8::AL);
                self.reg.flags.and_u8(a, b);
            }
            0xa9 => {
                let b = self.fetch_u16();
                let a = self.reg.ax;
                self.reg.flags.and_u16(a, b);
            }
            0xb0..=0xb7 => {
                let v = self.fetch_u8();
                self.reg.set_r8(Reg8::from_idx(op & 7), v);
            }
            0xb8..=0xbf => {
                let v = self.fetch_u16();
                self.reg.set_r16(Reg16::from_idx(op & 7), v);
            }
            0xc3 => {
                self.reg.ip = self.pop16();
            }
            0xc4 => {
                let m = self.fetch_modrm();
                match m.ea {
                    Some((seg, off)) => {
                        let v = self.mem.read_u16(seg, off);
                        self.reg.set_r16(Reg16::from_idx(m.reg), v);
                        self.reg.es = self.mem.read_u16(seg, off.wrapping_add(2));
                    }
                    None => return Err(runtime_err!("LES requires a memory operand (offset 0x{:04x})", at)),
                }
            }
            0xc6 => {
                let m = self.fetch_modrm();
                let v = self.fetch_u8();
                self.rm_write_u8(&m, v);
            }
            0xc7 => {
                let m = self.fetch_modrm();
                let v = self.fetch_u16();
                self.rm_write_u16(&m, v);
            }
            0xcd => {
                let vector = self.fetch_u8();
                match vector {
                    0x21 => {
                        let c = self.reg.get_r8(Reg8::DL) as char;
                        return Ok(Some(Interrupt::Print(c)));
                    }
                    _ => return Err(runtime_err!("unsupported interrupt vector 0x{:02x}", vector)),
                }
            }
            0xe2 => {
                let disp = self.fetch_u8();
                self.reg.cx = self.reg.cx.wrapping_sub(1);
                let taken = self.reg.cx != 0;
                self.jump_rel8(disp, taken);
            }
            0xe3 => {
                let disp = self.fetch_u8();
                let taken = self.reg.cx == 0;
                self.jump_rel8(disp, taken);
            }
            0xe4 => {
                let port = self.fetch_u8();
                let v = self.ports.get(port);
                self.reg.set_r8(Reg8::AL, v);
                return Ok(Some(Interrupt::PortRead { port }));
            }
            0xe6 => {
                let port = self.fetch_u8();
                let value = self.reg.get_r8(Reg8::AL);
                return Ok(Some(Interrupt::PortWrite { port, value }));
            }
            0xe8 => {
                let disp = self.fetch_u16();
                let ret = self.reg.ip;
                self.push16(ret);
                self.reg.ip = ret.wrapping_add(disp);
            }
            0xe9 => {
                let disp = self.fetch_u16();
                self.reg.ip = self.reg.ip.wrapping_add(disp);
            }
            0xeb => {
                let disp = self.fetch_u8();
                self.jump_rel8(disp, true);
            }
            0xf4 => {
                self.state = RunState::Halted;
            }
            0xf6 | 0xf7 => return self.exec_unary_group(op, at),
            0xfe => {
                let m = self.fetch_modrm();
                let v = self.rm_read_u8(&m);
                let r = match m.reg {
                    0 => self.reg.flags.inc_u8(v),
                    1 => self.reg.flags.dec_u8(v),
                    _ => return Err(runtime_err!("invalid opcode 0x{:02x}/{} at offset 0x{:04x}", op, m.reg, at)),
                };
                self.rm_write_u8(&m, r);
            }
            0xff => {
                let m = self.fetch_modrm();
                let v = self.rm_read_u16(&m);
                match m.reg {
                    0 => {
                        let r = self.reg.flags.inc_u16(v);
                        self.rm_write_u16(&m, r);
                    }
                    1 => {
                        let r = self.reg.flags.dec_u16(v);
                        self.rm_write_u16(&m, r);
                    }
                    6 => self.push16(v),
                    _ => return Err(runtime_err!("invalid opcode 0x{:02x}/{} at offset 0x{:04x}", op, m.reg, at)),
                }
            }
            _ => return Err(runtime_err!("invalid opcode 0x{:02x} at offset 0x{:04x}", op, at)),
        }
        Ok(None)
    }

    // the 0xF6/0xF7 single-operand group: TEST imm, NOT, NEG, MUL, IMUL,
    // DIV, IDIV
    fn exec_unary_group(&mut self, op: u8, at: u16) -> Result<Option<Interrupt>, Error> {
        let word = op == 0xf7;
        let m = self.fetch_modrm();
        match (m.reg, word) {
            (0, false) => {
                let a = self.rm_read_u8(&m);
                let b = self.fetch_u8();
                self.reg.flags.and_u8(a, b);
            }
            (0, true) => {
                let a = self.rm_read_u16(&m);
                let b = self.fetch_u16();
                self.reg.flags.and_u16(a, b);
            }
            // NOT leaves the flags alone
            (2, false) => {
                let v = self.rm_read_u8(&m);
                self.rm_write_u8(&m, !v);
            }
            (2, true) => {
                let v = self.rm_read_u16(&m);
                self.rm_write_u16(&m, !v);
            }
            (3, false) => {
                let v = self.rm_read_u8(&m);
                let r = self.reg.flags.neg_u8(v);
                self.rm_write_u8(&m, r);
            }
            (3, true) => {
                let v = self.rm_read_u16(&m);
                let r = self.reg.flags.neg_u16(v);
                self.rm_write_u16(&m, r);
            }
            (4, false) => {
                let v = self.rm_read_u8(&m);
                let a = self.reg.get_r8(Reg8::AL);
                self.reg.ax = self.reg.flags.mul_u8(a, v);
            }
            (4, true) => {
                let v = self.rm_read_u16(&m);
                let a = self.reg.ax;
                let (lo, hi) = self.reg.flags.mul_u16(a, v);
                self.reg.ax = lo;
                self.reg.dx = hi;
            }
            (5, false) => {
                let v = self.rm_read_u8(&m);
                let a = self.reg.get_r8(Reg8::AL);
                self.reg.ax = self.reg.flags.imul_u8(a, v);
            }
            (5, true) => {
                let v = self.rm_read_u16(&m);
                let a = self.reg.ax;
                let (lo, hi) = self.reg.flags.imul_u16(a, v);
                self.reg.ax = lo;
                self.reg.dx = hi;
            }
            (6, false) => {
                let divisor = self.rm_read_u8(&m) as u16;
                if divisor == 0 {
                    return Err(runtime_err!("divide by zero at offset 0x{:04x}", at));
                }
                let dividend = self.reg.ax;
                let q = dividend / divisor;
                if q > 0xff {
                    return Err(runtime_err!("divide overflow at offset 0x{:04x}", at));
                }
                self.reg.set_r8(Reg8::AL, q as u8);
                self.reg.set_r8(Reg8::AH, (dividend % divisor) as u8);
            }
            (6, true) => {
                let divisor = self.rm_read_u16(&m) as u32;
                if divisor == 0 {
                    return Err(runtime_err!("divide by zero at offset 0x{:04x}", at));
                }
                let dividend = ((self.reg.dx as u32) << 16) | self.reg.ax as u32;
                let q = dividend / divisor;
                if q > 0xffff {
                    return Err(runtime_err!("divide overflow at offset 0x{:04x}", at));
                }
                self.reg.ax = q as u16;
                self.reg.dx = (dividend % divisor) as u16;
            }
            (7, false) => {
                let divisor = self.rm_read_u8(&m) as i8 as i16;
                if divisor == 0 {
                    return Err(runtime_err!("divide by zero at offset 0x{:04x}", at));
                }
                let dividend = self.reg.ax as i16;
                let q = match dividend.checked_div(divisor) {
                    Some(q) if (-128..=127).contains(&q) => q,
                    _ => return Err(runtime_err!("divide overflow at offset 0x{:04x}", at)),
                };
                self.reg.set_r8(Reg8::AL, q as u8);
                self.reg.set_r8(Reg8::AH, (dividend % divisor) as u8);
            }
            (7, true) => {
                let divisor = self.rm_read_u16(&m) as i16 as i32;
                if divisor == 0 {
                    return Err(runtime_err!("divide by zero at offset 0x{:04x}", at));
                }
                let dividend = (((self.reg.dx as u32) << 16) | self.reg.ax as u32) as i32;
                let q = match dividend.checked_div(divisor) {
                    Some(q) if (-32768..=32767).contains(&q) => q,
                    _ => return Err(runtime_err!("divide overflow at offset 0x{:04x}", at)),
                };
                self.reg.ax = q as u16;
                self.reg.dx = (dividend % divisor) as u16;
            }
            _ => return Err(runtime_err!("invalid opcode 0x{:02x}/{} at offset 0x{:04x}", op, m.reg, at)),
        }
        Ok(None)
    }
}
