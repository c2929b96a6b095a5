use crate::error::GbError;
use crate::lr35902::handlers::Handlers;
use crate::lr35902::irq::{Ime, Vector};
use crate::lr35902::registers::{Flags, Registers};
use crate::lr35902::sm83::{Opcode, Register, Sm83};
use crate::memory::mmu::Mmu;
use log::{debug, trace};
use std::mem;

const HALTED_CYCLES: usize = 4;
const INTERRUPT_DISPATCH_CYCLES: usize = 20;

pub struct Cpu {
    sm83: Sm83,
    registers: Registers,
    ime: Ime,
    halted: bool,
    halt_bug: bool,
    cycles: usize,
}

impl Cpu {
    pub fn new() -> Cpu {
        Cpu {
            sm83: Sm83::new(),
            registers: Registers::default(),
            ime: Ime::default(),
            halted: false,
            halt_bug: false,
            cycles: 0,
        }
    }

    /// Post-boot register state, or the all-zero power-on state when a boot ROM is going to run.
    pub fn reset(&mut self, with_bootrom: bool) {
        self.registers = if with_bootrom {
            Registers::default()
        } else {
            Registers::post_boot()
        };
        self.ime = Ime::default();
        self.halted = false;
        self.halt_bug = false;
        self.cycles = 0;
    }

    /// Runs one instruction, one halted tick or one interrupt dispatch and returns the T-cycles it took.
    pub fn step(&mut self, mmu: &mut Mmu) -> Result<usize, GbError> {
        if self.halted {
            if mmu.pending_interrupts().is_empty() {
                self.cycles += HALTED_CYCLES;
                return Ok(HALTED_CYCLES);
            }

            self.halted = false;
        }

        if self.ime.enabled {
            if let Some(vector) = Vector::from_flags(mmu.pending_interrupts()) {
                let cycles = self.service_interrupt(mmu, vector);
                self.cycles += cycles;
                return Ok(cycles);
            }
        }

        let pc = self.registers.pc;
        let halt_bug = mem::replace(&mut self.halt_bug, false);
        let instruction = self.sm83.decode(mmu, pc, halt_bug)?;
        trace!("[{:04x}] {}  ({})", pc, instruction, self);

        let length = if halt_bug { instruction.length - 1 } else { instruction.length };
        self.registers.pc = pc.wrapping_add(length as u16);

        let enable_ime = mem::replace(&mut self.ime.enable_pending, false);

        let cycles = match instruction.opcode {
            Opcode::Nop => Handlers::nop(self, mmu, &instruction),
            Opcode::Ld | Opcode::Ldh => Handlers::load(self, mmu, &instruction),
            Opcode::Add => Handlers::add(self, mmu, &instruction),
            Opcode::Adc | Opcode::Sub | Opcode::Sbc | Opcode::And | Opcode::Xor | Opcode::Or | Opcode::Cp => {
                Handlers::alu(self, mmu, &instruction)
            }
            Opcode::Inc => Handlers::increment(self, mmu, &instruction),
            Opcode::Dec => Handlers::decrement(self, mmu, &instruction),
            Opcode::Rlca | Opcode::Rrca | Opcode::Rla | Opcode::Rra => {
                Handlers::rotate_accumulator(self, mmu, &instruction)
            }
            Opcode::Rlc
            | Opcode::Rrc
            | Opcode::Rl
            | Opcode::Rr
            | Opcode::Sla
            | Opcode::Sra
            | Opcode::Swap
            | Opcode::Srl => Handlers::shift(self, mmu, &instruction),
            Opcode::Bit => Handlers::test_bit(self, mmu, &instruction),
            Opcode::Res | Opcode::Set => Handlers::modify_bit(self, mmu, &instruction),
            Opcode::Daa => Handlers::decimal_adjust(self, mmu, &instruction),
            Opcode::Cpl | Opcode::Scf | Opcode::Ccf => Handlers::flag_ops(self, mmu, &instruction),
            Opcode::Jp | Opcode::Jr | Opcode::Call => Handlers::jump(self, mmu, &instruction),
            Opcode::Ret | Opcode::Reti => Handlers::ret(self, mmu, &instruction),
            Opcode::Rst => Handlers::restart(self, mmu, &instruction),
            Opcode::Push => Handlers::push(self, mmu, &instruction),
            Opcode::Pop => Handlers::pop(self, mmu, &instruction),
            Opcode::Di | Opcode::Ei => Handlers::interrupts(self, mmu, &instruction),
            Opcode::Halt => Handlers::halt(self, mmu, &instruction),
            Opcode::Stop => Handlers::stop(self, mmu, &instruction),
        }?;

        if enable_ime && instruction.opcode != Opcode::Di {
            self.ime.enabled = true;
        }

        self.cycles += cycles;
        Ok(cycles)
    }

    fn service_interrupt(&mut self, mmu: &mut Mmu, vector: Vector) -> usize {
        debug!("Servicing {} interrupt from {:04x}", vector, self.registers.pc);

        // A dispatch right after a buggy HALT returns to the HALT itself.
        let return_address = if mem::replace(&mut self.halt_bug, false) {
            self.registers.pc.wrapping_sub(1)
        } else {
            self.registers.pc
        };

        mmu.clear_interrupt(vector.flag());
        self.ime.enabled = false;
        self.ime.enable_pending = false;
        self.push_stack(mmu, return_address);
        self.registers.pc = vector.to_address();

        INTERRUPT_DISPATCH_CYCLES
    }

    pub fn read_register(&self, register: &Register) -> Result<u8, GbError> {
        match register {
            Register::A => Ok(self.registers.a),
            Register::F => Ok(self.registers.f.bits()),
            Register::B => Ok(self.registers.b),
            Register::C => Ok(self.registers.c),
            Register::D => Ok(self.registers.d),
            Register::E => Ok(self.registers.e),
            Register::H => Ok(self.registers.h),
            Register::L => Ok(self.registers.l),
            _ => Err(GbError::UnresolvedTarget {
                target: register.to_string(),
            }),
        }
    }

    pub fn read_register16(&self, register: &Register) -> Result<u16, GbError> {
        match register {
            Register::AF => Ok(u16::from_be_bytes([self.registers.a, self.registers.f.bits()])),
            Register::BC => Ok(u16::from_be_bytes([self.registers.b, self.registers.c])),
            Register::DE => Ok(u16::from_be_bytes([self.registers.d, self.registers.e])),
            Register::HL => Ok(u16::from_be_bytes([self.registers.h, self.registers.l])),
            Register::SP => Ok(self.registers.sp),
            Register::PC => Ok(self.registers.pc),
            _ => Err(GbError::UnresolvedTarget {
                target: register.to_string(),
            }),
        }
    }

    pub fn write_register(&mut self, register: &Register, data: u8) -> Result<(), GbError> {
        match register {
            Register::A => self.registers.a = data,
            Register::F => self.registers.f = Flags::from_bits_truncate(data),
            Register::B => self.registers.b = data,
            Register::C => self.registers.c = data,
            Register::D => self.registers.d = data,
            Register::E => self.registers.e = data,
            Register::H => self.registers.h = data,
            Register::L => self.registers.l = data,
            _ => {
                return Err(GbError::UnresolvedTarget {
                    target: register.to_string(),
                })
            }
        }

        Ok(())
    }

    pub fn write_register16(&mut self, register: &Register, value: u16) -> Result<(), GbError> {
        let [high, low] = value.to_be_bytes();
        match register {
            Register::AF => {
                self.registers.a = high;
                // The low nibble of F does not exist.
                self.registers.f = Flags::from_bits_truncate(low);
            }
            Register::BC => {
                self.registers.b = high;
                self.registers.c = low;
            }
            Register::DE => {
                self.registers.d = high;
                self.registers.e = low;
            }
            Register::HL => {
                self.registers.h = high;
                self.registers.l = low;
            }
            Register::SP => self.registers.sp = value,
            Register::PC => self.registers.pc = value,
            _ => {
                return Err(GbError::UnresolvedTarget {
                    target: register.to_string(),
                })
            }
        }

        Ok(())
    }

    pub fn read_flag(&self, flag: Flags) -> bool {
        self.registers.f.contains(flag)
    }

    pub fn update_flag(&mut self, flag: Flags, value: bool) {
        self.registers.f.set(flag, value);
    }

    pub fn set_flags(&mut self, zero: bool, subtract: bool, half_carry: bool, carry: bool) {
        self.update_flag(Flags::ZERO, zero);
        self.update_flag(Flags::SUBTRACT, subtract);
        self.update_flag(Flags::HALF_CARRY, half_carry);
        self.update_flag(Flags::CARRY, carry);
    }

    pub fn push_stack(&mut self, mmu: &mut Mmu, value: u16) {
        self.registers.sp = self.registers.sp.wrapping_sub(2);
        mmu.write16(self.registers.sp, value);
    }

    pub fn pop_stack(&mut self, mmu: &Mmu) -> u16 {
        let value = mmu.read16(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(2);
        value
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.ime.enabled
    }

    pub fn enable_interrupts(&mut self) {
        self.ime.enabled = true;
    }

    pub fn schedule_interrupts(&mut self) {
        self.ime.enable_pending = true;
    }

    pub fn disable_interrupts(&mut self) {
        self.ime.enabled = false;
        self.ime.enable_pending = false;
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn trigger_halt_bug(&mut self) {
        debug!("HALT bug triggered at {:04x}", self.registers.pc);
        self.halt_bug = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn cycles(&self) -> usize {
        self.cycles
    }
}

impl std::fmt::Display for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "A: ${:02x}  F: ${:02x}  B: ${:02x}  C: ${:02x}  D: ${:02x}  E: ${:02x}  H: ${:02x}  L: ${:02x}  SP: ${:04x}  PC: ${:04x}",
            self.registers.a,
            self.registers.f.bits(),
            self.registers.b,
            self.registers.c,
            self.registers.d,
            self.registers.e,
            self.registers.h,
            self.registers.l,
            self.registers.sp,
            self.registers.pc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::registers::InterruptFlags;
    use crate::memory::{INTERRUPT_ENABLE_REGISTER, INTERRUPT_FLAGS_REGISTER};

    fn cpu_at(mmu: &mut Mmu, program: &[u8]) -> Cpu {
        for (offset, byte) in program.iter().enumerate() {
            mmu.write(0xc000 + offset as u16, *byte);
        }

        let mut cpu = Cpu::new();
        cpu.reset(false);
        cpu.registers_mut().pc = 0xc000;
        cpu
    }

    #[test]
    fn post_boot_registers() {
        let mut cpu = Cpu::new();
        cpu.reset(false);
        assert_eq!(cpu.read_register16(&Register::AF).unwrap(), 0x01b0);
        assert_eq!(cpu.read_register16(&Register::BC).unwrap(), 0x0013);
        assert_eq!(cpu.read_register16(&Register::DE).unwrap(), 0x00d8);
        assert_eq!(cpu.read_register16(&Register::HL).unwrap(), 0x014d);
        assert_eq!(cpu.read_register16(&Register::SP).unwrap(), 0xfffe);
        assert_eq!(cpu.read_register16(&Register::PC).unwrap(), 0x0100);

        cpu.reset(true);
        assert_eq!(cpu.registers(), &Registers::default());
    }

    #[test]
    fn illegal_opcode_is_reported() {
        let mut mmu = Mmu::new();
        let mut cpu = cpu_at(&mut mmu, &[0x00, 0xd3]);

        assert_eq!(cpu.step(&mut mmu).unwrap(), 4);
        let result = cpu.step(&mut mmu);
        assert!(matches!(
            result,
            Err(GbError::IllegalOpcode {
                opcode: 0xd3,
                address: 0xc001
            })
        ));
    }

    #[test]
    fn ei_takes_effect_after_next_instruction() {
        let mut mmu = Mmu::new();
        // ei; nop; nop
        let mut cpu = cpu_at(&mut mmu, &[0xfb, 0x00, 0x00]);
        mmu.write(INTERRUPT_ENABLE_REGISTER, InterruptFlags::TIMER.bits());
        mmu.write(INTERRUPT_FLAGS_REGISTER, InterruptFlags::TIMER.bits());

        cpu.step(&mut mmu).unwrap();
        assert!(!cpu.interrupts_enabled());
        cpu.step(&mut mmu).unwrap();
        assert!(cpu.interrupts_enabled());
        assert_eq!(cpu.registers().pc, 0xc002);

        assert_eq!(cpu.step(&mut mmu).unwrap(), 20);
        assert_eq!(cpu.registers().pc, 0x0050);
        assert_eq!(mmu.read16(cpu.registers().sp), 0xc002);
        assert!(!cpu.interrupts_enabled());
        assert!(mmu.pending_interrupts().is_empty());
    }

    #[test]
    fn di_cancels_pending_ei() {
        let mut mmu = Mmu::new();
        // ei; di; nop
        let mut cpu = cpu_at(&mut mmu, &[0xfb, 0xf3, 0x00]);

        cpu.step(&mut mmu).unwrap();
        cpu.step(&mut mmu).unwrap();
        cpu.step(&mut mmu).unwrap();
        assert!(!cpu.interrupts_enabled());
    }

    #[test]
    fn halt_waits_for_an_interrupt() {
        let mut mmu = Mmu::new();
        // ei; halt; nop
        let mut cpu = cpu_at(&mut mmu, &[0xfb, 0x76, 0x00]);
        mmu.write(INTERRUPT_ENABLE_REGISTER, InterruptFlags::VBLANK.bits());

        cpu.step(&mut mmu).unwrap();
        cpu.step(&mut mmu).unwrap();
        assert!(cpu.is_halted());
        assert_eq!(cpu.step(&mut mmu).unwrap(), 4);
        assert_eq!(cpu.registers().pc, 0xc002);

        mmu.request_interrupt(InterruptFlags::VBLANK);
        assert_eq!(cpu.step(&mut mmu).unwrap(), 20);
        assert!(!cpu.is_halted());
        assert_eq!(cpu.registers().pc, 0x0040);
    }

    #[test]
    fn halt_bug_reads_the_next_byte_twice() {
        let mut mmu = Mmu::new();
        // halt; inc a; nop
        let mut cpu = cpu_at(&mut mmu, &[0x76, 0x3c, 0x00]);
        mmu.write(INTERRUPT_ENABLE_REGISTER, InterruptFlags::TIMER.bits());
        mmu.request_interrupt(InterruptFlags::TIMER);
        cpu.write_register(&Register::A, 0).unwrap();

        cpu.step(&mut mmu).unwrap();
        assert!(!cpu.is_halted());

        cpu.step(&mut mmu).unwrap();
        assert_eq!(cpu.registers().pc, 0xc001);
        cpu.step(&mut mmu).unwrap();
        assert_eq!(cpu.registers().pc, 0xc002);
        assert_eq!(cpu.read_register(&Register::A).unwrap(), 2);
    }

    #[test]
    fn interrupt_after_ei_halt_returns_to_halt() {
        let mut mmu = Mmu::new();
        // ei; halt; nop
        let mut cpu = cpu_at(&mut mmu, &[0xfb, 0x76, 0x00]);
        mmu.write(INTERRUPT_ENABLE_REGISTER, InterruptFlags::TIMER.bits());
        mmu.request_interrupt(InterruptFlags::TIMER);
        cpu.write_register(&Register::A, 0).unwrap();

        cpu.step(&mut mmu).unwrap();
        cpu.step(&mut mmu).unwrap();
        assert!(!cpu.is_halted());
        assert!(cpu.interrupts_enabled());

        assert_eq!(cpu.step(&mut mmu).unwrap(), 20);
        assert_eq!(cpu.registers().pc, 0x0050);
        assert_eq!(mmu.read16(cpu.registers().sp), 0xc001);
        assert!(!cpu.halt_bug);
    }

    #[test]
    fn handler_after_ei_halt_starts_cleanly() {
        let mut mmu = Mmu::new();
        // ei; halt; nop; ... handler at $c010: inc a; nop
        let mut cpu = cpu_at(&mut mmu, &[0xfb, 0x76, 0x00]);
        mmu.write(0xc010, 0x3c);
        mmu.write(0xc011, 0x00);
        mmu.write(INTERRUPT_ENABLE_REGISTER, InterruptFlags::TIMER.bits());
        mmu.request_interrupt(InterruptFlags::TIMER);
        cpu.write_register(&Register::A, 0).unwrap();

        cpu.step(&mut mmu).unwrap();
        cpu.step(&mut mmu).unwrap();
        cpu.step(&mut mmu).unwrap();

        // Cartridge space is empty here, so jump to a handler in work RAM.
        cpu.registers_mut().pc = 0xc010;
        cpu.step(&mut mmu).unwrap();
        assert_eq!(cpu.read_register(&Register::A).unwrap(), 1);
        assert_eq!(cpu.registers().pc, 0xc011);
    }

    #[test]
    fn stop_resets_the_divider() {
        let mut mmu = Mmu::new();
        mmu.reset();
        let mut cpu = cpu_at(&mut mmu, &[0x10, 0x00]);
        assert_ne!(mmu.read(0xff04), 0);

        assert_eq!(cpu.step(&mut mmu).unwrap(), 4);
        assert_eq!(cpu.registers().pc, 0xc002);
        assert_eq!(mmu.read(0xff04), 0);
    }
}
