use crate::error::GbError;
use crate::lr35902::cpu::Cpu;
use crate::lr35902::registers::Flags;
use crate::lr35902::sm83::{AddressingMode, Condition, Instruction, Opcode, Operand, Register};
use crate::memory::mmu::Mmu;
use log::warn;

pub struct Handlers {}

impl Handlers {
    pub fn nop(_cpu: &mut Cpu, _mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        Ok(instruction.cycles.0)
    }

    pub fn load(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let (lhs, rhs) = Handlers::operands(instruction)?;

        match (lhs, rhs) {
            // ld r16, imm16
            (Operand::Reg16(dst, dst_mode), Operand::Imm16(imm, src_mode))
                if dst_mode.contains(AddressingMode::Direct) && src_mode.contains(AddressingMode::Direct) =>
            {
                cpu.write_register16(dst, *imm)?;
            }
            // ld sp, hl
            (Operand::Reg16(dst, dst_mode), Operand::Reg16(src, src_mode))
                if dst_mode.contains(AddressingMode::Direct) && src_mode.contains(AddressingMode::Direct) =>
            {
                let value = cpu.read_register16(src)?;
                cpu.write_register16(dst, value)?;
            }
            // ld hl, sp+/-imm8
            (Operand::Reg16(dst, _), Operand::DisplacedReg16(src, offset, _)) => {
                let base = cpu.read_register16(src)?;
                let result = Handlers::add_signed_offset(cpu, base, *offset);
                cpu.write_register16(dst, result)?;
            }
            // ld (imm16), sp
            (Operand::Imm16(addr, mode), Operand::Reg16(src, _)) if mode.contains(AddressingMode::Indirect) => {
                let value = cpu.read_register16(src)?;
                mmu.write16(*addr, value);
            }
            _ => {
                let value = Handlers::read_operand(cpu, mmu, rhs)?;
                Handlers::write_operand(cpu, mmu, lhs, value)?;
            }
        }

        Ok(instruction.cycles.0)
    }

    pub fn alu(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let (_, rhs) = Handlers::operands(instruction)?;
        let a = cpu.read_register(&Register::A)?;
        let value = Handlers::read_operand(cpu, mmu, rhs)?;
        let carry = cpu.read_flag(Flags::CARRY) as u8;

        let result = match instruction.opcode {
            Opcode::Add => Handlers::add8(cpu, a, value, 0),
            Opcode::Adc => Handlers::add8(cpu, a, value, carry),
            Opcode::Sub | Opcode::Cp => Handlers::sub8(cpu, a, value, 0),
            Opcode::Sbc => Handlers::sub8(cpu, a, value, carry),
            Opcode::And => {
                let result = a & value;
                cpu.set_flags(result == 0, false, true, false);
                result
            }
            Opcode::Xor => {
                let result = a ^ value;
                cpu.set_flags(result == 0, false, false, false);
                result
            }
            Opcode::Or => {
                let result = a | value;
                cpu.set_flags(result == 0, false, false, false);
                result
            }
            _ => {
                return Err(GbError::InvalidHandler {
                    instruction: instruction.to_string(),
                })
            }
        };

        // cp only sets the flags
        if instruction.opcode != Opcode::Cp {
            cpu.write_register(&Register::A, result)?;
        }

        Ok(instruction.cycles.0)
    }

    pub fn add(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let (lhs, rhs) = Handlers::operands(instruction)?;

        match (lhs, rhs) {
            // add hl, r16
            (Operand::Reg16(Register::HL, _), Operand::Reg16(src, _)) => {
                let hl = cpu.read_register16(&Register::HL)?;
                let value = cpu.read_register16(src)?;
                let result = hl.wrapping_add(value);

                cpu.update_flag(Flags::SUBTRACT, false);
                cpu.update_flag(Flags::HALF_CARRY, (hl & 0x0fff) + (value & 0x0fff) > 0x0fff);
                cpu.update_flag(Flags::CARRY, hl as u32 + value as u32 > 0xffff);
                cpu.write_register16(&Register::HL, result)?;
                Ok(instruction.cycles.0)
            }
            // add sp, imm8
            (Operand::Reg16(Register::SP, _), Operand::Offset(offset)) => {
                let sp = cpu.read_register16(&Register::SP)?;
                let result = Handlers::add_signed_offset(cpu, sp, *offset);
                cpu.write_register16(&Register::SP, result)?;
                Ok(instruction.cycles.0)
            }
            _ => Handlers::alu(cpu, mmu, instruction),
        }
    }

    pub fn increment(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let operand = Handlers::target(instruction)?;

        match operand {
            Operand::Reg16(reg, mode) if mode.contains(AddressingMode::Direct) => {
                let value = cpu.read_register16(reg)?;
                cpu.write_register16(reg, value.wrapping_add(1))?;
            }
            _ => {
                let value = Handlers::read_operand(cpu, mmu, operand)?;
                let result = value.wrapping_add(1);
                Handlers::write_operand(cpu, mmu, operand, result)?;

                cpu.update_flag(Flags::ZERO, result == 0);
                cpu.update_flag(Flags::SUBTRACT, false);
                cpu.update_flag(Flags::HALF_CARRY, (value & 0x0f) == 0x0f);
            }
        }

        Ok(instruction.cycles.0)
    }

    pub fn decrement(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let operand = Handlers::target(instruction)?;

        match operand {
            Operand::Reg16(reg, mode) if mode.contains(AddressingMode::Direct) => {
                let value = cpu.read_register16(reg)?;
                cpu.write_register16(reg, value.wrapping_sub(1))?;
            }
            _ => {
                let value = Handlers::read_operand(cpu, mmu, operand)?;
                let result = value.wrapping_sub(1);
                Handlers::write_operand(cpu, mmu, operand, result)?;

                cpu.update_flag(Flags::ZERO, result == 0);
                cpu.update_flag(Flags::SUBTRACT, true);
                cpu.update_flag(Flags::HALF_CARRY, (value & 0x0f) == 0);
            }
        }

        Ok(instruction.cycles.0)
    }

    /// rlca / rrca / rla / rra. Unlike their prefixed versions these always clear Z.
    pub fn rotate_accumulator(cpu: &mut Cpu, _mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let value = cpu.read_register(&Register::A)?;
        let carry = cpu.read_flag(Flags::CARRY) as u8;

        let (result, carry_out) = match instruction.opcode {
            Opcode::Rlca => (value.rotate_left(1), value & 0x80 != 0),
            Opcode::Rrca => (value.rotate_right(1), value & 0x01 != 0),
            Opcode::Rla => ((value << 1) | carry, value & 0x80 != 0),
            Opcode::Rra => ((value >> 1) | (carry << 7), value & 0x01 != 0),
            _ => {
                return Err(GbError::InvalidHandler {
                    instruction: instruction.to_string(),
                })
            }
        };

        cpu.write_register(&Register::A, result)?;
        cpu.set_flags(false, false, false, carry_out);

        Ok(instruction.cycles.0)
    }

    /// Prefixed rotates, shifts and swap.
    pub fn shift(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let operand = Handlers::target(instruction)?;
        let value = Handlers::read_operand(cpu, mmu, operand)?;
        let carry = cpu.read_flag(Flags::CARRY) as u8;

        let (result, carry_out) = match instruction.opcode {
            Opcode::Rlc => (value.rotate_left(1), value & 0x80 != 0),
            Opcode::Rrc => (value.rotate_right(1), value & 0x01 != 0),
            Opcode::Rl => ((value << 1) | carry, value & 0x80 != 0),
            Opcode::Rr => ((value >> 1) | (carry << 7), value & 0x01 != 0),
            Opcode::Sla => (value << 1, value & 0x80 != 0),
            Opcode::Sra => ((value >> 1) | (value & 0x80), value & 0x01 != 0),
            Opcode::Swap => (value.rotate_left(4), false),
            Opcode::Srl => (value >> 1, value & 0x01 != 0),
            _ => {
                return Err(GbError::InvalidHandler {
                    instruction: instruction.to_string(),
                })
            }
        };

        Handlers::write_operand(cpu, mmu, operand, result)?;
        cpu.set_flags(result == 0, false, false, carry_out);

        Ok(instruction.cycles.0)
    }

    pub fn test_bit(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let (bit, operand) = Handlers::bit_operands(instruction)?;
        let value = Handlers::read_operand(cpu, mmu, operand)?;

        cpu.update_flag(Flags::ZERO, value & (1 << bit) == 0);
        cpu.update_flag(Flags::SUBTRACT, false);
        cpu.update_flag(Flags::HALF_CARRY, true);

        Ok(instruction.cycles.0)
    }

    /// res / set
    pub fn modify_bit(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let (bit, operand) = Handlers::bit_operands(instruction)?;
        let value = Handlers::read_operand(cpu, mmu, operand)?;

        let result = if instruction.opcode == Opcode::Set {
            value | (1 << bit)
        } else {
            value & !(1 << bit)
        };
        Handlers::write_operand(cpu, mmu, operand, result)?;

        Ok(instruction.cycles.0)
    }

    pub fn decimal_adjust(cpu: &mut Cpu, _mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let mut a = cpu.read_register(&Register::A)?;
        let mut carry = cpu.read_flag(Flags::CARRY);
        let half_carry = cpu.read_flag(Flags::HALF_CARRY);

        if !cpu.read_flag(Flags::SUBTRACT) {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if half_carry || (a & 0x0f) > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if half_carry {
                a = a.wrapping_sub(0x06);
            }
        }

        cpu.write_register(&Register::A, a)?;
        cpu.update_flag(Flags::ZERO, a == 0);
        cpu.update_flag(Flags::HALF_CARRY, false);
        cpu.update_flag(Flags::CARRY, carry);

        Ok(instruction.cycles.0)
    }

    /// cpl / scf / ccf
    pub fn flag_ops(cpu: &mut Cpu, _mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        match instruction.opcode {
            Opcode::Cpl => {
                let a = cpu.read_register(&Register::A)?;
                cpu.write_register(&Register::A, !a)?;
                cpu.update_flag(Flags::SUBTRACT, true);
                cpu.update_flag(Flags::HALF_CARRY, true);
            }
            Opcode::Scf => {
                cpu.update_flag(Flags::SUBTRACT, false);
                cpu.update_flag(Flags::HALF_CARRY, false);
                cpu.update_flag(Flags::CARRY, true);
            }
            Opcode::Ccf => {
                let carry = cpu.read_flag(Flags::CARRY);
                cpu.update_flag(Flags::SUBTRACT, false);
                cpu.update_flag(Flags::HALF_CARRY, false);
                cpu.update_flag(Flags::CARRY, !carry);
            }
            _ => {
                return Err(GbError::InvalidHandler {
                    instruction: instruction.to_string(),
                })
            }
        }

        Ok(instruction.cycles.0)
    }

    /// jp / jr / call. PC already points past the instruction.
    pub fn jump(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let (lhs, rhs) = Handlers::operands(instruction)?;
        let Operand::Conditional(condition) = lhs else {
            return Err(GbError::InvalidHandler {
                instruction: instruction.to_string(),
            });
        };

        if !Handlers::check_condition(cpu, condition) {
            return Ok(instruction.cycles.1.unwrap_or(instruction.cycles.0));
        }

        let pc = cpu.read_register16(&Register::PC)?;
        let target = match (instruction.opcode, rhs) {
            (Opcode::Jr, Operand::Offset(offset)) => pc.wrapping_add_signed(*offset as i16),
            (Opcode::Jp | Opcode::Call, Operand::Imm16(addr, _)) => *addr,
            (Opcode::Jp, Operand::Reg16(reg, _)) => cpu.read_register16(reg)?,
            _ => {
                return Err(GbError::UnresolvedTarget {
                    target: rhs.to_string(),
                })
            }
        };

        if instruction.opcode == Opcode::Call {
            cpu.push_stack(mmu, pc);
        }
        cpu.write_register16(&Register::PC, target)?;

        Ok(instruction.cycles.0)
    }

    pub fn ret(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        if instruction.opcode == Opcode::Reti {
            let addr = cpu.pop_stack(mmu);
            cpu.write_register16(&Register::PC, addr)?;
            cpu.enable_interrupts();
            return Ok(instruction.cycles.0);
        }

        let Some(Operand::Conditional(condition)) = instruction.lhs.as_ref() else {
            return Err(GbError::InvalidHandler {
                instruction: instruction.to_string(),
            });
        };

        if !Handlers::check_condition(cpu, condition) {
            return Ok(instruction.cycles.1.unwrap_or(instruction.cycles.0));
        }

        let addr = cpu.pop_stack(mmu);
        cpu.write_register16(&Register::PC, addr)?;

        Ok(instruction.cycles.0)
    }

    pub fn restart(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        let Some(Operand::Imm8(vector, _)) = instruction.lhs.as_ref() else {
            return Err(GbError::InvalidHandler {
                instruction: instruction.to_string(),
            });
        };

        let pc = cpu.read_register16(&Register::PC)?;
        cpu.push_stack(mmu, pc);
        cpu.write_register16(&Register::PC, *vector as u16)?;

        Ok(instruction.cycles.0)
    }

    pub fn push(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        match Handlers::target(instruction)? {
            Operand::Reg16(reg, _) => {
                let value = cpu.read_register16(reg)?;
                cpu.push_stack(mmu, value);
            }
            operand => {
                return Err(GbError::UnresolvedTarget {
                    target: operand.to_string(),
                })
            }
        }

        Ok(instruction.cycles.0)
    }

    pub fn pop(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        match Handlers::target(instruction)? {
            Operand::Reg16(reg, _) => {
                let value = cpu.pop_stack(mmu);
                cpu.write_register16(reg, value)?;
            }
            operand => {
                return Err(GbError::UnresolvedTarget {
                    target: operand.to_string(),
                })
            }
        }

        Ok(instruction.cycles.0)
    }

    /// di / ei. EI only takes effect after the next instruction.
    pub fn interrupts(cpu: &mut Cpu, _mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        match instruction.opcode {
            Opcode::Di => cpu.disable_interrupts(),
            Opcode::Ei => cpu.schedule_interrupts(),
            _ => {
                return Err(GbError::InvalidHandler {
                    instruction: instruction.to_string(),
                })
            }
        }

        Ok(instruction.cycles.0)
    }

    pub fn halt(cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        if !cpu.interrupts_enabled() && !mmu.pending_interrupts().is_empty() {
            // HALT bug: no halt, and the next opcode byte is fetched twice
            cpu.trigger_halt_bug();
        } else {
            cpu.halt();
        }

        Ok(instruction.cycles.0)
    }

    pub fn stop(_cpu: &mut Cpu, mmu: &mut Mmu, instruction: &Instruction) -> Result<usize, GbError> {
        warn!("STOP executed, treating it as a no-op");
        mmu.reset_divider();

        Ok(instruction.cycles.0)
    }

    fn operands(instruction: &Instruction) -> Result<(&Operand, &Operand), GbError> {
        match (instruction.lhs.as_ref(), instruction.rhs.as_ref()) {
            (Some(lhs), Some(rhs)) => Ok((lhs, rhs)),
            _ => Err(GbError::InvalidHandler {
                instruction: instruction.to_string(),
            }),
        }
    }

    fn target(instruction: &Instruction) -> Result<&Operand, GbError> {
        instruction.lhs.as_ref().ok_or(GbError::InvalidHandler {
            instruction: instruction.to_string(),
        })
    }

    fn bit_operands(instruction: &Instruction) -> Result<(u8, &Operand), GbError> {
        match Handlers::operands(instruction)? {
            (Operand::Bit(bit), operand) => Ok((*bit, operand)),
            _ => Err(GbError::InvalidHandler {
                instruction: instruction.to_string(),
            }),
        }
    }

    /// Reads an 8-bit operand. (HL+) and (HL-) adjust HL after the access.
    fn read_operand(cpu: &mut Cpu, mmu: &Mmu, operand: &Operand) -> Result<u8, GbError> {
        match operand {
            // ld a, (c)
            Operand::Reg8(reg, mode) if mode.contains(AddressingMode::Indirect) => {
                let offset = cpu.read_register(reg)?;
                Ok(mmu.read(0xff00 | offset as u16))
            }
            Operand::Reg8(reg, _) => cpu.read_register(reg),
            Operand::Reg16(reg, mode) if mode.contains(AddressingMode::Indirect) => {
                let addr = Handlers::pointer(cpu, reg, *mode)?;
                Ok(mmu.read(addr))
            }
            // ldh a, (imm8)
            Operand::Imm8(imm, mode) if mode.contains(AddressingMode::Indirect) => Ok(mmu.read(0xff00 | *imm as u16)),
            Operand::Imm8(imm, _) => Ok(*imm),
            Operand::Imm16(addr, mode) if mode.contains(AddressingMode::Indirect) => Ok(mmu.read(*addr)),
            _ => Err(GbError::UnresolvedTarget {
                target: operand.to_string(),
            }),
        }
    }

    fn write_operand(cpu: &mut Cpu, mmu: &mut Mmu, operand: &Operand, value: u8) -> Result<(), GbError> {
        match operand {
            // ld (c), a
            Operand::Reg8(reg, mode) if mode.contains(AddressingMode::Indirect) => {
                let offset = cpu.read_register(reg)?;
                mmu.write(0xff00 | offset as u16, value);
            }
            Operand::Reg8(reg, _) => cpu.write_register(reg, value)?,
            Operand::Reg16(reg, mode) if mode.contains(AddressingMode::Indirect) => {
                let addr = Handlers::pointer(cpu, reg, *mode)?;
                mmu.write(addr, value);
            }
            // ldh (imm8), a
            Operand::Imm8(imm, mode) if mode.contains(AddressingMode::Indirect) => mmu.write(0xff00 | *imm as u16, value),
            Operand::Imm16(addr, mode) if mode.contains(AddressingMode::Indirect) => mmu.write(*addr, value),
            _ => {
                return Err(GbError::UnresolvedTarget {
                    target: operand.to_string(),
                })
            }
        }

        Ok(())
    }

    fn pointer(cpu: &mut Cpu, reg: &Register, mode: AddressingMode) -> Result<u16, GbError> {
        let addr = cpu.read_register16(reg)?;

        if mode.contains(AddressingMode::Increment) {
            cpu.write_register16(reg, addr.wrapping_add(1))?;
        } else if mode.contains(AddressingMode::Decrement) {
            cpu.write_register16(reg, addr.wrapping_sub(1))?;
        }

        Ok(addr)
    }

    fn add8(cpu: &mut Cpu, a: u8, value: u8, carry: u8) -> u8 {
        let result = a as u16 + value as u16 + carry as u16;
        let half_carry = (a & 0x0f) + (value & 0x0f) + carry > 0x0f;

        cpu.set_flags(result as u8 == 0, false, half_carry, result > 0xff);
        result as u8
    }

    fn sub8(cpu: &mut Cpu, a: u8, value: u8, carry: u8) -> u8 {
        let result = a.wrapping_sub(value).wrapping_sub(carry);
        let half_carry = (a & 0x0f) < (value & 0x0f) + carry;
        let borrow = (a as u16) < value as u16 + carry as u16;

        cpu.set_flags(result == 0, true, half_carry, borrow);
        result
    }

    /// sp + e8, shared by `add sp, e8` and `ld hl, sp+e8`. H and C come from the low byte.
    fn add_signed_offset(cpu: &mut Cpu, base: u16, offset: i8) -> u16 {
        let value = offset as u8 as u16;
        let half_carry = (base & 0x000f) + (value & 0x000f) > 0x000f;
        let carry = (base & 0x00ff) + value > 0x00ff;

        cpu.set_flags(false, false, half_carry, carry);
        base.wrapping_add_signed(offset as i16)
    }

    fn check_condition(cpu: &Cpu, condition: &Condition) -> bool {
        match condition {
            Condition::Z => cpu.read_flag(Flags::ZERO),
            Condition::NZ => !cpu.read_flag(Flags::ZERO),
            Condition::C => cpu.read_flag(Flags::CARRY),
            Condition::NC => !cpu.read_flag(Flags::CARRY),
            Condition::None => true,
        }
    }
}
