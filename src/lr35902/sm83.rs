use crate::error::GbError;
use crate::memory::mmu::Mmu;
use bitflags::bitflags;

type FDecode = fn(u8, Opcode) -> Result<Instruction, GbError>;

const PREFIX_OPCODE: u8 = 0xcb;
const ILLEGAL_OPCODES: [u8; 11] = [0xd3, 0xdb, 0xdd, 0xe3, 0xe4, 0xeb, 0xec, 0xed, 0xf4, 0xfc, 0xfd];

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Register {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    F,
    AF,
    BC,
    DE,
    HL,
    SP,
    PC,
}

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    pub struct AddressingMode: u8 {
        const Direct    = 0b0001;
        const Indirect  = 0b0010;
        const Increment = 0b0100;
        const Decrement = 0b1000;
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Condition {
    None,
    NZ,
    Z,
    NC,
    C,
}

/// Instruction operands. Immediates are zero in the decode tables and get filled in
/// from the bytes following the opcode when an instruction is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg8(Register, AddressingMode),
    Reg16(Register, AddressingMode),
    Imm8(u8, AddressingMode),
    Imm16(u16, AddressingMode),
    Conditional(Condition),
    DisplacedReg16(Register, i8, AddressingMode),
    Offset(i8),
    Bit(u8),
}

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Opcode {
    Nop,
    Ld,
    Inc,
    Dec,
    Rlc,
    Rrc,
    Swap,
    Rr,
    Srl,
    Bit,
    Res,
    Set,
    Jp,
    Jr,
    Call,
    Ret,
    Rst,
    Push,
    Pop,
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
    Reti,
    Halt,
    Stop,
    Di,
    Ei,
    Ldh,
    Rl,
    Sla,
    Sra,
    Ccf,
    Scf,
    Cpl,
    Daa,
    Rra,
    Rla,
    Rrca,
    Rlca,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub lhs: Option<Operand>,
    pub rhs: Option<Operand>,
    pub length: usize,
    /// T-cycles when taken, and when not taken for conditional control flow.
    pub cycles: (usize, Option<usize>),
}

macro_rules! define_decoder {
    ( $pattern:expr, $opcode:expr, $function:expr ) => {{
        (String::from($pattern), $opcode, $function)
    }};
}

/// Opcode decoder. The bit patterns are expanded once into one table per opcode page.
#[derive(Clone)]
pub struct Sm83 {
    lut: Vec<Option<Instruction>>,
    lut_prefixed: Vec<Option<Instruction>>,
}

impl Sm83 {
    pub fn new() -> Sm83 {
        let mut decoder_lut = Vec::new();
        let mut decoder_lut_prefixed = Vec::new();

        Sm83::propagate_decoders(&mut decoder_lut);
        Sm83::propagate_decoders_prefixed(&mut decoder_lut_prefixed);

        let lut = (0..=u8::MAX)
            .map(|byte| {
                if byte == PREFIX_OPCODE || ILLEGAL_OPCODES.contains(&byte) {
                    return None;
                }
                Sm83::expand(&decoder_lut, byte)
            })
            .collect();
        let lut_prefixed = (0..=u8::MAX).map(|byte| Sm83::expand(&decoder_lut_prefixed, byte)).collect();

        Sm83 { lut, lut_prefixed }
    }

    fn expand(decoders: &[(String, Opcode, FDecode)], byte: u8) -> Option<Instruction> {
        decoders
            .iter()
            .find(|(pattern, _, _)| Sm83::matches(pattern, byte))
            .and_then(|(_, opcode, decoder_fn)| decoder_fn(byte, *opcode).ok())
    }

    fn matches(pattern: &str, byte: u8) -> bool {
        pattern.len() == 8
            && pattern
                .bytes()
                .enumerate()
                .all(|(i, c)| c == b'x' || (c == b'1') == (byte & (0x80 >> i) != 0))
    }

    /// Decodes the instruction at `pc`. With `halt_bug` set the byte after the opcode is the
    /// opcode itself, because the CPU failed to advance PC once after HALT.
    pub fn decode(&self, mmu: &Mmu, pc: u16, halt_bug: bool) -> Result<Instruction, GbError> {
        let opcode_byte = mmu.read(pc);
        let operand_address = if halt_bug { pc } else { pc.wrapping_add(1) };

        let entry = if opcode_byte == PREFIX_OPCODE {
            self.lut_prefixed[mmu.read(operand_address) as usize].as_ref()
        } else {
            self.lut[opcode_byte as usize].as_ref()
        };

        let mut instruction = entry.cloned().ok_or(GbError::IllegalOpcode {
            opcode: opcode_byte,
            address: pc,
        })?;

        if opcode_byte != PREFIX_OPCODE && instruction.length > 1 {
            instruction.lhs = instruction.lhs.map(|operand| Sm83::fill_operand(mmu, operand, operand_address));
            instruction.rhs = instruction.rhs.map(|operand| Sm83::fill_operand(mmu, operand, operand_address));
        }

        Ok(instruction)
    }

    fn fill_operand(mmu: &Mmu, operand: Operand, address: u16) -> Operand {
        match operand {
            Operand::Imm8(_, mode) => Operand::Imm8(mmu.read(address), mode),
            Operand::Imm16(_, mode) => Operand::Imm16(mmu.read16(address), mode),
            Operand::Offset(_) => Operand::Offset(mmu.read(address) as i8),
            Operand::DisplacedReg16(reg, _, mode) => Operand::DisplacedReg16(reg, mmu.read(address) as i8, mode),
            _ => operand,
        }
    }

    fn lookup_register(data: u8) -> Result<Register, GbError> {
        match data {
            0b000 => Ok(Register::B),
            0b001 => Ok(Register::C),
            0b010 => Ok(Register::D),
            0b011 => Ok(Register::E),
            0b100 => Ok(Register::H),
            0b101 => Ok(Register::L),
            0b110 => Ok(Register::HL),
            0b111 => Ok(Register::A),
            _ => Err(GbError::UnknownRegisterBits { data }),
        }
    }

    fn lookup_register_16(data: u8) -> Result<Register, GbError> {
        match data {
            0b00 => Ok(Register::BC),
            0b01 => Ok(Register::DE),
            0b10 => Ok(Register::HL),
            0b11 => Ok(Register::SP),
            _ => Err(GbError::UnknownRegisterBits { data }),
        }
    }

    /// Same as `lookup_register_16`, except pattern 11 selects AF (push/pop).
    fn lookup_register_16_stack(data: u8) -> Result<Register, GbError> {
        match Sm83::lookup_register_16(data)? {
            Register::SP => Ok(Register::AF),
            register => Ok(register),
        }
    }

    fn lookup_condition_3bits(data: u8) -> Result<Condition, GbError> {
        match data {
            0b011 => Ok(Condition::None),
            0b100 => Ok(Condition::NZ),
            0b101 => Ok(Condition::Z),
            0b110 => Ok(Condition::NC),
            0b111 => Ok(Condition::C),
            _ => Err(GbError::UnknownConditionBits { data }),
        }
    }

    fn lookup_condition_2bits(data: u8) -> Result<Condition, GbError> {
        match data {
            0b00 => Ok(Condition::NZ),
            0b01 => Ok(Condition::Z),
            0b10 => Ok(Condition::NC),
            0b11 => Ok(Condition::C),
            _ => Err(GbError::UnknownConditionBits { data }),
        }
    }

    fn decode_8bit_operand(value: u8, base_cycles: usize, hl_cycles: usize) -> Result<(Operand, usize), GbError> {
        let operand = if value == 0b110 {
            Operand::Reg16(Register::HL, AddressingMode::Indirect)
        } else {
            Operand::Reg8(Sm83::lookup_register(value)?, AddressingMode::Direct)
        };
        let cycles = if value != 0b110 { base_cycles } else { hl_cycles };
        Ok((operand, cycles))
    }

    fn implied(opcode: Opcode, cycles: usize) -> Instruction {
        Instruction {
            opcode,
            lhs: None,
            rhs: None,
            length: 1,
            cycles: (cycles, None),
        }
    }

    fn decode_implied(_: u8, opcode: Opcode) -> Result<Instruction, GbError> {
        Ok(Sm83::implied(opcode, 4))
    }

    // add/adc/sub/sbc/and/xor/or/cp A, r8 / (HL)
    fn decode_alu_register(opcode_byte: u8, opcode: Opcode) -> Result<Instruction, GbError> {
        let (rhs, cycles) = Sm83::decode_8bit_operand(opcode_byte & 0b0000_0111, 4, 8)?;

        Ok(Instruction {
            opcode,
            lhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
            rhs: Some(rhs),
            length: 1,
            cycles: (cycles, None),
        })
    }

    // add/adc/sub/sbc/and/xor/or/cp A, imm8
    fn decode_alu_immediate(_: u8, opcode: Opcode) -> Result<Instruction, GbError> {
        Ok(Instruction {
            opcode,
            lhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
            rhs: Some(Operand::Imm8(0, AddressingMode::Direct)),
            length: 2,
            cycles: (8, None),
        })
    }

    // rotates, shifts and swap on r8 / (HL)
    fn decode_shift(opcode_byte: u8, opcode: Opcode) -> Result<Instruction, GbError> {
        let (lhs, cycles) = Sm83::decode_8bit_operand(opcode_byte & 0b0000_0111, 8, 16)?;

        Ok(Instruction {
            opcode,
            lhs: Some(lhs),
            rhs: None,
            length: 2,
            cycles: (cycles, None),
        })
    }

    // bit/res/set n, r8 / (HL)
    fn decode_bit(opcode_byte: u8, opcode: Opcode) -> Result<Instruction, GbError> {
        let bit = (opcode_byte & 0b0011_1000) >> 3;
        let hl_cycles = if opcode == Opcode::Bit { 12 } else { 16 };
        let (rhs, cycles) = Sm83::decode_8bit_operand(opcode_byte & 0b0000_0111, 8, hl_cycles)?;

        Ok(Instruction {
            opcode,
            lhs: Some(Operand::Bit(bit)),
            rhs: Some(rhs),
            length: 2,
            cycles: (cycles, None),
        })
    }

    fn propagate_decoders(lut: &mut Vec<(String, Opcode, FDecode)>) {
        // nop
        lut.push(define_decoder!("00000000", Opcode::Nop, Sm83::decode_implied));

        // ld (imm16), SP
        lut.push(define_decoder!("00001000", Opcode::Ld, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Imm16(0, AddressingMode::Indirect)),
                rhs: Some(Operand::Reg16(Register::SP, AddressingMode::Direct)),
                length: 3,
                cycles: (20, None),
            })
        }));

        // stop imm8
        lut.push(define_decoder!("00010000", Opcode::Stop, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Imm8(0, AddressingMode::Direct)),
                rhs: None,
                length: 2,
                cycles: (4, None),
            })
        }));

        // jr cond, imm8 / jr imm8
        lut.push(define_decoder!("00xxx000", Opcode::Jr, |opcode_byte, opcode| {
            let condition = Sm83::lookup_condition_3bits((opcode_byte & 0b0011_1000) >> 3)?;
            let cycles = if condition != Condition::None { (12, Some(8)) } else { (12, None) };

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Conditional(condition)),
                rhs: Some(Operand::Offset(0)),
                length: 2,
                cycles,
            })
        }));

        // ld r16, imm16
        lut.push(define_decoder!("00xx0001", Opcode::Ld, |opcode_byte, opcode| {
            let destination = (opcode_byte & 0b0011_0000) >> 4;

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg16(Sm83::lookup_register_16(destination)?, AddressingMode::Direct)),
                rhs: Some(Operand::Imm16(0, AddressingMode::Direct)),
                length: 3,
                cycles: (12, None),
            })
        }));

        // ld (r16), A / ld (HL+), A / ld (HL-), A
        lut.push(define_decoder!("00xx0010", Opcode::Ld, |opcode_byte, opcode| {
            let lhs = match opcode_byte {
                0x22 => Operand::Reg16(Register::HL, AddressingMode::Indirect | AddressingMode::Increment),
                0x32 => Operand::Reg16(Register::HL, AddressingMode::Indirect | AddressingMode::Decrement),
                _ => {
                    let destination = (opcode_byte & 0b0011_0000) >> 4;
                    Operand::Reg16(Sm83::lookup_register_16(destination)?, AddressingMode::Indirect)
                }
            };

            Ok(Instruction {
                opcode,
                lhs: Some(lhs),
                rhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
                length: 1,
                cycles: (8, None),
            })
        }));

        // inc r16
        lut.push(define_decoder!("00xx0011", Opcode::Inc, |opcode_byte, opcode| {
            let destination = (opcode_byte & 0b0011_0000) >> 4;

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg16(Sm83::lookup_register_16(destination)?, AddressingMode::Direct)),
                rhs: None,
                length: 1,
                cycles: (8, None),
            })
        }));

        // inc r8 / inc (HL)
        lut.push(define_decoder!("00xxx100", Opcode::Inc, |opcode_byte, opcode| {
            let destination = (opcode_byte & 0b0011_1000) >> 3;
            let (lhs, cycles) = Sm83::decode_8bit_operand(destination, 4, 12)?;

            Ok(Instruction {
                opcode,
                lhs: Some(lhs),
                rhs: None,
                length: 1,
                cycles: (cycles, None),
            })
        }));

        // dec r8 / dec (HL)
        lut.push(define_decoder!("00xxx101", Opcode::Dec, |opcode_byte, opcode| {
            let destination = (opcode_byte & 0b0011_1000) >> 3;
            let (lhs, cycles) = Sm83::decode_8bit_operand(destination, 4, 12)?;

            Ok(Instruction {
                opcode,
                lhs: Some(lhs),
                rhs: None,
                length: 1,
                cycles: (cycles, None),
            })
        }));

        // ld r8, imm8 / ld (HL), imm8
        lut.push(define_decoder!("00xxx110", Opcode::Ld, |opcode_byte, opcode| {
            let destination = (opcode_byte & 0b0011_1000) >> 3;
            let (lhs, cycles) = Sm83::decode_8bit_operand(destination, 8, 12)?;

            Ok(Instruction {
                opcode,
                lhs: Some(lhs),
                rhs: Some(Operand::Imm8(0, AddressingMode::Direct)),
                length: 2,
                cycles: (cycles, None),
            })
        }));

        // rlca / rrca / rla / rra / daa / cpl / scf / ccf
        lut.push(define_decoder!("00000111", Opcode::Rlca, Sm83::decode_implied));
        lut.push(define_decoder!("00001111", Opcode::Rrca, Sm83::decode_implied));
        lut.push(define_decoder!("00010111", Opcode::Rla, Sm83::decode_implied));
        lut.push(define_decoder!("00011111", Opcode::Rra, Sm83::decode_implied));
        lut.push(define_decoder!("00100111", Opcode::Daa, Sm83::decode_implied));
        lut.push(define_decoder!("00101111", Opcode::Cpl, Sm83::decode_implied));
        lut.push(define_decoder!("00110111", Opcode::Scf, Sm83::decode_implied));
        lut.push(define_decoder!("00111111", Opcode::Ccf, Sm83::decode_implied));

        // add HL, r16
        lut.push(define_decoder!("00xx1001", Opcode::Add, |opcode_byte, opcode| {
            let source = (opcode_byte & 0b0011_0000) >> 4;

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg16(Register::HL, AddressingMode::Direct)),
                rhs: Some(Operand::Reg16(Sm83::lookup_register_16(source)?, AddressingMode::Direct)),
                length: 1,
                cycles: (8, None),
            })
        }));

        // ld A, (r16) / ld A, (HL+) / ld A, (HL-)
        lut.push(define_decoder!("00xx1010", Opcode::Ld, |opcode_byte, opcode| {
            let rhs = match opcode_byte {
                0x2a => Operand::Reg16(Register::HL, AddressingMode::Indirect | AddressingMode::Increment),
                0x3a => Operand::Reg16(Register::HL, AddressingMode::Indirect | AddressingMode::Decrement),
                _ => {
                    let source = (opcode_byte & 0b0011_0000) >> 4;
                    Operand::Reg16(Sm83::lookup_register_16(source)?, AddressingMode::Indirect)
                }
            };

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
                rhs: Some(rhs),
                length: 1,
                cycles: (8, None),
            })
        }));

        // dec r16
        lut.push(define_decoder!("00xx1011", Opcode::Dec, |opcode_byte, opcode| {
            let destination = (opcode_byte & 0b0011_0000) >> 4;

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg16(Sm83::lookup_register_16(destination)?, AddressingMode::Direct)),
                rhs: None,
                length: 1,
                cycles: (8, None),
            })
        }));

        // halt, has to come before ld r8, r8
        lut.push(define_decoder!("01110110", Opcode::Halt, Sm83::decode_implied));

        // ld r8, r8 / ld r8, (HL) / ld (HL), r8
        lut.push(define_decoder!("01xxxxxx", Opcode::Ld, |opcode_byte, opcode| {
            let destination = (opcode_byte & 0b0011_1000) >> 3;
            let source = opcode_byte & 0b0000_0111;

            let (lhs, cycles1) = Sm83::decode_8bit_operand(destination, 4, 8)?;
            let (rhs, cycles2) = Sm83::decode_8bit_operand(source, 4, 8)?;

            Ok(Instruction {
                opcode,
                lhs: Some(lhs),
                rhs: Some(rhs),
                length: 1,
                cycles: (std::cmp::max(cycles1, cycles2), None),
            })
        }));

        lut.push(define_decoder!("10000xxx", Opcode::Add, Sm83::decode_alu_register));
        lut.push(define_decoder!("10001xxx", Opcode::Adc, Sm83::decode_alu_register));
        lut.push(define_decoder!("10010xxx", Opcode::Sub, Sm83::decode_alu_register));
        lut.push(define_decoder!("10011xxx", Opcode::Sbc, Sm83::decode_alu_register));
        lut.push(define_decoder!("10100xxx", Opcode::And, Sm83::decode_alu_register));
        lut.push(define_decoder!("10101xxx", Opcode::Xor, Sm83::decode_alu_register));
        lut.push(define_decoder!("10110xxx", Opcode::Or, Sm83::decode_alu_register));
        lut.push(define_decoder!("10111xxx", Opcode::Cp, Sm83::decode_alu_register));

        lut.push(define_decoder!("11000110", Opcode::Add, Sm83::decode_alu_immediate));
        lut.push(define_decoder!("11001110", Opcode::Adc, Sm83::decode_alu_immediate));
        lut.push(define_decoder!("11010110", Opcode::Sub, Sm83::decode_alu_immediate));
        lut.push(define_decoder!("11011110", Opcode::Sbc, Sm83::decode_alu_immediate));
        lut.push(define_decoder!("11100110", Opcode::And, Sm83::decode_alu_immediate));
        lut.push(define_decoder!("11101110", Opcode::Xor, Sm83::decode_alu_immediate));
        lut.push(define_decoder!("11110110", Opcode::Or, Sm83::decode_alu_immediate));
        lut.push(define_decoder!("11111110", Opcode::Cp, Sm83::decode_alu_immediate));

        // ret
        lut.push(define_decoder!("11001001", Opcode::Ret, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Conditional(Condition::None)),
                rhs: None,
                length: 1,
                cycles: (16, None),
            })
        }));

        // reti
        lut.push(define_decoder!("11011001", Opcode::Reti, |_, opcode| Ok(Sm83::implied(opcode, 16))));

        // ret cond
        lut.push(define_decoder!("110xx000", Opcode::Ret, |opcode_byte, opcode| {
            let condition = Sm83::lookup_condition_2bits((opcode_byte & 0b0001_1000) >> 3)?;

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Conditional(condition)),
                rhs: None,
                length: 1,
                cycles: (20, Some(8)),
            })
        }));

        // pop r16
        lut.push(define_decoder!("11xx0001", Opcode::Pop, |opcode_byte, opcode| {
            let destination = (opcode_byte & 0b0011_0000) >> 4;

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg16(Sm83::lookup_register_16_stack(destination)?, AddressingMode::Direct)),
                rhs: None,
                length: 1,
                cycles: (12, None),
            })
        }));

        // push r16
        lut.push(define_decoder!("11xx0101", Opcode::Push, |opcode_byte, opcode| {
            let source = (opcode_byte & 0b0011_0000) >> 4;

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg16(Sm83::lookup_register_16_stack(source)?, AddressingMode::Direct)),
                rhs: None,
                length: 1,
                cycles: (16, None),
            })
        }));

        // jp hl
        lut.push(define_decoder!("11101001", Opcode::Jp, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Conditional(Condition::None)),
                rhs: Some(Operand::Reg16(Register::HL, AddressingMode::Direct)),
                length: 1,
                cycles: (4, None),
            })
        }));

        // jp imm16
        lut.push(define_decoder!("11000011", Opcode::Jp, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Conditional(Condition::None)),
                rhs: Some(Operand::Imm16(0, AddressingMode::Direct)),
                length: 3,
                cycles: (16, None),
            })
        }));

        // jp cond, imm16
        lut.push(define_decoder!("110xx010", Opcode::Jp, |opcode_byte, opcode| {
            let condition = Sm83::lookup_condition_2bits((opcode_byte & 0b0001_1000) >> 3)?;

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Conditional(condition)),
                rhs: Some(Operand::Imm16(0, AddressingMode::Direct)),
                length: 3,
                cycles: (16, Some(12)),
            })
        }));

        // call imm16
        lut.push(define_decoder!("11001101", Opcode::Call, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Conditional(Condition::None)),
                rhs: Some(Operand::Imm16(0, AddressingMode::Direct)),
                length: 3,
                cycles: (24, None),
            })
        }));

        // call cond, imm16
        lut.push(define_decoder!("110xx100", Opcode::Call, |opcode_byte, opcode| {
            let condition = Sm83::lookup_condition_2bits((opcode_byte & 0b0001_1000) >> 3)?;

            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Conditional(condition)),
                rhs: Some(Operand::Imm16(0, AddressingMode::Direct)),
                length: 3,
                cycles: (24, Some(12)),
            })
        }));

        // rst n
        lut.push(define_decoder!("11xxx111", Opcode::Rst, |opcode_byte, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Imm8(opcode_byte & 0b0011_1000, AddressingMode::Direct)),
                rhs: None,
                length: 1,
                cycles: (16, None),
            })
        }));

        // ldh (imm8), A
        lut.push(define_decoder!("11100000", Opcode::Ldh, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Imm8(0, AddressingMode::Indirect)),
                rhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
                length: 2,
                cycles: (12, None),
            })
        }));

        // ldh A, (imm8)
        lut.push(define_decoder!("11110000", Opcode::Ldh, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
                rhs: Some(Operand::Imm8(0, AddressingMode::Indirect)),
                length: 2,
                cycles: (12, None),
            })
        }));

        // ld (C), A
        lut.push(define_decoder!("11100010", Opcode::Ld, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg8(Register::C, AddressingMode::Indirect)),
                rhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
                length: 1,
                cycles: (8, None),
            })
        }));

        // ld A, (C)
        lut.push(define_decoder!("11110010", Opcode::Ld, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
                rhs: Some(Operand::Reg8(Register::C, AddressingMode::Indirect)),
                length: 1,
                cycles: (8, None),
            })
        }));

        // ld (imm16), A
        lut.push(define_decoder!("11101010", Opcode::Ld, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Imm16(0, AddressingMode::Indirect)),
                rhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
                length: 3,
                cycles: (16, None),
            })
        }));

        // ld A, (imm16)
        lut.push(define_decoder!("11111010", Opcode::Ld, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg8(Register::A, AddressingMode::Direct)),
                rhs: Some(Operand::Imm16(0, AddressingMode::Indirect)),
                length: 3,
                cycles: (16, None),
            })
        }));

        // add sp, imm8
        lut.push(define_decoder!("11101000", Opcode::Add, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg16(Register::SP, AddressingMode::Direct)),
                rhs: Some(Operand::Offset(0)),
                length: 2,
                cycles: (16, None),
            })
        }));

        // ld hl, sp+/-imm8
        lut.push(define_decoder!("11111000", Opcode::Ld, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg16(Register::HL, AddressingMode::Direct)),
                rhs: Some(Operand::DisplacedReg16(Register::SP, 0, AddressingMode::Direct)),
                length: 2,
                cycles: (12, None),
            })
        }));

        // ld sp, hl
        lut.push(define_decoder!("11111001", Opcode::Ld, |_, opcode| {
            Ok(Instruction {
                opcode,
                lhs: Some(Operand::Reg16(Register::SP, AddressingMode::Direct)),
                rhs: Some(Operand::Reg16(Register::HL, AddressingMode::Direct)),
                length: 1,
                cycles: (8, None),
            })
        }));

        // di / ei
        lut.push(define_decoder!("11110011", Opcode::Di, Sm83::decode_implied));
        lut.push(define_decoder!("11111011", Opcode::Ei, Sm83::decode_implied));
    }

    fn propagate_decoders_prefixed(lut: &mut Vec<(String, Opcode, FDecode)>) {
        lut.push(define_decoder!("00000xxx", Opcode::Rlc, Sm83::decode_shift));
        lut.push(define_decoder!("00001xxx", Opcode::Rrc, Sm83::decode_shift));
        lut.push(define_decoder!("00010xxx", Opcode::Rl, Sm83::decode_shift));
        lut.push(define_decoder!("00011xxx", Opcode::Rr, Sm83::decode_shift));
        lut.push(define_decoder!("00100xxx", Opcode::Sla, Sm83::decode_shift));
        lut.push(define_decoder!("00101xxx", Opcode::Sra, Sm83::decode_shift));
        lut.push(define_decoder!("00110xxx", Opcode::Swap, Sm83::decode_shift));
        lut.push(define_decoder!("00111xxx", Opcode::Srl, Sm83::decode_shift));

        lut.push(define_decoder!("01xxxxxx", Opcode::Bit, Sm83::decode_bit));
        lut.push(define_decoder!("10xxxxxx", Opcode::Res, Sm83::decode_bit));
        lut.push(define_decoder!("11xxxxxx", Opcode::Set, Sm83::decode_bit));
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut output = format!("{:?}", self.opcode).to_lowercase();

        let mut ignore_destination = false;
        if let Some(destination) = &self.lhs {
            match destination {
                Operand::Conditional(Condition::None) => ignore_destination = true,
                _ => output.push_str(&format!(" {}", destination)),
            };
        }

        if let Some(source) = &self.rhs {
            if !ignore_destination {
                output.push_str(&format!(", {}", source));
            } else {
                output.push_str(&format!(" {}", source));
            }
        }

        write!(f, "{}", output)
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let output = match self {
            Register::A => "a",
            Register::B => "b",
            Register::C => "c",
            Register::D => "d",
            Register::E => "e",
            Register::H => "h",
            Register::L => "l",
            Register::F => "f",
            Register::AF => "af",
            Register::BC => "bc",
            Register::DE => "de",
            Register::HL => "hl",
            Register::SP => "sp",
            Register::PC => "pc",
        };

        write!(f, "{}", output)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Operand::Reg8(reg, mode) if mode.contains(AddressingMode::Indirect) => write!(f, "({})", reg),
            Operand::Reg8(reg, _) => write!(f, "{}", reg),
            Operand::Reg16(reg, mode) if mode.contains(AddressingMode::Increment) => write!(f, "({}+)", reg),
            Operand::Reg16(reg, mode) if mode.contains(AddressingMode::Decrement) => write!(f, "({}-)", reg),
            Operand::Reg16(reg, mode) if mode.contains(AddressingMode::Indirect) => write!(f, "({})", reg),
            Operand::Reg16(reg, _) => write!(f, "{}", reg),
            Operand::Imm8(value, mode) if mode.contains(AddressingMode::Indirect) => write!(f, "(${:02x})", value),
            Operand::Imm8(value, _) => write!(f, "${:02x}", value),
            Operand::Imm16(value, mode) if mode.contains(AddressingMode::Indirect) => write!(f, "(${:04x})", value),
            Operand::Imm16(value, _) => write!(f, "${:04x}", value),
            Operand::Conditional(cond) => write!(f, "{}", cond),
            Operand::Offset(value) => write!(f, "{:+}", value),
            Operand::Bit(value) => write!(f, "{}", value),
            Operand::DisplacedReg16(reg, value, _) => write!(f, "{}{:+}", reg, value),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let output = match self {
            Condition::None => "",
            Condition::NZ => "nz",
            Condition::Z => "z",
            Condition::NC => "nc",
            Condition::C => "c",
        };

        write!(f, "{}", output)
    }
}
