//! Linear bytecode decoding
//!
//! Walks a method's `code[]` once, producing one `Instruction` per opcode.
//! Every instruction's `pc` is its byte offset from the start of the code
//! array and the sum of all lengths equals the code length exactly.

use crate::instruction::{Instruction, Operands};
use crate::opcode::Opcode;
use garnet_classfile::ClassReader;
use garnet_common::{GarnetError, GarnetResult};

/// Decoder for one method's bytecode
pub struct BytecodeParser<'a> {
    code: &'a [u8],
}

impl<'a> BytecodeParser<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code }
    }

    /// Decode the whole code array into an instruction stream
    pub fn parse(&self) -> GarnetResult<Vec<Instruction>> {
        let mut reader = ClassReader::new(self.code);
        let mut instructions = Vec::new();

        while !reader.is_at_end() {
            let pc = reader.position() as u32;
            let opcode_byte = reader.read_u8()?;
            let opcode = Opcode::from_u8(opcode_byte)
                .ok_or(GarnetError::UnknownOpcode { opcode: opcode_byte, pc })?;

            let operands = match opcode {
                Opcode::TableSwitch => self.parse_table_switch(&mut reader, pc)?,
                Opcode::LookupSwitch => self.parse_lookup_switch(&mut reader, pc)?,
                Opcode::Wide => {
                    let inst = Self::parse_wide(&mut reader, pc)?;
                    instructions.push(inst);
                    continue;
                }
                _ => Self::parse_fixed(&mut reader, opcode, pc)?,
            };

            let length = reader.position() as u32 - pc;
            instructions.push(Instruction { opcode, pc, operands, length });
        }

        Ok(instructions)
    }

    fn parse_fixed(
        reader: &mut ClassReader<'_>,
        opcode: Opcode,
        pc: u32,
    ) -> GarnetResult<Operands> {
        use Opcode::*;
        let truncated = |e: GarnetError| match e {
            GarnetError::UnexpectedEndOfFile { message } => GarnetError::truncated(pc, message),
            other => other,
        };

        let operands = match opcode {
            Bipush => Operands::Byte(reader.read_i8().map_err(truncated)?),
            Sipush => Operands::Short(reader.read_i16().map_err(truncated)?),
            // The narrow pool load takes a single operand byte
            Ldc => Operands::Pool(reader.read_u8().map_err(truncated)? as u16),
            // The wide pool loads join two operand bytes big-endian
            LdcW | Ldc2W | GetStatic | PutStatic | GetField | PutField | InvokeVirtual
            | InvokeSpecial | InvokeStatic | New | ANewArray | CheckCast | InstanceOf => {
                Operands::Pool(reader.read_u16().map_err(truncated)?)
            }
            ILoad | LLoad | FLoad | DLoad | ALoad | IStore | LStore | FStore | DStore | AStore
            | Ret => Operands::Local(reader.read_u8().map_err(truncated)? as u16),
            IInc => Operands::Iinc {
                index: reader.read_u8().map_err(truncated)? as u16,
                delta: reader.read_i8().map_err(truncated)? as i16,
            },
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfICmpEq | IfICmpNe | IfICmpLt | IfICmpGe
            | IfICmpGt | IfICmpLe | IfACmpEq | IfACmpNe | Goto | Jsr | IfNull | IfNonNull => {
                Operands::Branch(reader.read_i16().map_err(truncated)? as i32)
            }
            GotoW | JsrW => Operands::Branch(reader.read_i32().map_err(truncated)?),
            NewArray => Operands::NewArrayType(reader.read_u8().map_err(truncated)?),
            InvokeInterface => {
                let pool_index = reader.read_u16().map_err(truncated)?;
                let count = reader.read_u8().map_err(truncated)?;
                reader.read_u8().map_err(truncated)?; // trailing zero byte
                Operands::Invoke { pool_index, count }
            }
            InvokeDynamic => {
                let pool_index = reader.read_u16().map_err(truncated)?;
                reader.read_u16().map_err(truncated)?; // two zero bytes
                Operands::Invoke { pool_index, count: 0 }
            }
            MultiANewArray => Operands::MultiANewArray {
                pool_index: reader.read_u16().map_err(truncated)?,
                dimensions: reader.read_u8().map_err(truncated)?,
            },
            _ => Operands::None,
        };
        Ok(operands)
    }

    /// `wide` modifies the following opcode to take a 2-byte local index
    /// (plus a 2-byte signed constant when the modified opcode is `iinc`)
    fn parse_wide(reader: &mut ClassReader<'_>, pc: u32) -> GarnetResult<Instruction> {
        let modified_byte = reader.read_u8().map_err(|_| {
            GarnetError::truncated(pc, "wide prefix with no modified opcode")
        })?;
        let modified = Opcode::from_u8(modified_byte)
            .ok_or(GarnetError::UnknownOpcode { opcode: modified_byte, pc })?;

        let operands = match modified {
            Opcode::ILoad | Opcode::LLoad | Opcode::FLoad | Opcode::DLoad | Opcode::ALoad
            | Opcode::IStore | Opcode::LStore | Opcode::FStore | Opcode::DStore
            | Opcode::AStore | Opcode::Ret => Operands::Local(
                reader
                    .read_u16()
                    .map_err(|_| GarnetError::truncated(pc, "wide local index"))?,
            ),
            Opcode::IInc => Operands::Iinc {
                index: reader
                    .read_u16()
                    .map_err(|_| GarnetError::truncated(pc, "wide iinc index"))?,
                delta: reader
                    .read_i16()
                    .map_err(|_| GarnetError::truncated(pc, "wide iinc delta"))?,
            },
            other => {
                return Err(GarnetError::truncated(
                    pc,
                    format!("opcode {} cannot be wide-prefixed", other.mnemonic()),
                ))
            }
        };

        let length = reader.position() as u32 - pc;
        Ok(Instruction { opcode: modified, pc, operands, length })
    }

    fn parse_table_switch(&self, reader: &mut ClassReader<'_>, pc: u32) -> GarnetResult<Operands> {
        Self::skip_switch_padding(reader, pc)?;

        let default = reader
            .read_i32()
            .map_err(|_| GarnetError::malformed_switch(pc, "missing default offset"))?;
        let low = reader
            .read_i32()
            .map_err(|_| GarnetError::malformed_switch(pc, "missing low bound"))?;
        let high = reader
            .read_i32()
            .map_err(|_| GarnetError::malformed_switch(pc, "missing high bound"))?;

        if high < low - 1 {
            return Err(GarnetError::malformed_switch(
                pc,
                format!("high {} below low {} - 1", high, low),
            ));
        }

        let count = (high as i64 - low as i64 + 1) as u64;
        if count * 4 > reader.remaining() as u64 {
            return Err(GarnetError::malformed_switch(
                pc,
                format!("{} case offsets exceed remaining code bytes", count),
            ));
        }

        let mut offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            offsets.push(reader.read_i32().map_err(|_| {
                GarnetError::malformed_switch(pc, "truncated jump table")
            })?);
        }

        Ok(Operands::TableSwitch { default, low, high, offsets })
    }

    fn parse_lookup_switch(&self, reader: &mut ClassReader<'_>, pc: u32) -> GarnetResult<Operands> {
        Self::skip_switch_padding(reader, pc)?;

        let default = reader
            .read_i32()
            .map_err(|_| GarnetError::malformed_switch(pc, "missing default offset"))?;
        let npairs = reader
            .read_i32()
            .map_err(|_| GarnetError::malformed_switch(pc, "missing pair count"))?;
        if npairs < 0 {
            return Err(GarnetError::malformed_switch(pc, format!("negative npairs {}", npairs)));
        }
        if npairs as u64 * 8 > reader.remaining() as u64 {
            return Err(GarnetError::malformed_switch(
                pc,
                format!("{} pairs exceed remaining code bytes", npairs),
            ));
        }

        // Pairs keep their source order; emission respects it
        let mut pairs = Vec::with_capacity(npairs as usize);
        for _ in 0..npairs {
            let match_value = reader
                .read_i32()
                .map_err(|_| GarnetError::malformed_switch(pc, "truncated match value"))?;
            let offset = reader
                .read_i32()
                .map_err(|_| GarnetError::malformed_switch(pc, "truncated jump offset"))?;
            pairs.push((match_value, offset));
        }

        Ok(Operands::LookupSwitch { default, pairs })
    }

    /// Both switch forms align their first word to a 4-byte boundary
    /// relative to the start of the code array
    fn skip_switch_padding(reader: &mut ClassReader<'_>, pc: u32) -> GarnetResult<()> {
        let padding = (4 - ((pc as usize + 1) % 4)) % 4;
        reader
            .skip(padding)
            .map_err(|_| GarnetError::malformed_switch(pc, "truncated alignment padding"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(code: &[u8]) -> Vec<Instruction> {
        BytecodeParser::new(code).parse().unwrap()
    }

    #[test]
    fn test_simple_sequence() {
        // iconst_1, iconst_2, iadd, ireturn
        let insts = parse(&[0x04, 0x05, 0x60, 0xac]);
        assert_eq!(insts.len(), 4);
        assert_eq!(insts[0].opcode, Opcode::IConst1);
        assert_eq!(insts[1].opcode, Opcode::IConst2);
        assert_eq!(insts[2].opcode, Opcode::IAdd);
        assert_eq!(insts[3].opcode, Opcode::IReturn);
        assert_eq!(insts.iter().map(|i| i.pc).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_lengths_cover_code_exactly() {
        // bipush 5, sipush 300, iload 2, goto +3
        let code = [0x10, 0x05, 0x11, 0x01, 0x2c, 0x15, 0x02, 0xa7, 0x00, 0x03];
        let insts = parse(&code);
        let total: u32 = insts.iter().map(|i| i.length).sum();
        assert_eq!(total as usize, code.len());
        // every pc is the start of exactly one instruction
        let mut expected_pc = 0;
        for inst in &insts {
            assert_eq!(inst.pc, expected_pc);
            expected_pc += inst.length;
        }
    }

    #[test]
    fn test_branch_offsets_are_signed() {
        // pc 0: nop; pc 1: goto -1
        let insts = parse(&[0x00, 0xa7, 0xff, 0xff]);
        assert_eq!(insts[1].operands, Operands::Branch(-1));
        assert_eq!(insts[1].branch_target(), Some(0));
    }

    #[test]
    fn test_table_switch_alignment_at_pc_1() {
        // a tableswitch at pc 1 needs 2 padding bytes so the default
        // word starts at pc 4.
        let mut code = vec![0x00]; // nop at pc 0
        code.push(0xaa); // tableswitch at pc 1
        code.extend_from_slice(&[0x00, 0x00]); // 2 bytes of padding
        code.extend_from_slice(&20i32.to_be_bytes()); // default
        code.extend_from_slice(&0i32.to_be_bytes()); // low
        code.extend_from_slice(&2i32.to_be_bytes()); // high
        code.extend_from_slice(&4i32.to_be_bytes());
        code.extend_from_slice(&8i32.to_be_bytes());
        code.extend_from_slice(&12i32.to_be_bytes());

        let insts = parse(&code);
        assert_eq!(insts.len(), 2);
        let switch = &insts[1];
        assert_eq!(switch.pc, 1);
        assert_eq!(switch.length as usize, code.len() - 1);
        match &switch.operands {
            Operands::TableSwitch { default, low, high, offsets } => {
                assert_eq!(*default, 20);
                assert_eq!(*low, 0);
                assert_eq!(*high, 2);
                assert_eq!(offsets, &vec![4, 8, 12]);
            }
            other => panic!("unexpected operands: {other:?}"),
        }
        // four branch targets, relative to the switch's own pc
        assert_eq!(switch.jump_targets().as_slice(), &[21, 5, 9, 13]);
    }

    #[test]
    fn test_table_switch_rejects_inverted_bounds() {
        let mut code = vec![0xaa, 0x00, 0x00, 0x00]; // switch at pc 0, 3 pad bytes
        code.extend_from_slice(&8i32.to_be_bytes()); // default
        code.extend_from_slice(&5i32.to_be_bytes()); // low
        code.extend_from_slice(&2i32.to_be_bytes()); // high < low - 1
        let err = BytecodeParser::new(&code).parse().unwrap_err();
        assert!(matches!(err, GarnetError::UnalignedSwitchPadding { .. }));
    }

    #[test]
    fn test_table_switch_rejects_oversized_count() {
        let mut code = vec![0xaa, 0x00, 0x00, 0x00];
        code.extend_from_slice(&8i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1_000_000i32.to_be_bytes()); // far too many cases
        let err = BytecodeParser::new(&code).parse().unwrap_err();
        assert!(matches!(err, GarnetError::UnalignedSwitchPadding { .. }));
    }

    #[test]
    fn test_lookup_switch_preserves_pair_order() {
        let mut code = vec![0xab, 0x00, 0x00, 0x00]; // switch at pc 0, 3 pad bytes
        code.extend_from_slice(&30i32.to_be_bytes()); // default
        code.extend_from_slice(&2i32.to_be_bytes()); // npairs
        code.extend_from_slice(&99i32.to_be_bytes());
        code.extend_from_slice(&10i32.to_be_bytes());
        code.extend_from_slice(&(-5i32).to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());

        let insts = parse(&code);
        match &insts[0].operands {
            Operands::LookupSwitch { default, pairs } => {
                assert_eq!(*default, 30);
                assert_eq!(pairs, &vec![(99, 10), (-5, 20)]);
            }
            other => panic!("unexpected operands: {other:?}"),
        }
    }

    #[test]
    fn test_wide_iinc() {
        // wide iinc with a 2-byte index and a 2-byte signed delta
        let code = [0xc4, 0x84, 0x01, 0x00, 0xff, 0x38]; // iinc local 256 by -200
        let insts = parse(&code);
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].opcode, Opcode::IInc);
        assert_eq!(insts[0].operands, Operands::Iinc { index: 256, delta: -200 });
        assert_eq!(insts[0].length, 6);
    }

    #[test]
    fn test_wide_load() {
        let code = [0xc4, 0x15, 0x01, 0x02]; // wide iload 258
        let insts = parse(&code);
        assert_eq!(insts[0].opcode, Opcode::ILoad);
        assert_eq!(insts[0].operands, Operands::Local(258));
        assert_eq!(insts[0].length, 4);
    }

    #[test]
    fn test_unknown_opcode() {
        let err = BytecodeParser::new(&[0x00, 0xcb]).parse().unwrap_err();
        assert_eq!(err, GarnetError::UnknownOpcode { opcode: 0xcb, pc: 1 });
    }

    #[test]
    fn test_truncated_operand() {
        let err = BytecodeParser::new(&[0x10]).parse().unwrap_err(); // bipush, no byte
        assert!(matches!(err, GarnetError::TruncatedInstruction { pc: 0, .. }));
    }

    #[test]
    fn test_invokeinterface_consumes_count_and_zero() {
        let code = [0xb9, 0x00, 0x07, 0x02, 0x00];
        let insts = parse(&code);
        assert_eq!(insts[0].operands, Operands::Invoke { pool_index: 7, count: 2 });
        assert_eq!(insts[0].length, 5);
    }

    #[test]
    fn test_goto_w_takes_four_byte_offset() {
        let mut code = vec![0xc8];
        code.extend_from_slice(&(-70000i32).to_be_bytes());
        let insts = parse(&code);
        assert_eq!(insts[0].operands, Operands::Branch(-70000));
        assert_eq!(insts[0].length, 5);
    }
}
