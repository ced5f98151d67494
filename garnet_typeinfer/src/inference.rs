//! Dataflow type inference over the CFG
//!
//! Runs the stack machine over types only: each block's transfer function
//! mirrors the expression rebuilder's stack effects, block-entry frames are
//! merged with the lattice's least upper bound, and the whole method
//! iterates to a fixed point.

use crate::types::JvmType;
use garnet_bytecode::{apply_shuffle, is_shuffle, Instruction, Opcode, Operands};
use garnet_classfile::{ConstantEntry, ConstantPool, FieldType, MethodDescriptor};
use garnet_common::{GarnetError, GarnetResult};
use garnet_flow::{BlockId, Cfg};
use hashbrown::HashMap;
use std::collections::VecDeque;

/// Types of the locals and the operand stack at one program point
#[derive(Debug, Clone, PartialEq)]
pub struct TypeFrame {
    pub locals: Vec<JvmType>,
    pub stack: Vec<JvmType>,
}

impl TypeFrame {
    pub fn new(max_locals: usize) -> Self {
        Self {
            locals: vec![JvmType::Unknown; max_locals],
            stack: Vec::new(),
        }
    }

    /// Merge another frame into this one; returns whether anything changed.
    /// Differing stack heights are a verification-order violation.
    fn merge(&mut self, other: &TypeFrame, block: BlockId) -> GarnetResult<bool> {
        if self.stack.len() != other.stack.len() {
            return Err(GarnetError::StackHeightMismatch {
                block,
                message: format!(
                    "incoming heights {} and {}",
                    self.stack.len(),
                    other.stack.len()
                ),
            });
        }
        let mut changed = false;
        for (mine, theirs) in self.locals.iter_mut().zip(&other.locals) {
            let merged = mine.merge(theirs);
            if *mine != merged {
                *mine = merged;
                changed = true;
            }
        }
        for (mine, theirs) in self.stack.iter_mut().zip(&other.stack) {
            let merged = mine.merge(theirs);
            if *mine != merged {
                *mine = merged;
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// The result of one method's inference run
#[derive(Debug, Clone)]
pub struct TypeInference {
    /// Frame at the entry of each reachable block
    pub entry_frames: HashMap<BlockId, TypeFrame>,
    /// Per-slot local types merged over the whole method
    pub local_types: Vec<JvmType>,
}

impl TypeInference {
    pub fn local_type(&self, slot: u16) -> JvmType {
        self.local_types
            .get(slot as usize)
            .cloned()
            .unwrap_or(JvmType::Unknown)
    }
}

/// Propagates the type lattice across a method to a fixed point
pub struct TypeInferenceEngine<'a> {
    pool: &'a ConstantPool,
}

impl<'a> TypeInferenceEngine<'a> {
    pub fn new(pool: &'a ConstantPool) -> Self {
        Self { pool }
    }

    /// Run inference for one method
    pub fn infer(
        &self,
        cfg: &Cfg,
        descriptor: &MethodDescriptor,
        this_class: Option<&str>,
        max_locals: usize,
    ) -> GarnetResult<TypeInference> {
        let mut entry = TypeFrame::new(max_locals);
        let mut slot = 0;
        if let Some(class_name) = this_class {
            if slot < max_locals {
                entry.locals[slot] = JvmType::Reference(class_name.to_string());
            }
            slot += 1;
        }
        for param in &descriptor.params {
            let ty = JvmType::from_field_type(param);
            if slot < max_locals {
                entry.locals[slot] = ty.clone();
            }
            slot += param.width() as usize;
        }

        let mut entry_frames: HashMap<BlockId, TypeFrame> = HashMap::new();
        entry_frames.insert(cfg.entry, entry);

        let mut worklist: VecDeque<BlockId> = VecDeque::new();
        worklist.push_back(cfg.entry);

        while let Some(block_id) = worklist.pop_front() {
            let mut frame = entry_frames[&block_id].clone();
            let block = cfg.block(block_id);
            for inst in &block.instructions {
                self.transfer(inst, &mut frame)?;
            }

            // Exceptional edges: the handler sees the locals as-is and a
            // stack holding only the thrown exception
            for &handler_id in &block.handlers {
                let catch_type = cfg
                    .handler_ranges
                    .iter()
                    .find(|h| cfg.block_at(h.handler_pc) == Some(handler_id))
                    .and_then(|h| h.catch_type.clone())
                    .unwrap_or_else(|| "java/lang/Throwable".to_string());
                let handler_frame = TypeFrame {
                    locals: frame.locals.clone(),
                    stack: vec![JvmType::Reference(catch_type)],
                };
                if Self::propagate(&mut entry_frames, handler_id, handler_frame)? {
                    worklist.push_back(handler_id);
                }
            }

            for &succ in &block.successors {
                if Self::propagate(&mut entry_frames, succ, frame.clone())? {
                    worklist.push_back(succ);
                }
            }
        }

        // Merge every slot's type across all frames for declaration typing
        let mut local_types = vec![JvmType::Unknown; max_locals];
        for frame in entry_frames.values() {
            for (slot, ty) in frame.locals.iter().enumerate() {
                local_types[slot] = local_types[slot].merge(ty);
            }
        }

        Ok(TypeInference { entry_frames, local_types })
    }

    fn propagate(
        entry_frames: &mut HashMap<BlockId, TypeFrame>,
        target: BlockId,
        frame: TypeFrame,
    ) -> GarnetResult<bool> {
        match entry_frames.get_mut(&target) {
            Some(existing) => existing.merge(&frame, target),
            None => {
                entry_frames.insert(target, frame);
                Ok(true)
            }
        }
    }

    fn pop(frame: &mut TypeFrame, pc: u32) -> GarnetResult<JvmType> {
        frame.stack.pop().ok_or(GarnetError::StackUnderflow { pc })
    }

    /// One instruction's effect on the type frame
    fn transfer(&self, inst: &Instruction, frame: &mut TypeFrame) -> GarnetResult<()> {
        use Opcode::*;
        let pc = inst.pc;

        if is_shuffle(inst.opcode) {
            return apply_shuffle(inst.opcode, &mut frame.stack, |t| t.category())
                .ok_or(GarnetError::StackUnderflow { pc });
        }

        match inst.opcode {
            Nop => {}
            AConstNull => frame.stack.push(JvmType::object()),
            IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 | Bipush
            | Sipush => frame.stack.push(JvmType::Int),
            LConst0 | LConst1 => frame.stack.push(JvmType::Long),
            FConst0 | FConst1 | FConst2 => frame.stack.push(JvmType::Float),
            DConst0 | DConst1 => frame.stack.push(JvmType::Double),

            Ldc | LdcW | Ldc2W => {
                let index = match inst.operands {
                    Operands::Pool(index) => index,
                    _ => 0,
                };
                let ty = match self.pool.get(index) {
                    Ok(ConstantEntry::Integer(_)) => JvmType::Int,
                    Ok(ConstantEntry::Float(_)) => JvmType::Float,
                    Ok(ConstantEntry::Long(_)) => JvmType::Long,
                    Ok(ConstantEntry::Double(_)) => JvmType::Double,
                    Ok(ConstantEntry::String { .. }) => JvmType::string(),
                    Ok(ConstantEntry::Class { .. }) => JvmType::Reference("java/lang/Class".into()),
                    Ok(ConstantEntry::MethodType { .. }) => {
                        JvmType::Reference("java/lang/invoke/MethodType".into())
                    }
                    Ok(ConstantEntry::MethodHandle { .. }) => {
                        JvmType::Reference("java/lang/invoke/MethodHandle".into())
                    }
                    _ => JvmType::Unknown,
                };
                frame.stack.push(ty);
            }

            ILoad | ILoad0 | ILoad1 | ILoad2 | ILoad3 => frame.stack.push(JvmType::Int),
            LLoad | LLoad0 | LLoad1 | LLoad2 | LLoad3 => frame.stack.push(JvmType::Long),
            FLoad | FLoad0 | FLoad1 | FLoad2 | FLoad3 => frame.stack.push(JvmType::Float),
            DLoad | DLoad0 | DLoad1 | DLoad2 | DLoad3 => frame.stack.push(JvmType::Double),
            ALoad | ALoad0 | ALoad1 | ALoad2 | ALoad3 => {
                let slot = local_slot(inst);
                let ty = frame
                    .locals
                    .get(slot)
                    .cloned()
                    .filter(|t| t.is_reference() || *t == JvmType::ReturnAddress)
                    .unwrap_or_else(JvmType::object);
                frame.stack.push(ty);
            }

            IStore | IStore0 | IStore1 | IStore2 | IStore3 | LStore | LStore0 | LStore1
            | LStore2 | LStore3 | FStore | FStore0 | FStore1 | FStore2 | FStore3 | DStore
            | DStore0 | DStore1 | DStore2 | DStore3 | AStore | AStore0 | AStore1 | AStore2
            | AStore3 => {
                let ty = Self::pop(frame, pc)?;
                let slot = local_slot(inst);
                if slot < frame.locals.len() {
                    // Stores overwrite: the slot may be reused with a new type
                    let wide = ty.is_wide();
                    frame.locals[slot] = ty;
                    if wide && slot + 1 < frame.locals.len() {
                        frame.locals[slot + 1] = JvmType::Unknown;
                    }
                }
            }

            IALoad | BALoad | CALoad | SALoad => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Int);
            }
            LALoad => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Long);
            }
            FALoad => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Float);
            }
            DALoad => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Double);
            }
            AALoad => {
                Self::pop(frame, pc)?;
                let array = Self::pop(frame, pc)?;
                let element = match array {
                    JvmType::Array(element) => *element,
                    _ => JvmType::object(),
                };
                frame.stack.push(element);
            }

            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
            }

            IAdd | ISub | IMul | IDiv | IRem | IShl | IShr | IUshr | IAnd | IOr | IXor => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Int);
            }
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Long);
            }
            LShl | LShr | LUshr => {
                // Shift count is an int, the value a long
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Long);
            }
            FAdd | FSub | FMul | FDiv | FRem => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Float);
            }
            DAdd | DSub | DMul | DDiv | DRem => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Double);
            }
            INeg => unary(frame, pc, JvmType::Int)?,
            LNeg => unary(frame, pc, JvmType::Long)?,
            FNeg => unary(frame, pc, JvmType::Float)?,
            DNeg => unary(frame, pc, JvmType::Double)?,

            IInc => {}

            I2L | F2L | D2L => unary(frame, pc, JvmType::Long)?,
            I2F | L2F | D2F => unary(frame, pc, JvmType::Float)?,
            I2D | L2D | F2D => unary(frame, pc, JvmType::Double)?,
            L2I | F2I | D2I => unary(frame, pc, JvmType::Int)?,
            I2B => unary(frame, pc, JvmType::Byte)?,
            I2C => unary(frame, pc, JvmType::Char)?,
            I2S => unary(frame, pc, JvmType::Short)?,

            LCmp | FCmpL | FCmpG | DCmpL | DCmpG => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Int);
            }

            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfNull | IfNonNull => {
                Self::pop(frame, pc)?;
            }
            IfICmpEq | IfICmpNe | IfICmpLt | IfICmpGe | IfICmpGt | IfICmpLe | IfACmpEq
            | IfACmpNe => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
            }

            Goto | GotoW => {}
            Jsr | JsrW => frame.stack.push(JvmType::ReturnAddress),
            Ret => {}

            TableSwitch | LookupSwitch => {
                Self::pop(frame, pc)?;
            }

            IReturn | LReturn | FReturn | DReturn | AReturn => {
                Self::pop(frame, pc)?;
                frame.stack.clear();
            }
            Return => frame.stack.clear(),

            GetStatic => {
                let ty = self.field_type(inst)?;
                frame.stack.push(ty);
            }
            PutStatic => {
                Self::pop(frame, pc)?;
            }
            GetField => {
                Self::pop(frame, pc)?;
                let ty = self.field_type(inst)?;
                frame.stack.push(ty);
            }
            PutField => {
                Self::pop(frame, pc)?;
                Self::pop(frame, pc)?;
            }

            InvokeVirtual | InvokeSpecial | InvokeInterface => {
                let descriptor = self.method_descriptor(inst)?;
                for _ in 0..descriptor.arity() {
                    Self::pop(frame, pc)?;
                }
                Self::pop(frame, pc)?; // receiver
                if let Some(ret) = &descriptor.ret {
                    frame.stack.push(JvmType::from_field_type(ret));
                }
            }
            InvokeStatic | InvokeDynamic => {
                let descriptor = self.method_descriptor(inst)?;
                for _ in 0..descriptor.arity() {
                    Self::pop(frame, pc)?;
                }
                if let Some(ret) = &descriptor.ret {
                    frame.stack.push(JvmType::from_field_type(ret));
                }
            }

            New => {
                let class_name = self.class_operand(inst)?;
                frame.stack.push(JvmType::Reference(class_name));
            }
            NewArray => {
                Self::pop(frame, pc)?;
                let element = primitive_array_element(inst);
                frame.stack.push(JvmType::Array(Box::new(element)));
            }
            ANewArray => {
                Self::pop(frame, pc)?;
                let class_name = self.class_operand(inst)?;
                frame
                    .stack
                    .push(JvmType::Array(Box::new(JvmType::Reference(class_name))));
            }
            MultiANewArray => {
                let (index, dimensions) = match inst.operands {
                    Operands::MultiANewArray { pool_index, dimensions } => (pool_index, dimensions),
                    _ => (0, 1),
                };
                for _ in 0..dimensions {
                    Self::pop(frame, pc)?;
                }
                let name = self.pool.class_name(index).unwrap_or("java/lang/Object");
                let ty = FieldType::parse(name)
                    .map(|t| JvmType::from_field_type(&t))
                    .unwrap_or_else(|_| JvmType::object());
                frame.stack.push(ty);
            }
            ArrayLength => {
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Int);
            }

            AThrow => {
                Self::pop(frame, pc)?;
                frame.stack.clear();
            }

            CheckCast => {
                Self::pop(frame, pc)?;
                let class_name = self.class_operand(inst)?;
                let ty = if class_name.starts_with('[') {
                    FieldType::parse(&class_name)
                        .map(|t| JvmType::from_field_type(&t))
                        .unwrap_or_else(|_| JvmType::object())
                } else {
                    JvmType::Reference(class_name)
                };
                frame.stack.push(ty);
            }
            InstanceOf => {
                Self::pop(frame, pc)?;
                frame.stack.push(JvmType::Boolean);
            }

            MonitorEnter | MonitorExit => {
                Self::pop(frame, pc)?;
            }

            // Shuffles are handled above; `wide` never reaches here because
            // the parser folds it into the modified instruction
            other => {
                log::debug!("no type transfer for {}", other.mnemonic());
            }
        }
        Ok(())
    }

    fn field_type(&self, inst: &Instruction) -> GarnetResult<JvmType> {
        let index = pool_index(inst);
        let member = self.pool.field_ref(index)?;
        let ty = FieldType::parse(&member.descriptor)?;
        Ok(JvmType::from_field_type(&ty))
    }

    fn method_descriptor(&self, inst: &Instruction) -> GarnetResult<MethodDescriptor> {
        let index = pool_index(inst);
        let descriptor = if inst.opcode == Opcode::InvokeDynamic {
            let (_, _, descriptor) = self.pool.invoke_dynamic(index)?;
            descriptor.to_string()
        } else {
            self.pool.method_ref(index)?.descriptor
        };
        MethodDescriptor::parse(&descriptor)
    }

    fn class_operand(&self, inst: &Instruction) -> GarnetResult<String> {
        let index = pool_index(inst);
        Ok(self.pool.class_name(index)?.to_string())
    }
}

fn pool_index(inst: &Instruction) -> u16 {
    match inst.operands {
        Operands::Pool(index) => index,
        Operands::Invoke { pool_index, .. } => pool_index,
        Operands::MultiANewArray { pool_index, .. } => pool_index,
        _ => 0,
    }
}

fn local_slot(inst: &Instruction) -> usize {
    match inst.operands {
        Operands::Local(slot) => slot as usize,
        _ => compact_slot(inst.opcode),
    }
}

/// Slot encoded in the compact `*load_n` / `*store_n` forms
fn compact_slot(opcode: Opcode) -> usize {
    use Opcode::*;
    match opcode {
        ILoad0 | LLoad0 | FLoad0 | DLoad0 | ALoad0 | IStore0 | LStore0 | FStore0 | DStore0
        | AStore0 => 0,
        ILoad1 | LLoad1 | FLoad1 | DLoad1 | ALoad1 | IStore1 | LStore1 | FStore1 | DStore1
        | AStore1 => 1,
        ILoad2 | LLoad2 | FLoad2 | DLoad2 | ALoad2 | IStore2 | LStore2 | FStore2 | DStore2
        | AStore2 => 2,
        _ => 3,
    }
}

fn unary(frame: &mut TypeFrame, pc: u32, result: JvmType) -> GarnetResult<()> {
    frame
        .stack
        .pop()
        .ok_or(GarnetError::StackUnderflow { pc })?;
    frame.stack.push(result);
    Ok(())
}

fn primitive_array_element(inst: &Instruction) -> JvmType {
    let code = match inst.operands {
        Operands::NewArrayType(code) => code,
        _ => 0,
    };
    match code {
        4 => JvmType::Boolean,
        5 => JvmType::Char,
        6 => JvmType::Float,
        7 => JvmType::Double,
        8 => JvmType::Byte,
        9 => JvmType::Short,
        11 => JvmType::Long,
        _ => JvmType::Int,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_bytecode::BytecodeParser;
    use garnet_classfile::ClassReader;
    use garnet_flow::CfgBuilder;

    fn empty_pool() -> ConstantPool {
        let bytes = [0u8, 1u8];
        let mut reader = ClassReader::new(&bytes);
        ConstantPool::parse(&mut reader).unwrap()
    }

    fn infer(code: &[u8], descriptor: &str, max_locals: usize) -> TypeInference {
        let instructions = BytecodeParser::new(code).parse().unwrap();
        let cfg = CfgBuilder::build(&instructions, &[]).unwrap();
        let pool = empty_pool();
        let engine = TypeInferenceEngine::new(&pool);
        let descriptor = MethodDescriptor::parse(descriptor).unwrap();
        engine.infer(&cfg, &descriptor, None, max_locals).unwrap()
    }

    #[test]
    fn test_parameter_types_seed_locals() {
        // iload_0, iload_1, iadd, ireturn with (II)I
        let result = infer(&[0x1a, 0x1b, 0x60, 0xac], "(II)I", 2);
        assert_eq!(result.local_type(0), JvmType::Int);
        assert_eq!(result.local_type(1), JvmType::Int);
    }

    #[test]
    fn test_wide_param_occupies_two_slots() {
        // lload_0, l2i, ireturn with (J)I: slot 0 long, slot 1 reserved
        let result = infer(&[0x1e, 0x88, 0xac], "(J)I", 2);
        assert_eq!(result.local_type(0), JvmType::Long);
        assert_eq!(result.local_type(1), JvmType::Unknown);
    }

    #[test]
    fn test_store_updates_local_type() {
        // iconst_1, istore_0, fconst_0, fstore_1, return with ()V
        let result = infer(&[0x04, 0x3b, 0x0b, 0x44, 0xb1], "()V", 2);
        assert_eq!(result.local_type(0), JvmType::Int);
        assert_eq!(result.local_type(1), JvmType::Float);
    }

    #[test]
    fn test_stack_heights_agree_at_merge() {
        // both arms of a diamond meet with equal (empty) stacks
        let code = [0x1a, 0x99, 0x00, 0x05, 0x05, 0xac, 0x04, 0xac];
        let result = infer(&code, "(I)I", 1);
        for frame in result.entry_frames.values() {
            assert!(frame.stack.is_empty() || frame.stack.len() == 1);
        }
    }

    #[test]
    fn test_merge_detects_height_mismatch() {
        let mut a = TypeFrame { locals: vec![], stack: vec![JvmType::Int] };
        let b = TypeFrame { locals: vec![], stack: vec![] };
        assert!(a.merge(&b, 0).is_err());
    }

    #[test]
    fn test_loop_reaches_fixed_point() {
        // the loop shape must terminate and type local 0 as int
        let code = [0x1a, 0x99, 0x00, 0x09, 0x84, 0x00, 0xff, 0xa7, 0xff, 0xfa, 0xb1];
        let result = infer(&code, "(I)V", 1);
        assert_eq!(result.local_type(0), JvmType::Int);
    }

    #[test]
    fn test_conversions() {
        // iload_0, i2d, dreturn with (I)D
        let result = infer(&[0x1a, 0x87, 0xaf], "(I)D", 1);
        // the entry frame of the single block holds the param type
        let frame = result.entry_frames.values().next().unwrap();
        assert_eq!(frame.locals[0], JvmType::Int);
    }
}
