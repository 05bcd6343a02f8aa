use crate::{
    assembly::{
        decoder,
        opcodes::{op, operand_kind, widen_branch, OperandKind},
        Instruction, Operand,
    },
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody},
    Result,
};

/// An exception handling clause with its boundaries expressed as instruction indices.
///
/// Ends are exclusive and may equal the stream length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Clause kind
    pub flags: ExceptionHandlerFlags,
    /// First protected instruction
    pub try_start: usize,
    /// One past the last protected instruction
    pub try_end: usize,
    /// First handler instruction
    pub handler_start: usize,
    /// One past the last handler instruction
    pub handler_end: usize,
    /// Catch type token, 0 for other clause kinds
    pub class_token: u32,
    /// First filter instruction for filter clauses
    pub filter_start: Option<usize>,
}

/// The instructions of one method body, addressed by index.
///
/// Branch targets and exception clause boundaries refer to instruction indices, so inserting
/// instructions only needs to renumber indices at or after the insertion point. Byte offsets
/// are computed again by [`InstructionStream::encode`], which also widens short branches whose
/// displacement no longer fits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    clauses: Vec<Clause>,
}

impl InstructionStream {
    /// Create a stream from already resolved instructions and clauses.
    #[must_use]
    pub fn new(instructions: Vec<Instruction>, clauses: Vec<Clause>) -> InstructionStream {
        InstructionStream {
            instructions,
            clauses,
        }
    }

    /// Decode the code and exception clauses of `body`.
    ///
    /// # Errors
    /// See [`decoder::decode`].
    pub fn from_body(body: &MethodBody) -> Result<InstructionStream> {
        decoder::decode(&body.code, &body.exception_handlers)
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the stream has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// All instructions in order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// All exception clauses.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Index of the first instruction matching `predicate`.
    pub fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: FnMut(&Instruction) -> bool,
    {
        self.instructions.iter().position(predicate)
    }

    /// Indices of every instruction matching `predicate`, in ascending order.
    pub fn positions<P>(&self, mut predicate: P) -> Vec<usize>
    where
        P: FnMut(&Instruction) -> bool,
    {
        self.instructions
            .iter()
            .enumerate()
            .filter(|&(_, instruction)| predicate(instruction))
            .map(|(index, _)| index)
            .collect()
    }

    /// Insert `sequence` directly after instruction `index`.
    ///
    /// References to the instruction following `index` keep pointing at that instruction, so
    /// a branch that skipped over `index` also skips the inserted code.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is out of range or `sequence` contains
    /// branches.
    pub fn insert_after(&mut self, index: usize, sequence: Vec<Instruction>) -> Result<()> {
        if index >= self.instructions.len() {
            return Err(malformed_error!(
                "Insert position {} beyond {} instructions",
                index,
                self.instructions.len()
            ));
        }
        self.insert(index + 1, sequence, true)
    }

    /// Insert `sequence` directly before instruction `index`.
    ///
    /// References to `index` are retargeted to the head of the inserted sequence, so every
    /// path that reached the instruction now runs the sequence first.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is out of range or `sequence` contains
    /// branches.
    pub fn insert_before(&mut self, index: usize, sequence: Vec<Instruction>) -> Result<()> {
        if index > self.instructions.len() {
            return Err(malformed_error!(
                "Insert position {} beyond {} instructions",
                index,
                self.instructions.len()
            ));
        }
        self.insert(index, sequence, false)
    }

    fn insert(&mut self, at: usize, sequence: Vec<Instruction>, shift_equal: bool) -> Result<()> {
        for instruction in &sequence {
            if matches!(instruction.operand, Operand::Target(_) | Operand::Switch(_)) {
                return Err(malformed_error!(
                    "Inserted sequences may not branch - {:#06x}",
                    instruction.opcode
                ));
            }
            instruction.validate()?;
        }

        let count = sequence.len();
        if count == 0 {
            return Ok(());
        }

        let shift = |position: &mut usize| {
            if *position > at || (shift_equal && *position == at) {
                *position += count;
            }
        };

        for instruction in &mut self.instructions {
            match &mut instruction.operand {
                Operand::Target(target) => shift(target),
                Operand::Switch(targets) => targets.iter_mut().for_each(shift),
                _ => {}
            }
        }

        for clause in &mut self.clauses {
            shift(&mut clause.try_start);
            shift(&mut clause.try_end);
            shift(&mut clause.handler_start);
            shift(&mut clause.handler_end);
            if let Some(filter) = clause.filter_start.as_mut() {
                shift(filter);
            }
        }

        self.instructions.splice(at..at, sequence);
        Ok(())
    }

    /// Encode the stream to IL bytes and byte offset based exception clauses.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for targets outside the stream or operands that do
    /// not match their opcode.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self) -> Result<(Vec<u8>, Vec<ExceptionHandler>)> {
        let mut instructions = self.instructions.clone();
        for instruction in &instructions {
            instruction.validate()?;
            let targets: &[usize] = match &instruction.operand {
                Operand::Target(target) => std::slice::from_ref(target),
                Operand::Switch(targets) => targets,
                _ => &[],
            };
            if let Some(target) = targets.iter().find(|t| **t > instructions.len()) {
                return Err(malformed_error!("Branch target {} outside the method", target));
            }
        }

        // Widening only grows the code, so this reaches a fixed point
        let offsets = loop {
            let offsets = offsets_of(&instructions);
            let mut widened = false;
            for index in 0..instructions.len() {
                let instruction = &mut instructions[index];
                let Operand::Target(target) = instruction.operand else {
                    continue;
                };
                if !matches!(operand_kind(instruction.opcode)?, OperandKind::ShortBranch) {
                    continue;
                }

                let displacement = displacement(&offsets, index, target);
                if i8::try_from(displacement).is_err() {
                    if let Some(long) = widen_branch(instruction.opcode) {
                        log::debug!(
                            "Widening branch at {} ({:#04x} -> {:#04x})",
                            index,
                            instruction.opcode,
                            long
                        );
                        instruction.opcode = long;
                        widened = true;
                    }
                }
            }

            if !widened {
                break offsets;
            }
        };

        let mut code = Vec::with_capacity(offsets[instructions.len()]);
        for (index, instruction) in instructions.iter().enumerate() {
            if instruction.opcode >> 8 == op::PREFIX {
                code.push(0xFE);
            }
            code.push(instruction.opcode as u8);

            match &instruction.operand {
                Operand::None => {}
                Operand::Int8(value) => code.extend_from_slice(&value.to_le_bytes()),
                Operand::UInt8(value) => code.push(*value),
                Operand::UInt16(value) => code.extend_from_slice(&value.to_le_bytes()),
                Operand::Int32(value) => code.extend_from_slice(&value.to_le_bytes()),
                Operand::Int64(value) => code.extend_from_slice(&value.to_le_bytes()),
                Operand::Float32(bits) => code.extend_from_slice(&bits.to_le_bytes()),
                Operand::Float64(bits) => code.extend_from_slice(&bits.to_le_bytes()),
                Operand::Token(token) => code.extend_from_slice(&token.value().to_le_bytes()),
                Operand::Target(target) => {
                    let displacement = displacement(&offsets, index, *target);
                    if matches!(operand_kind(instruction.opcode)?, OperandKind::ShortBranch) {
                        let short = i8::try_from(displacement).map_err(|_| {
                            malformed_error!("Branch at {} out of short range", index)
                        })?;
                        code.extend_from_slice(&short.to_le_bytes());
                    } else {
                        code.extend_from_slice(&long_displacement(displacement)?.to_le_bytes());
                    }
                }
                Operand::Switch(targets) => {
                    let count = u32::try_from(targets.len())
                        .map_err(|_| malformed_error!("Switch too large - {}", targets.len()))?;
                    code.extend_from_slice(&count.to_le_bytes());
                    for target in targets {
                        let displacement = displacement(&offsets, index, *target);
                        code.extend_from_slice(&long_displacement(displacement)?.to_le_bytes());
                    }
                }
            }
        }

        let offset = |index: usize| -> Result<u32> {
            offsets
                .get(index)
                .and_then(|offset| u32::try_from(*offset).ok())
                .ok_or_else(|| malformed_error!("Clause boundary {} outside the method", index))
        };

        let mut handlers = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let try_offset = offset(clause.try_start)?;
            let handler_offset = offset(clause.handler_start)?;
            handlers.push(ExceptionHandler {
                flags: clause.flags,
                try_offset,
                try_length: offset(clause.try_end)?.saturating_sub(try_offset),
                handler_offset,
                handler_length: offset(clause.handler_end)?.saturating_sub(handler_offset),
                class_token_or_filter: match clause.filter_start {
                    Some(filter) => offset(filter)?,
                    None => clause.class_token,
                },
            });
        }

        Ok((code, handlers))
    }

    /// Encode the stream into a copy of `template` with a new `max_stack`.
    ///
    /// # Errors
    /// See [`InstructionStream::encode`].
    pub fn to_body(&self, template: &MethodBody, max_stack: u16) -> Result<MethodBody> {
        let (code, exception_handlers) = self.encode()?;
        Ok(MethodBody {
            max_stack,
            local_var_sig_token: template.local_var_sig_token,
            init_locals: template.init_locals,
            code,
            exception_handlers,
            is_fat: true,
        })
    }
}

/// Byte offset of every instruction plus the end of the code.
fn offsets_of(instructions: &[Instruction]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut offset = 0;
    for instruction in instructions {
        offsets.push(offset);
        offset += instruction.size();
    }
    offsets.push(offset);
    offsets
}

#[allow(clippy::cast_possible_wrap)]
fn displacement(offsets: &[usize], index: usize, target: usize) -> i64 {
    offsets[target] as i64 - offsets[index + 1] as i64
}

fn long_displacement(displacement: i64) -> Result<i32> {
    i32::try_from(displacement)
        .map_err(|_| malformed_error!("Branch displacement {} too large", displacement))
}
