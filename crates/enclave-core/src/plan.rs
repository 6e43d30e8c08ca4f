use std::fmt;

use crate::instruction::Instruction;

/// Where in a script an instruction was emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub locator: String,
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub fn new(locator: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            locator: locator.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.locator, self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedInstruction {
    pub instruction: Instruction,
    pub position: Option<SourcePosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanMetadata {
    /// Locator of the script (or bulk document) the plan came from
    pub source: String,
}

/// Ordered instructions produced by one interpretation
///
/// Order is emission order. Instruction numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    metadata: PlanMetadata,
    instructions: Vec<PlannedInstruction>,
}

impl Plan {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            metadata: PlanMetadata {
                source: source.into(),
            },
            instructions: Vec::new(),
        }
    }

    /// Append an instruction and return its number
    pub fn push(&mut self, instruction: Instruction, position: Option<SourcePosition>) -> u32 {
        self.instructions.push(PlannedInstruction {
            instruction,
            position,
        });
        self.len() as u32
    }

    pub fn metadata(&self) -> &PlanMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction by 1-based number
    pub fn get(&self, number: u32) -> Option<&PlannedInstruction> {
        let index = (number as usize).checked_sub(1)?;
        self.instructions.get(index)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().map(|p| &p.instruction)
    }

    /// Instructions paired with their 1-based numbers
    pub fn numbered(&self) -> impl Iterator<Item = (u32, &PlannedInstruction)> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(i, p)| (i as u32 + 1, p))
    }
}
