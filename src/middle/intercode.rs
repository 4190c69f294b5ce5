//! IR 指令序列容器
//!
//! 只支持尾部追加与整段拼接，拼接顺序即求值顺序。

use std::fmt;

use crate::middle::instruction::Instruction;

/// 线性 IR 指令序列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterCode {
    insts: Vec<Instruction>,
}

impl InterCode {
    pub fn new() -> Self {
        InterCode { insts: Vec::new() }
    }

    /// 追加一条指令
    pub fn add_inst(
        &mut self,
        inst: Instruction,
    ) {
        self.insts.push(inst);
    }

    /// 拼接另一段序列，取走其全部指令
    pub fn add_code(
        &mut self,
        other: &mut InterCode,
    ) {
        self.insts.append(&mut other.insts);
    }

    pub fn insts(&self) -> &[Instruction] {
        &self.insts
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.insts.iter()
    }
}

impl fmt::Display for InterCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for inst in &self.insts {
            match inst {
                Instruction::Label(_) => writeln!(f, "{}", inst)?,
                _ => writeln!(f, "    {}", inst)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::instruction::{LabelId, MoveKind};
    use crate::middle::value::Value;

    #[test]
    fn test_add_inst_order() {
        let mut code = InterCode::new();
        code.add_inst(Instruction::Entry);
        code.add_inst(Instruction::Label(LabelId(0)));
        assert_eq!(code.len(), 2);
        assert_eq!(code.insts()[0], Instruction::Entry);
    }

    #[test]
    fn test_add_code_drains_and_preserves_order() {
        let mut first = InterCode::new();
        first.add_inst(Instruction::Move {
            dst: Value::Local(0),
            src: Value::ConstInt(1),
            kind: MoveKind::Plain,
        });
        let mut second = InterCode::new();
        second.add_inst(Instruction::Move {
            dst: Value::Local(1),
            src: Value::ConstInt(2),
            kind: MoveKind::Plain,
        });
        first.add_code(&mut second);
        assert!(second.is_empty());
        assert_eq!(first.len(), 2);
        assert_eq!(
            first.insts()[1],
            Instruction::Move {
                dst: Value::Local(1),
                src: Value::ConstInt(2),
                kind: MoveKind::Plain,
            }
        );
    }
}
