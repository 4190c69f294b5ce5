//! ARM32 指令发射缓冲
//!
//! 选择器通过这里的辅助方法追加目标指令。条件码并入助记符
//! （movlt、bne），最终由 Display 渲染为汇编文本。

use std::fmt;

use thiserror::Error;

use super::{is_imm8m, is_ldst_offset, RegId, FP};

/// 指令操作数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(RegId),
    /// 立即数 #v
    Imm(i32),
    /// 伪指令字面量 =v，由汇编器放入常量池
    PoolImm(i32),
    /// 符号地址 =name
    PoolSym(String),
    /// 跳转目标标签
    Label(String),
    /// 基址加偏移寻址 [base, #offset]
    Mem { base: RegId, offset: i32 },
    /// 寄存器偏移寻址 [base, index]
    MemReg { base: RegId, index: RegId },
    /// push/pop 的寄存器列表 {r0, r1}
    RegList(Vec<RegId>),
}

impl fmt::Display for Operand {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Imm(v) => write!(f, "#{}", v),
            Operand::PoolImm(v) => write!(f, "={}", v),
            Operand::PoolSym(s) => write!(f, "={}", s),
            Operand::Label(s) => write!(f, "{}", s),
            Operand::Mem { base, offset } => {
                if *offset == 0 {
                    write!(f, "[{}]", base)
                } else {
                    write!(f, "[{}, #{}]", base, offset)
                }
            }
            Operand::MemReg { base, index } => write!(f, "[{}, {}]", base, index),
            Operand::RegList(regs) => {
                write!(f, "{{")?;
                for (i, r) in regs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", r)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// 一条目标指令或标签
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmInst {
    Inst {
        op: String,
        operands: Vec<Operand>,
    },
    Label(String),
}

impl ArmInst {
    /// 助记符，标签返回 None
    pub fn op(&self) -> Option<&str> {
        match self {
            ArmInst::Inst { op, .. } => Some(op),
            ArmInst::Label(_) => None,
        }
    }
}

impl fmt::Display for ArmInst {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ArmInst::Label(name) => write!(f, "{}:", name),
            ArmInst::Inst { op, operands } => {
                write!(f, "    {}", op)?;
                for (i, operand) in operands.iter().enumerate() {
                    if i == 0 {
                        write!(f, " {}", operand)?;
                    } else {
                        write!(f, ", {}", operand)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// 操作数的存储位置，由栈布局解析而来
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loc {
    /// 整数常量
    Imm(i32),
    /// fp 相对的栈槽，取值为槽内容
    Stack(i32),
    /// fp 相对的栈槽，取值为槽地址（数组基址）
    StackAddr(i32),
    /// 全局标量，按符号寻址后取内容
    Global(String),
    /// 全局数组，取符号地址本身
    GlobalAddr(String),
}

/// 写回目标非法：立即数与地址位置只读
#[derive(Debug, Error, PartialEq, Eq)]
#[error("写回目标位置非法: {0:?}")]
pub struct BadStoreTarget(pub Loc);

/// 指令发射缓冲
#[derive(Debug, Default)]
pub struct Iloc {
    insts: Vec<ArmInst>,
}

impl Iloc {
    pub fn new() -> Self {
        Iloc { insts: Vec::new() }
    }

    pub fn insts(&self) -> &[ArmInst] {
        &self.insts
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// 追加一条指令
    pub fn inst(
        &mut self,
        op: impl Into<String>,
        operands: Vec<Operand>,
    ) {
        self.insts.push(ArmInst::Inst {
            op: op.into(),
            operands,
        });
    }

    /// 定义一个标签
    pub fn label(
        &mut self,
        name: impl Into<String>,
    ) {
        self.insts.push(ArmInst::Label(name.into()));
    }

    /// 无条件跳转
    pub fn jump(
        &mut self,
        target: impl Into<String>,
    ) {
        self.inst("b", vec![Operand::Label(target.into())]);
    }

    /// 条件跳转，cond 为 ARM 条件码
    pub fn branch(
        &mut self,
        cond: &str,
        target: impl Into<String>,
    ) {
        self.inst(format!("b{}", cond), vec![Operand::Label(target.into())]);
    }

    /// 立即数装入寄存器：可编码用 mov，否则经常量池 ldr
    pub fn load_imm(
        &mut self,
        reg: RegId,
        value: i32,
    ) {
        if is_imm8m(value) {
            self.inst("mov", vec![Operand::Reg(reg), Operand::Imm(value)]);
        } else if is_imm8m(!value) {
            self.inst("mvn", vec![Operand::Reg(reg), Operand::Imm(!value)]);
        } else {
            self.inst("ldr", vec![Operand::Reg(reg), Operand::PoolImm(value)]);
        }
    }

    /// 符号地址装入寄存器
    pub fn load_symbol(
        &mut self,
        reg: RegId,
        symbol: impl Into<String>,
    ) {
        self.inst(
            "ldr",
            vec![Operand::Reg(reg), Operand::PoolSym(symbol.into())],
        );
    }

    /// 把位置 loc 的取值装入寄存器，tmp 用于合成超范围的地址
    pub fn load_var(
        &mut self,
        reg: RegId,
        loc: &Loc,
        tmp: RegId,
    ) {
        match loc {
            Loc::Imm(v) => self.load_imm(reg, *v),
            Loc::Stack(offset) => {
                if is_ldst_offset(*offset) {
                    self.inst(
                        "ldr",
                        vec![
                            Operand::Reg(reg),
                            Operand::Mem {
                                base: FP,
                                offset: *offset,
                            },
                        ],
                    );
                } else {
                    self.load_imm(tmp, *offset);
                    self.inst(
                        "ldr",
                        vec![
                            Operand::Reg(reg),
                            Operand::MemReg {
                                base: FP,
                                index: tmp,
                            },
                        ],
                    );
                }
            }
            Loc::StackAddr(offset) => {
                if is_imm8m(*offset) || is_imm8m(-*offset) {
                    let (op, v) = if *offset >= 0 {
                        ("add", *offset)
                    } else {
                        ("sub", -*offset)
                    };
                    self.inst(
                        op,
                        vec![Operand::Reg(reg), Operand::Reg(FP), Operand::Imm(v)],
                    );
                } else {
                    self.load_imm(tmp, *offset);
                    self.inst(
                        "add",
                        vec![Operand::Reg(reg), Operand::Reg(FP), Operand::Reg(tmp)],
                    );
                }
            }
            Loc::Global(name) => {
                self.load_symbol(tmp, name.clone());
                self.inst(
                    "ldr",
                    vec![
                        Operand::Reg(reg),
                        Operand::Mem {
                            base: tmp,
                            offset: 0,
                        },
                    ],
                );
            }
            Loc::GlobalAddr(name) => {
                self.load_symbol(reg, name.clone());
            }
        }
    }

    /// 把寄存器内容写回位置 loc，tmp 用于合成地址
    pub fn store_var(
        &mut self,
        reg: RegId,
        loc: &Loc,
        tmp: RegId,
    ) -> Result<(), BadStoreTarget> {
        match loc {
            Loc::Stack(offset) => {
                if is_ldst_offset(*offset) {
                    self.inst(
                        "str",
                        vec![
                            Operand::Reg(reg),
                            Operand::Mem {
                                base: FP,
                                offset: *offset,
                            },
                        ],
                    );
                } else {
                    self.load_imm(tmp, *offset);
                    self.inst(
                        "str",
                        vec![
                            Operand::Reg(reg),
                            Operand::MemReg {
                                base: FP,
                                index: tmp,
                            },
                        ],
                    );
                }
            }
            Loc::Global(name) => {
                self.load_symbol(tmp, name.clone());
                self.inst(
                    "str",
                    vec![
                        Operand::Reg(reg),
                        Operand::Mem {
                            base: tmp,
                            offset: 0,
                        },
                    ],
                );
            }
            // 立即数与地址位置不是合法的写回目标
            Loc::Imm(_) | Loc::StackAddr(_) | Loc::GlobalAddr(_) => {
                return Err(BadStoreTarget(loc.clone()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Iloc {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for inst in &self.insts {
            writeln!(f, "{}", inst)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::arm32::SCRATCH_REGS;

    #[test]
    fn test_load_small_imm_uses_mov() {
        let mut iloc = Iloc::new();
        iloc.load_imm(SCRATCH_REGS[0], 42);
        assert_eq!(iloc.insts()[0].to_string(), "    mov r8, #42");
    }

    #[test]
    fn test_load_large_imm_uses_pool() {
        let mut iloc = Iloc::new();
        iloc.load_imm(SCRATCH_REGS[0], 123457);
        assert_eq!(iloc.insts()[0].to_string(), "    ldr r8, =123457");
    }

    #[test]
    fn test_load_negative_imm_uses_mvn() {
        let mut iloc = Iloc::new();
        iloc.load_imm(SCRATCH_REGS[0], -1);
        assert_eq!(iloc.insts()[0].to_string(), "    mvn r8, #0");
    }

    #[test]
    fn test_stack_load_store() {
        let mut iloc = Iloc::new();
        iloc.load_var(SCRATCH_REGS[0], &Loc::Stack(-8), SCRATCH_REGS[1]);
        iloc.store_var(SCRATCH_REGS[0], &Loc::Stack(-8), SCRATCH_REGS[1])
            .unwrap();
        assert_eq!(iloc.insts()[0].to_string(), "    ldr r8, [fp, #-8]");
        assert_eq!(iloc.insts()[1].to_string(), "    str r8, [fp, #-8]");
    }

    #[test]
    fn test_array_base_is_address() {
        let mut iloc = Iloc::new();
        iloc.load_var(SCRATCH_REGS[0], &Loc::StackAddr(-24), SCRATCH_REGS[1]);
        assert_eq!(iloc.insts()[0].to_string(), "    sub r8, fp, #24");
    }

    #[test]
    fn test_global_load() {
        let mut iloc = Iloc::new();
        iloc.load_var(
            SCRATCH_REGS[0],
            &Loc::Global("g".to_string()),
            SCRATCH_REGS[1],
        );
        assert_eq!(iloc.insts()[0].to_string(), "    ldr r9, =g");
        assert_eq!(iloc.insts()[1].to_string(), "    ldr r8, [r9]");
    }

    #[test]
    fn test_store_into_readonly_location_rejected() {
        let mut iloc = Iloc::new();
        let err = iloc
            .store_var(SCRATCH_REGS[0], &Loc::Imm(3), SCRATCH_REGS[1])
            .unwrap_err();
        assert_eq!(err, BadStoreTarget(Loc::Imm(3)));
        let err = iloc
            .store_var(SCRATCH_REGS[0], &Loc::StackAddr(-16), SCRATCH_REGS[1])
            .unwrap_err();
        assert_eq!(err, BadStoreTarget(Loc::StackAddr(-16)));
        assert!(iloc.is_empty());
    }
}
