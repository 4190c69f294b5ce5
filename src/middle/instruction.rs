//! 线性三地址 IR 指令
//!
//! 每条指令最多一个结果、两个操作数。控制流通过标签与跳转表达，
//! 不构造基本块图。

use std::fmt;

use crate::middle::value::Value;

/// IR 标签编号，函数内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

/// 二元 / 一元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// 一元取负，此时 Binary 的 rhs 为 None
    Neg,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl IrOp {
    /// 是否为产生布尔结果的关系运算
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            IrOp::Lt | IrOp::Gt | IrOp::Le | IrOp::Ge | IrOp::Eq | IrOp::Ne
        )
    }
}

impl fmt::Display for IrOp {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            IrOp::Add => "add",
            IrOp::Sub => "sub",
            IrOp::Mul => "mul",
            IrOp::Div => "div",
            IrOp::Mod => "mod",
            IrOp::Neg => "neg",
            IrOp::Lt => "lt",
            IrOp::Gt => "gt",
            IrOp::Le => "le",
            IrOp::Ge => "ge",
            IrOp::Eq => "eq",
            IrOp::Ne => "ne",
        };
        write!(f, "{}", s)
    }
}

/// Move 指令的寻址方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// 普通赋值 dst = src
    Plain,
    /// 间接读 dst = *src（src 为元素地址）
    PointerLoad,
    /// 间接写 *dst = src（dst 为元素地址）
    PointerStore,
}

/// IR 指令
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// 函数入口
    Entry,
    /// 函数出口，ret 为返回值槽
    Exit { ret: Option<Value> },
    /// 标签定义
    Label(LabelId),
    /// 无条件跳转
    Goto { target: LabelId },
    /// 条件跳转：cond 非零跳 true_target，否则跳 false_target
    CondGoto {
        cond: Value,
        true_target: LabelId,
        false_target: LabelId,
    },
    /// 二元 / 一元运算，Neg 时 rhs 为 None
    Binary {
        op: IrOp,
        lhs: Value,
        rhs: Option<Value>,
        result: Value,
    },
    /// 数据移动
    Move {
        dst: Value,
        src: Value,
        kind: MoveKind,
    },
    /// 函数调用，void 函数 result 为 None
    Call {
        callee: String,
        args: Vec<Value>,
        result: Option<Value>,
    },
}

impl fmt::Display for Instruction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Instruction::Entry => write!(f, "entry"),
            Instruction::Exit { ret: Some(v) } => write!(f, "exit {}", v),
            Instruction::Exit { ret: None } => write!(f, "exit"),
            Instruction::Label(l) => write!(f, "{}:", l),
            Instruction::Goto { target } => write!(f, "goto {}", target),
            Instruction::CondGoto {
                cond,
                true_target,
                false_target,
            } => write!(f, "bc {}, {}, {}", cond, true_target, false_target),
            Instruction::Binary {
                op,
                lhs,
                rhs: Some(rhs),
                result,
            } => write!(f, "{} = {} {}, {}", result, op, lhs, rhs),
            Instruction::Binary {
                op,
                lhs,
                rhs: None,
                result,
            } => write!(f, "{} = {} {}", result, op, lhs),
            Instruction::Move { dst, src, kind } => match kind {
                MoveKind::Plain => write!(f, "{} = {}", dst, src),
                MoveKind::PointerLoad => write!(f, "{} = *{}", dst, src),
                MoveKind::PointerStore => write!(f, "*{} = {}", dst, src),
            },
            Instruction::Call {
                callee,
                args,
                result,
            } => {
                if let Some(r) = result {
                    write!(f, "{} = call {}(", r, callee)?;
                } else {
                    write!(f, "call {}(", callee)?;
                }
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}
