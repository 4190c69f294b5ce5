//! 表达式下降
//!
//! 算术与关系运算按从左到右的顺序求值并拼接子表达式指令，
//! 最后追加一条 Binary。逻辑与/或按短路求值展开为标签与跳转，
//! 右操作数的指令只能经由"第二操作数"标签到达。

use crate::frontend::ast::{AstKind, NodeId};
use crate::middle::instruction::{Instruction, IrOp, MoveKind};
use crate::middle::intercode::InterCode;
use crate::middle::types::Type;
use crate::middle::value::Value;

use super::{Generator, LowerCtx, Lowered, LowerError};

fn arith_op(kind: AstKind) -> IrOp {
    match kind {
        AstKind::Add => IrOp::Add,
        AstKind::Sub => IrOp::Sub,
        AstKind::Mul => IrOp::Mul,
        AstKind::Div => IrOp::Div,
        AstKind::Mod => IrOp::Mod,
        AstKind::Lt => IrOp::Lt,
        AstKind::Gt => IrOp::Gt,
        AstKind::Le => IrOp::Le,
        AstKind::Ge => IrOp::Ge,
        AstKind::Eq => IrOp::Eq,
        AstKind::Ne => IrOp::Ne,
        _ => unreachable!("非运算符节点"),
    }
}

impl<'a> Generator<'a> {
    // ===== 叶子 =====

    pub(crate) fn lower_leaf_int(
        &mut self,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let value = self
            .ast_int(id)
            .ok_or(LowerError::MalformedNode("整数叶子缺少数值载荷"))?;
        Ok(Lowered::expr(InterCode::new(), Value::ConstInt(value)))
    }

    pub(crate) fn lower_leaf_var(
        &mut self,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let name = self.node_name(id)?;
        let value = self
            .module
            .lookup(&name)
            .ok_or(LowerError::UndefinedVariable(name))?;
        Ok(Lowered::expr(InterCode::new(), value))
    }

    fn ast_int(
        &self,
        id: NodeId,
    ) -> Option<i32> {
        self.const_eval(id)
    }

    // ===== 算术 =====

    /// 二元算术：左、右、一条 Binary
    pub(crate) fn lower_arith(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let kind = self.ast_kind(id);
        let (lhs_id, rhs_id) = self.two_children(id)?;

        let left = self.lower_expr(ctx, lhs_id)?;
        let lhs = Self::expect_value(&left)?;
        let right = self.lower_expr(ctx, rhs_id)?;
        let rhs = Self::expect_value(&right)?;

        let mut code = InterCode::new();
        let mut left = left;
        let mut right = right;
        code.add_code(&mut left.code);
        code.add_code(&mut right.code);

        let result = ctx.func.new_temp(Type::Int32);
        code.add_inst(Instruction::Binary {
            op: arith_op(kind),
            lhs,
            rhs: Some(rhs),
            result,
        });
        Ok(Lowered::expr(code, result))
    }

    /// 一元取负
    pub(crate) fn lower_neg(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let operand_id = self.one_child(id)?;
        let mut operand = self.lower_expr(ctx, operand_id)?;
        let value = Self::expect_value(&operand)?;

        let mut code = InterCode::new();
        code.add_code(&mut operand.code);
        let result = ctx.func.new_temp(Type::Int32);
        code.add_inst(Instruction::Binary {
            op: IrOp::Neg,
            lhs: value,
            rhs: None,
            result,
        });
        Ok(Lowered::expr(code, result))
    }

    // ===== 关系 =====

    /// 关系运算产生布尔结果，分支由 if/while 消费
    pub(crate) fn lower_relational(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let kind = self.ast_kind(id);
        let (lhs_id, rhs_id) = self.two_children(id)?;

        let mut left = self.lower_expr(ctx, lhs_id)?;
        let lhs = Self::expect_value(&left)?;
        let mut right = self.lower_expr(ctx, rhs_id)?;
        let rhs = Self::expect_value(&right)?;

        let mut code = InterCode::new();
        code.add_code(&mut left.code);
        code.add_code(&mut right.code);

        let result = ctx.func.new_temp(Type::Bool);
        code.add_inst(Instruction::Binary {
            op: arith_op(kind),
            lhs,
            rhs: Some(rhs),
            result,
        });
        Ok(Lowered::expr(code, result))
    }

    // ===== 逻辑 =====

    /// 短路与：a 为假时 b 的指令不可达
    pub(crate) fn lower_logic_and(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let (lhs_id, rhs_id) = self.two_children(id)?;

        let result = ctx.func.new_temp(Type::Bool);
        let second_label = ctx.func.new_label();
        let false_label = ctx.func.new_label();
        let end_label = ctx.func.new_label();

        let mut code = InterCode::new();

        // 左操作数求值并转布尔
        let mut left = self.lower_expr(ctx, lhs_id)?;
        let lhs = Self::expect_value(&left)?;
        code.add_code(&mut left.code);
        let lhs_bool = self.int_to_bool(ctx, &mut code, lhs);
        code.add_inst(Instruction::CondGoto {
            cond: lhs_bool,
            true_target: second_label,
            false_target: false_label,
        });

        // 第二操作数：仅此路径可达
        code.add_inst(Instruction::Label(second_label));
        let mut right = self.lower_expr(ctx, rhs_id)?;
        let rhs = Self::expect_value(&right)?;
        code.add_code(&mut right.code);
        let rhs_bool = self.int_to_bool(ctx, &mut code, rhs);
        code.add_inst(Instruction::Move {
            dst: result,
            src: rhs_bool,
            kind: MoveKind::Plain,
        });
        code.add_inst(Instruction::Goto { target: end_label });

        // 短路：结果为 0
        code.add_inst(Instruction::Label(false_label));
        code.add_inst(Instruction::Move {
            dst: result,
            src: Value::ConstInt(0),
            kind: MoveKind::Plain,
        });

        code.add_inst(Instruction::Label(end_label));
        Ok(Lowered::expr(code, result))
    }

    /// 短路或：a 为真时 b 的指令不可达
    pub(crate) fn lower_logic_or(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let (lhs_id, rhs_id) = self.two_children(id)?;

        let result = ctx.func.new_temp(Type::Bool);
        let true_label = ctx.func.new_label();
        let second_label = ctx.func.new_label();
        let end_label = ctx.func.new_label();

        let mut code = InterCode::new();

        let mut left = self.lower_expr(ctx, lhs_id)?;
        let lhs = Self::expect_value(&left)?;
        code.add_code(&mut left.code);
        let lhs_bool = self.int_to_bool(ctx, &mut code, lhs);
        code.add_inst(Instruction::CondGoto {
            cond: lhs_bool,
            true_target: true_label,
            false_target: second_label,
        });

        // 第二操作数在假分支落空处求值
        code.add_inst(Instruction::Label(second_label));
        let mut right = self.lower_expr(ctx, rhs_id)?;
        let rhs = Self::expect_value(&right)?;
        code.add_code(&mut right.code);
        let rhs_bool = self.int_to_bool(ctx, &mut code, rhs);
        code.add_inst(Instruction::Move {
            dst: result,
            src: rhs_bool,
            kind: MoveKind::Plain,
        });
        code.add_inst(Instruction::Goto { target: end_label });

        // 短路：结果为 1
        code.add_inst(Instruction::Label(true_label));
        code.add_inst(Instruction::Move {
            dst: result,
            src: Value::ConstInt(1),
            kind: MoveKind::Plain,
        });

        code.add_inst(Instruction::Label(end_label));
        Ok(Lowered::expr(code, result))
    }

    /// 逻辑非：operand == 0
    pub(crate) fn lower_logic_not(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let operand_id = self.one_child(id)?;
        let mut operand = self.lower_expr(ctx, operand_id)?;
        let value = Self::expect_value(&operand)?;

        let mut code = InterCode::new();
        code.add_code(&mut operand.code);
        let result = ctx.func.new_temp(Type::Bool);
        code.add_inst(Instruction::Binary {
            op: IrOp::Eq,
            lhs: value,
            rhs: Some(Value::ConstInt(0)),
            result,
        });
        Ok(Lowered::expr(code, result))
    }

    // ===== 孩子提取 =====

    pub(crate) fn ast_kind(
        &self,
        id: NodeId,
    ) -> AstKind {
        self.ast.kind(id)
    }

    pub(crate) fn one_child(
        &self,
        id: NodeId,
    ) -> Result<NodeId, LowerError> {
        self.ast
            .children(id)
            .first()
            .copied()
            .ok_or(LowerError::MalformedNode("缺少操作数孩子"))
    }

    pub(crate) fn two_children(
        &self,
        id: NodeId,
    ) -> Result<(NodeId, NodeId), LowerError> {
        let children = self.ast.children(id);
        match children {
            [lhs, rhs] => Ok((*lhs, *rhs)),
            _ => Err(LowerError::MalformedNode("双操作数节点孩子数不为2")),
        }
    }
}
