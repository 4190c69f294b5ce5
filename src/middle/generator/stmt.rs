//! 语句下降
//!
//! 控制流只用标签与跳转线性化，不构造基本块对象。
//! while 的循环标签对压入下降上下文的标签栈，
//! break/continue 始终解析到最内层循环。

use tracing::debug;

use crate::frontend::ast::{AstKind, NodeId};
use crate::middle::instruction::{Instruction, MoveKind};
use crate::middle::intercode::InterCode;
use crate::middle::types::Type;
use crate::middle::value::Value;

use super::{Generator, LoopLabels, LowerCtx, LowerError};

impl<'a> Generator<'a> {
    /// 语句块，new_scope 为假时复用外层作用域（函数体块）
    pub(crate) fn lower_block(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
        new_scope: bool,
    ) -> Result<InterCode, LowerError> {
        if new_scope {
            self.module.enter_scope();
        }
        let mut code = InterCode::new();
        let stmts = self.ast.children(id);
        for stmt in stmts {
            match self.lower_stmt(ctx, *stmt) {
                Ok(mut stmt_code) => code.add_code(&mut stmt_code),
                Err(e) => {
                    if new_scope {
                        self.module.leave_scope();
                    }
                    return Err(e);
                }
            }
        }
        if new_scope {
            self.module.leave_scope();
        }
        Ok(code)
    }

    /// 局部标量声明，未显式初始化则补零
    pub(crate) fn lower_local_decl(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<InterCode, LowerError> {
        let name = self.node_name(id)?;
        let local = ctx.func.new_local(&name, Type::Int32);
        self.module.declare(name, local);

        let mut code = InterCode::new();
        if let Some(init) = self.ast.children(id).first().copied() {
            let mut lowered = self.lower_expr(ctx, init)?;
            let value = Self::expect_value(&lowered)?;
            code.add_code(&mut lowered.code);
            code.add_inst(Instruction::Move {
                dst: local,
                src: value,
                kind: MoveKind::Plain,
            });
        } else {
            code.add_inst(Instruction::Move {
                dst: local,
                src: Value::ConstInt(0),
                kind: MoveKind::Plain,
            });
        }
        Ok(code)
    }

    /// 局部数组定义，维度必须是正的编译期常量
    pub(crate) fn lower_local_array(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<InterCode, LowerError> {
        let name = self.node_name(id)?;
        let dims = self.eval_dimensions(id, &name)?;
        debug!("定义局部数组 {}，维度: {:?}", name, dims);
        let local = ctx
            .func
            .new_local(&name, Type::array_of(Type::Int32, dims));
        self.module.declare(name, local);
        Ok(InterCode::new())
    }

    /// 赋值：先算右值再算左值
    pub(crate) fn lower_assign(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<InterCode, LowerError> {
        let (lhs_id, rhs_id) = self.two_children(id)?;

        let mut right = self.lower_expr(ctx, rhs_id)?;
        let value = Self::expect_value(&right)?;
        let mut code = InterCode::new();
        code.add_code(&mut right.code);

        match self.ast.kind(lhs_id) {
            AstKind::LeafVar => {
                let name = self.node_name(lhs_id)?;
                let target = self
                    .module
                    .lookup(&name)
                    .ok_or(LowerError::UndefinedVariable(name))?;
                code.add_inst(Instruction::Move {
                    dst: target,
                    src: value,
                    kind: MoveKind::Plain,
                });
            }
            AstKind::ArrayAccess => {
                // 目标是数组元素：保留地址，经指针写入
                let mut address = self.lower_array_address(ctx, lhs_id)?;
                code.add_code(&mut address.code);
                let ptr = address
                    .array_ptr
                    .ok_or(LowerError::MalformedNode("数组赋值目标缺少元素地址"))?;
                code.add_inst(Instruction::Move {
                    dst: ptr,
                    src: value,
                    kind: MoveKind::PointerStore,
                });
            }
            _ => return Err(LowerError::MalformedNode("赋值目标不是左值")),
        }
        Ok(code)
    }

    /// return：写返回值槽后无条件跳出口标签
    pub(crate) fn lower_return(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<InterCode, LowerError> {
        let mut code = InterCode::new();
        if let Some(expr) = self.ast.children(id).first().copied() {
            let mut lowered = self.lower_expr(ctx, expr)?;
            let value = Self::expect_value(&lowered)?;
            code.add_code(&mut lowered.code);
            if let Some(slot) = ctx.func.return_slot {
                code.add_inst(Instruction::Move {
                    dst: slot,
                    src: value,
                    kind: MoveKind::Plain,
                });
            }
        }
        let exit = ctx
            .func
            .exit_label
            .ok_or(LowerError::MalformedNode("函数缺少出口标签"))?;
        code.add_inst(Instruction::Goto { target: exit });
        Ok(code)
    }

    pub(crate) fn lower_if(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<InterCode, LowerError> {
        let (cond_id, then_id) = self.two_children(id)?;
        let true_label = ctx.func.new_label();
        let end_label = ctx.func.new_label();

        let mut code = InterCode::new();
        let mut cond = self.lower_expr(ctx, cond_id)?;
        let cond_value = Self::expect_value(&cond)?;
        code.add_code(&mut cond.code);
        let cond_bool = self.int_to_bool(ctx, &mut code, cond_value);
        code.add_inst(Instruction::CondGoto {
            cond: cond_bool,
            true_target: true_label,
            false_target: end_label,
        });

        code.add_inst(Instruction::Label(true_label));
        let mut body = self.lower_stmt(ctx, then_id)?;
        code.add_code(&mut body);
        code.add_inst(Instruction::Label(end_label));
        Ok(code)
    }

    pub(crate) fn lower_if_else(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<InterCode, LowerError> {
        let children = self.ast.children(id);
        let [cond_id, then_id, else_id] = children else {
            return Err(LowerError::MalformedNode("if-else节点孩子数不为3"));
        };
        let (cond_id, then_id, else_id) = (*cond_id, *then_id, *else_id);

        let true_label = ctx.func.new_label();
        let false_label = ctx.func.new_label();
        let end_label = ctx.func.new_label();

        let mut code = InterCode::new();
        let mut cond = self.lower_expr(ctx, cond_id)?;
        let cond_value = Self::expect_value(&cond)?;
        code.add_code(&mut cond.code);
        let cond_bool = self.int_to_bool(ctx, &mut code, cond_value);
        code.add_inst(Instruction::CondGoto {
            cond: cond_bool,
            true_target: true_label,
            false_target: false_label,
        });

        code.add_inst(Instruction::Label(true_label));
        let mut then_body = self.lower_stmt(ctx, then_id)?;
        code.add_code(&mut then_body);
        code.add_inst(Instruction::Goto { target: end_label });

        code.add_inst(Instruction::Label(false_label));
        let mut else_body = self.lower_stmt(ctx, else_id)?;
        code.add_code(&mut else_body);
        code.add_inst(Instruction::Label(end_label));
        Ok(code)
    }

    /// while：条件标签、条件求值、双目标跳转、体、回跳、出口标签。
    /// 条件为编译期常量时省略条件跳转：非零直接进体（死循环，
    /// break 是唯一出口），零直接跳过循环且不下降循环体。
    pub(crate) fn lower_while(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<InterCode, LowerError> {
        let (cond_id, body_id) = self.two_children(id)?;
        let cond_label = ctx.func.new_label();
        let body_label = ctx.func.new_label();
        let end_label = ctx.func.new_label();

        let mut code = InterCode::new();

        if let Some(cond_const) = self.const_eval(cond_id) {
            if cond_const == 0 {
                // 循环体不可达，直接跳过
                code.add_inst(Instruction::Goto { target: end_label });
                code.add_inst(Instruction::Label(end_label));
                return Ok(code);
            }
            // 死循环：无条件进体
            code.add_inst(Instruction::Label(cond_label));
            code.add_inst(Instruction::Goto { target: body_label });
            code.add_inst(Instruction::Label(body_label));
            ctx.loops.push(LoopLabels {
                break_target: end_label,
                continue_target: cond_label,
            });
            let body = self.lower_stmt(ctx, body_id);
            ctx.loops.pop();
            let mut body = body?;
            code.add_code(&mut body);
            code.add_inst(Instruction::Goto { target: cond_label });
            code.add_inst(Instruction::Label(end_label));
            return Ok(code);
        }

        code.add_inst(Instruction::Label(cond_label));
        let mut cond = self.lower_expr(ctx, cond_id)?;
        let cond_value = Self::expect_value(&cond)?;
        code.add_code(&mut cond.code);
        let cond_bool = self.int_to_bool(ctx, &mut code, cond_value);
        code.add_inst(Instruction::CondGoto {
            cond: cond_bool,
            true_target: body_label,
            false_target: end_label,
        });

        code.add_inst(Instruction::Label(body_label));
        ctx.loops.push(LoopLabels {
            break_target: end_label,
            continue_target: cond_label,
        });
        let body = self.lower_stmt(ctx, body_id);
        ctx.loops.pop();
        let mut body = body?;
        code.add_code(&mut body);
        code.add_inst(Instruction::Goto { target: cond_label });
        code.add_inst(Instruction::Label(end_label));
        Ok(code)
    }

    pub(crate) fn lower_break(
        &mut self,
        ctx: &mut LowerCtx,
    ) -> Result<InterCode, LowerError> {
        let labels = ctx.loops.last().ok_or(LowerError::BreakOutsideLoop)?;
        let mut code = InterCode::new();
        code.add_inst(Instruction::Goto {
            target: labels.break_target,
        });
        Ok(code)
    }

    pub(crate) fn lower_continue(
        &mut self,
        ctx: &mut LowerCtx,
    ) -> Result<InterCode, LowerError> {
        let labels = ctx.loops.last().ok_or(LowerError::ContinueOutsideLoop)?;
        let mut code = InterCode::new();
        code.add_inst(Instruction::Goto {
            target: labels.continue_target,
        });
        Ok(code)
    }
}
