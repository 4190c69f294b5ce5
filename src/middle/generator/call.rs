//! 函数调用下降
//!
//! 实参自左向右求值。形参为指针时，数组名实参退化为指针
//! （`add 基址, 0`，取地址不取值）；数组元素实参按被调函数
//! 声明的形参维度计算元素地址传入。实参个数与形参不符是
//! 致命错误，此时不生成 Call 指令。

use tracing::debug;

use crate::frontend::ast::{AstKind, NodeId};
use crate::middle::instruction::{Instruction, IrOp};
use crate::middle::intercode::InterCode;
use crate::middle::types::Type;
use crate::middle::value::Value;

use super::{Generator, LowerCtx, Lowered, LowerError};

impl<'a> Generator<'a> {
    pub(crate) fn lower_call(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let name = self.node_name(id)?;
        let (expected, return_type, formal_types) = {
            let callee = self
                .module
                .function(&name)
                .ok_or_else(|| LowerError::UndefinedFunction(name.clone()))?;
            let types: Vec<Type> =
                callee.params().iter().map(|p| p.ty.clone()).collect();
            (callee.arity(), callee.return_type.clone(), types)
        };

        let args = self.ast.children(id).to_vec();
        debug!("下降函数调用 {}，实参数量: {}", name, args.len());
        ctx.func.note_call_args(args.len());

        let mut code = InterCode::new();
        let mut values = Vec::with_capacity(args.len());

        for (i, arg) in args.iter().enumerate() {
            let formal_is_pointer = formal_types
                .get(i)
                .map(|t| t.is_pointer())
                .unwrap_or(false);

            if formal_is_pointer && self.ast.kind(*arg) == AstKind::LeafVar {
                let var_name = self.node_name(*arg)?;
                let var = self
                    .module
                    .lookup(&var_name)
                    .ok_or(LowerError::UndefinedVariable(var_name))?;
                if self.value_ty(ctx, var).is_array() {
                    // 数组名退化为指向首元素的指针
                    let ptr = ctx.func.new_temp(Type::pointer_to(Type::Int32));
                    code.add_inst(Instruction::Binary {
                        op: IrOp::Add,
                        lhs: var,
                        rhs: Some(Value::ConstInt(0)),
                        result: ptr,
                    });
                    values.push(ptr);
                    continue;
                }
                // 指针形参原样转传
                values.push(var);
                continue;
            }

            if formal_is_pointer && self.ast.kind(*arg) == AstKind::ArrayAccess {
                // 元素地址按被调函数声明的维度计算
                let tail: Vec<i32> = self
                    .module
                    .param_dims(&name, i)
                    .map(|d| d.to_vec())
                    .unwrap_or_default();
                let mut lowered =
                    self.lower_element_address_with_dims(ctx, *arg, &tail)?;
                code.add_code(&mut lowered.code);
                let ptr = Self::expect_value(&lowered)?;
                values.push(ptr);
                continue;
            }

            let mut lowered = self.lower_expr(ctx, *arg)?;
            let value = Self::expect_value(&lowered)?;
            code.add_code(&mut lowered.code);
            values.push(value);
        }

        // 个数检查在 Call 指令创建之前
        if values.len() != expected {
            return Err(LowerError::ArityMismatch {
                name,
                expected,
                found: values.len(),
            });
        }

        let result = if return_type != Type::Void {
            Some(ctx.func.new_temp(Type::Int32))
        } else {
            None
        };
        code.add_inst(Instruction::Call {
            callee: name,
            args: values,
            result,
        });

        Ok(Lowered {
            code,
            value: result,
            array_ptr: None,
        })
    }
}
