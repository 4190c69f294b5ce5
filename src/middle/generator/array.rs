//! 数组访问下降
//!
//! 行主序线性化：对下标 i0..ik 与声明维度 d0..dn（k ≤ n），
//! 线性下标为 Σ i_j×stride_j，stride_j 为 d_{j+1}..dn 的乘积，
//! 末维步长为 1。字节偏移再乘元素大小 4，基址加偏移得元素地址。
//! 读取经 pointerLoad，赋值目标保留地址经 pointerStore 写入。
//!
//! 数组形参的运行期类型是裸指针，真实维度查模块的维度表
//! （退化的首维不参与步长计算）。

use crate::frontend::ast::NodeId;
use crate::middle::instruction::{Instruction, IrOp, MoveKind};
use crate::middle::intercode::InterCode;
use crate::middle::types::Type;
use crate::middle::value::Value;

use super::{Generator, LowerCtx, Lowered, LowerError};

/// 元素地址计算的中间结果
struct ElementAddress {
    code: InterCode,
    ptr: Value,
    /// 下标个数是否覆盖全部维度；不足时地址指向子数组
    full_access: bool,
}

impl<'a> Generator<'a> {
    /// 表达式位置的数组访问：计算地址并读出元素值
    pub(crate) fn lower_array_access(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let addr = self.element_address(ctx, id, None)?;
        let mut code = addr.code;
        if !addr.full_access {
            // 部分下标：值即子数组地址
            return Ok(Lowered {
                code,
                value: Some(addr.ptr),
                array_ptr: Some(addr.ptr),
            });
        }
        let element = ctx.func.new_temp(Type::Int32);
        code.add_inst(Instruction::Move {
            dst: element,
            src: addr.ptr,
            kind: MoveKind::PointerLoad,
        });
        Ok(Lowered {
            code,
            value: Some(element),
            array_ptr: Some(addr.ptr),
        })
    }

    /// 赋值目标位置的数组访问：只计算元素地址，不读取
    pub(crate) fn lower_array_address(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let addr = self.element_address(ctx, id, None)?;
        Ok(Lowered {
            code: addr.code,
            value: None,
            array_ptr: Some(addr.ptr),
        })
    }

    /// 实参位置的数组元素地址，步长按被调函数声明的形参维度计算
    /// （指针退化丢弃了调用方数组的形状）
    pub(crate) fn lower_element_address_with_dims(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
        callee_tail_dims: &[i32],
    ) -> Result<Lowered, LowerError> {
        let addr = self.element_address(ctx, id, Some(callee_tail_dims))?;
        Ok(Lowered {
            code: addr.code,
            value: Some(addr.ptr),
            array_ptr: Some(addr.ptr),
        })
    }

    /// 地址线性化的公共路径。tail_override 给出覆盖用的尾维表
    /// （stride_j = tail[j..] 的乘积），None 时由基变量自身推导。
    fn element_address(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
        tail_override: Option<&[i32]>,
    ) -> Result<ElementAddress, LowerError> {
        let name = self.node_name(id)?;
        let base = self
            .module
            .lookup(&name)
            .ok_or_else(|| LowerError::UndefinedVariable(name.clone()))?;
        let indices = self.ast.children(id).to_vec();

        // 尾维表与总维数
        let (tail, rank): (Vec<i32>, usize) = match tail_override {
            Some(t) => (t.to_vec(), t.len() + 1),
            None => match self.value_ty(ctx, base) {
                Type::Array { dims, .. } => {
                    let rank = dims.len();
                    (dims[1..].to_vec(), rank)
                }
                Type::Pointer(_) => {
                    let param_index = match base {
                        Value::Param(i) => i as usize,
                        _ => 0,
                    };
                    match self.module.param_dims(&ctx.func.name, param_index) {
                        Some(dims) => (dims.to_vec(), dims.len() + 1),
                        None if indices.len() == 1 => (Vec::new(), 1),
                        None => {
                            return Err(LowerError::MissingParamDims {
                                func: ctx.func.name.clone(),
                                index: param_index,
                            })
                        }
                    }
                }
                _ => {
                    return Err(LowerError::MalformedNode(
                        "下标访问的基变量不是数组或指针",
                    ))
                }
            },
        };

        if indices.len() > rank {
            return Err(LowerError::MalformedNode("数组访问的下标个数超过维数"));
        }
        let full_access = indices.len() == rank;

        let mut code = InterCode::new();

        // 全零常量下标直接取字面量零偏移
        let all_zero = indices
            .iter()
            .all(|idx| self.const_eval(*idx) == Some(0));
        let byte_offset = if all_zero {
            Value::ConstInt(0)
        } else {
            // 逐维累加线性下标
            let mut linear = Value::ConstInt(0);
            for (j, idx) in indices.iter().enumerate() {
                let mut lowered = self.lower_expr(ctx, *idx)?;
                let idx_value = Self::expect_value(&lowered)?;
                code.add_code(&mut lowered.code);

                let stride: i32 = tail.get(j..).map_or(1, |t| t.iter().product());
                let term = if stride == 1 {
                    idx_value
                } else {
                    let product = ctx.func.new_temp(Type::Int32);
                    code.add_inst(Instruction::Binary {
                        op: IrOp::Mul,
                        lhs: idx_value,
                        rhs: Some(Value::ConstInt(stride)),
                        result: product,
                    });
                    product
                };
                let sum = ctx.func.new_temp(Type::Int32);
                code.add_inst(Instruction::Binary {
                    op: IrOp::Add,
                    lhs: linear,
                    rhs: Some(term),
                    result: sum,
                });
                linear = sum;
            }

            let bytes = ctx.func.new_temp(Type::Int32);
            code.add_inst(Instruction::Binary {
                op: IrOp::Mul,
                lhs: linear,
                rhs: Some(Value::ConstInt(4)),
                result: bytes,
            });
            bytes
        };

        let ptr = ctx.func.new_temp(Type::pointer_to(Type::Int32));
        code.add_inst(Instruction::Binary {
            op: IrOp::Add,
            lhs: base,
            rhs: Some(byte_offset),
            result: ptr,
        });

        Ok(ElementAddress {
            code,
            ptr,
            full_access,
        })
    }
}
