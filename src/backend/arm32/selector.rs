//! ARM32 指令选择
//!
//! 逐条遍历函数体 IR，每种指令形态一个翻译分支。操作数按需装入
//! 草稿寄存器，结果写回栈槽后立即释放全部绑定，寄存器的生存期
//! 不跨越单条 IR 指令。

use thiserror::Error;
use tracing::debug;

use crate::middle::function::Function;
use crate::middle::instruction::{Instruction, IrOp, LabelId, MoveKind};
use crate::middle::module::Module;
use crate::middle::types::WORD_SIZE;
use crate::middle::value::Value;

use super::iloc::{BadStoreTarget, Iloc, Loc, Operand};
use super::regalloc::SimpleRegisterAllocator;
use super::stack::StackLayout;
use super::{is_imm8m, RegId, ARG_REG_COUNT, FP, IP, LR, SCRATCH_REGS, SP};

/// 指令选择错误
#[derive(Debug, Error, PartialEq)]
pub enum SelectError {
    #[error("草稿寄存器耗尽")]
    OutOfRegisters,

    #[error("操作数 {0} 没有存储位置")]
    MissingLocation(Value),

    /// 到达选择器的二元运算形态非法（未知运算或操作数个数不符）
    #[error("二元运算指令形态非法: {0}")]
    MalformedBinary(IrOp),

    #[error(transparent)]
    BadStoreTarget(#[from] BadStoreTarget),
}

/// 单个函数的指令选择器
pub struct InstSelector<'a> {
    func: &'a Function,
    module: &'a Module,
    layout: StackLayout,
    regs: SimpleRegisterAllocator,
    iloc: Iloc,
}

impl<'a> InstSelector<'a> {
    pub fn new(
        func: &'a Function,
        module: &'a Module,
    ) -> Self {
        InstSelector {
            func,
            module,
            layout: StackLayout::build(func),
            regs: SimpleRegisterAllocator::new(),
            iloc: Iloc::new(),
        }
    }

    /// 翻译整个函数体，返回目标指令序列
    pub fn run(mut self) -> Result<Iloc, SelectError> {
        debug!(
            "选择指令: {} (帧大小 {})",
            self.func.name,
            self.layout.frame_size()
        );
        let func = self.func;
        for inst in func.code.iter() {
            self.translate(inst)?;
        }
        Ok(self.iloc)
    }

    fn translate(
        &mut self,
        inst: &Instruction,
    ) -> Result<(), SelectError> {
        match inst {
            Instruction::Entry => self.translate_entry(),
            Instruction::Exit { ret } => self.translate_exit(*ret),
            Instruction::Label(label) => {
                let name = self.label_name(*label);
                self.iloc.label(name);
                Ok(())
            }
            Instruction::Goto { target } => {
                let name = self.label_name(*target);
                self.iloc.jump(name);
                Ok(())
            }
            Instruction::CondGoto {
                cond,
                true_target,
                false_target,
            } => self.translate_cond_goto(*cond, *true_target, *false_target),
            Instruction::Binary {
                op,
                lhs,
                rhs,
                result,
            } => self.translate_binary(*op, *lhs, *rhs, *result),
            Instruction::Move { dst, src, kind } => {
                self.translate_move(*dst, *src, *kind)
            }
            Instruction::Call {
                callee,
                args,
                result,
            } => self.translate_call(callee, args, *result),
        }
    }

    // ===== 函数序言 / 尾声 =====

    fn translate_entry(&mut self) -> Result<(), SelectError> {
        self.iloc
            .inst("push", vec![Operand::RegList(vec![FP, LR])]);
        self.iloc
            .inst("mov", vec![Operand::Reg(FP), Operand::Reg(SP)]);

        let frame = self.layout.frame_size();
        if frame > 0 {
            if is_imm8m(frame) {
                self.iloc.inst(
                    "sub",
                    vec![Operand::Reg(SP), Operand::Reg(SP), Operand::Imm(frame)],
                );
            } else {
                self.iloc.load_imm(IP, frame);
                self.iloc.inst(
                    "sub",
                    vec![Operand::Reg(SP), Operand::Reg(SP), Operand::Reg(IP)],
                );
            }
        }

        // 形参落栈：前四个来自 r0-r3，其余由调用方压在栈上
        for i in 0..self.func.arity() {
            let slot = self.location(Value::Param(i as u32))?;
            if i < ARG_REG_COUNT {
                self.iloc.store_var(RegId(i as u8), &slot, IP)?;
            } else {
                let incoming = StackLayout::incoming_param_offset(i);
                self.iloc.inst(
                    "ldr",
                    vec![
                        Operand::Reg(SCRATCH_REGS[0]),
                        Operand::Mem {
                            base: FP,
                            offset: incoming,
                        },
                    ],
                );
                self.iloc.store_var(SCRATCH_REGS[0], &slot, IP)?;
            }
        }
        Ok(())
    }

    fn translate_exit(
        &mut self,
        ret: Option<Value>,
    ) -> Result<(), SelectError> {
        if let Some(value) = ret {
            let loc = self.location(value)?;
            self.iloc.load_var(RegId(0), &loc, IP);
        }
        self.iloc
            .inst("mov", vec![Operand::Reg(SP), Operand::Reg(FP)]);
        self.iloc
            .inst("pop", vec![Operand::RegList(vec![FP, LR])]);
        self.iloc.inst("bx", vec![Operand::Reg(LR)]);
        Ok(())
    }

    // ===== 控制流 =====

    fn translate_cond_goto(
        &mut self,
        cond: Value,
        true_target: LabelId,
        false_target: LabelId,
    ) -> Result<(), SelectError> {
        let reg = self.operand_reg(cond)?;
        self.iloc
            .inst("cmp", vec![Operand::Reg(reg), Operand::Imm(0)]);
        let t = self.label_name(true_target);
        let f = self.label_name(false_target);
        self.iloc.branch("ne", t);
        self.iloc.jump(f);
        self.regs.free(cond);
        Ok(())
    }

    // ===== 运算 =====

    fn translate_binary(
        &mut self,
        op: IrOp,
        lhs: Value,
        rhs: Option<Value>,
        result: Value,
    ) -> Result<(), SelectError> {
        match (op, rhs) {
            // 一元取负：rsb rd, rn, #0
            (IrOp::Neg, None) => {
                let rl = self.operand_reg(lhs)?;
                let rd = self.result_reg(result)?;
                self.iloc.inst(
                    "rsb",
                    vec![Operand::Reg(rd), Operand::Reg(rl), Operand::Imm(0)],
                );
                self.store_result(rd, result)?;
                self.free_all(&[lhs, result]);
                Ok(())
            }
            // 取模没有直接指令，用 sdiv/mul/sub 合成
            (IrOp::Mod, Some(rhs)) => {
                let rl = self.operand_reg(lhs)?;
                let rr = self.operand_reg(rhs)?;
                let rd = self.result_reg(result)?;
                self.iloc.inst(
                    "sdiv",
                    vec![Operand::Reg(rd), Operand::Reg(rl), Operand::Reg(rr)],
                );
                self.iloc.inst(
                    "mul",
                    vec![Operand::Reg(rd), Operand::Reg(rd), Operand::Reg(rr)],
                );
                self.iloc.inst(
                    "sub",
                    vec![Operand::Reg(rd), Operand::Reg(rl), Operand::Reg(rd)],
                );
                self.store_result(rd, result)?;
                self.free_all(&[lhs, rhs, result]);
                Ok(())
            }
            // 关系运算：cmp 后按条件码置 0/1
            (op, Some(rhs)) if op.is_relational() => {
                let rl = self.operand_reg(lhs)?;
                let rr = self.operand_reg(rhs)?;
                let rd = self.result_reg(result)?;
                self.iloc
                    .inst("cmp", vec![Operand::Reg(rl), Operand::Reg(rr)]);
                self.iloc
                    .inst("mov", vec![Operand::Reg(rd), Operand::Imm(0)]);
                self.iloc.inst(
                    format!("mov{}", cond_code(op)),
                    vec![Operand::Reg(rd), Operand::Imm(1)],
                );
                self.store_result(rd, result)?;
                self.free_all(&[lhs, rhs, result]);
                Ok(())
            }
            (op, Some(rhs)) => {
                let mnemonic = match op {
                    IrOp::Add => "add",
                    IrOp::Sub => "sub",
                    IrOp::Mul => "mul",
                    IrOp::Div => "sdiv",
                    _ => return Err(SelectError::MalformedBinary(op)),
                };
                let rl = self.operand_reg(lhs)?;
                let rr = self.operand_reg(rhs)?;
                let rd = self.result_reg(result)?;
                self.iloc.inst(
                    mnemonic,
                    vec![Operand::Reg(rd), Operand::Reg(rl), Operand::Reg(rr)],
                );
                self.store_result(rd, result)?;
                self.free_all(&[lhs, rhs, result]);
                Ok(())
            }
            (op, None) => Err(SelectError::MalformedBinary(op)),
        }
    }

    // ===== 数据移动 =====

    fn translate_move(
        &mut self,
        dst: Value,
        src: Value,
        kind: MoveKind,
    ) -> Result<(), SelectError> {
        match kind {
            MoveKind::Plain => {
                let rs = self.operand_reg(src)?;
                let loc = self.location(dst)?;
                self.iloc.store_var(rs, &loc, IP)?;
                self.free_all(&[src]);
            }
            MoveKind::PointerLoad => {
                // src 持有元素地址
                let ra = self.operand_reg(src)?;
                let rd = self.result_reg(dst)?;
                self.iloc.inst(
                    "ldr",
                    vec![
                        Operand::Reg(rd),
                        Operand::Mem {
                            base: ra,
                            offset: 0,
                        },
                    ],
                );
                self.store_result(rd, dst)?;
                self.free_all(&[src, dst]);
            }
            MoveKind::PointerStore => {
                // dst 持有元素地址
                let ra = self.operand_reg(dst)?;
                let rs = self.operand_reg(src)?;
                self.iloc.inst(
                    "str",
                    vec![
                        Operand::Reg(rs),
                        Operand::Mem {
                            base: ra,
                            offset: 0,
                        },
                    ],
                );
                self.free_all(&[src, dst]);
            }
        }
        Ok(())
    }

    // ===== 函数调用 =====

    fn translate_call(
        &mut self,
        callee: &str,
        args: &[Value],
        result: Option<Value>,
    ) -> Result<(), SelectError> {
        // 实参依次装入 r0-r3，多出的写进帧底的外传区
        for (i, arg) in args.iter().enumerate() {
            let loc = self.location(*arg)?;
            if i < ARG_REG_COUNT {
                self.iloc.load_var(RegId(i as u8), &loc, IP);
            } else {
                self.iloc.load_var(SCRATCH_REGS[0], &loc, IP);
                let offset = ((i - ARG_REG_COUNT) as i32) * WORD_SIZE;
                self.iloc.inst(
                    "str",
                    vec![
                        Operand::Reg(SCRATCH_REGS[0]),
                        Operand::Mem { base: SP, offset },
                    ],
                );
            }
        }
        self.iloc
            .inst("bl", vec![Operand::Label(callee.to_string())]);
        if let Some(value) = result {
            let loc = self.location(value)?;
            self.iloc.store_var(RegId(0), &loc, IP)?;
        }
        Ok(())
    }

    // ===== 操作数定位 =====

    /// 解析操作数的存储位置：常量按立即数、全局按符号、
    /// 其余查栈布局，数组取槽地址而非槽内容
    fn location(
        &self,
        value: Value,
    ) -> Result<Loc, SelectError> {
        match value {
            Value::ConstInt(v) => Ok(Loc::Imm(v)),
            Value::Global(index) => {
                let info = self
                    .module
                    .global_info(index)
                    .ok_or(SelectError::MissingLocation(value))?;
                if info.ty.is_array() {
                    Ok(Loc::GlobalAddr(info.name.clone()))
                } else {
                    Ok(Loc::Global(info.name.clone()))
                }
            }
            _ => {
                let offset = self
                    .layout
                    .offset_of(value)
                    .ok_or(SelectError::MissingLocation(value))?;
                let is_array = self
                    .func
                    .value_type(value)
                    .map(|ty| ty.is_array())
                    .unwrap_or(false);
                if is_array {
                    Ok(Loc::StackAddr(offset))
                } else {
                    Ok(Loc::Stack(offset))
                }
            }
        }
    }

    /// 源操作数进寄存器：未绑定则分配并从其位置装入
    fn operand_reg(
        &mut self,
        value: Value,
    ) -> Result<RegId, SelectError> {
        if let Some(reg) = self.regs.reg_of(value) {
            return Ok(reg);
        }
        let loc = self.location(value)?;
        let reg = self
            .regs
            .allocate(value)
            .ok_or(SelectError::OutOfRegisters)?;
        self.iloc.load_var(reg, &loc, IP);
        Ok(reg)
    }

    /// 结果操作数只分配寄存器，不装入旧值
    fn result_reg(
        &mut self,
        value: Value,
    ) -> Result<RegId, SelectError> {
        self.regs
            .allocate(value)
            .ok_or(SelectError::OutOfRegisters)
    }

    fn store_result(
        &mut self,
        reg: RegId,
        value: Value,
    ) -> Result<(), SelectError> {
        let loc = self.location(value)?;
        self.iloc.store_var(reg, &loc, IP)?;
        Ok(())
    }

    fn free_all(
        &mut self,
        values: &[Value],
    ) {
        for value in values {
            self.regs.free(*value);
        }
    }

    /// 标签名带函数名前缀，避免跨函数冲突
    fn label_name(
        &self,
        label: LabelId,
    ) -> String {
        format!(".L{}_{}", self.func.name, label.0)
    }
}

/// 关系运算对应的 ARM 条件码
fn cond_code(op: IrOp) -> &'static str {
    match op {
        IrOp::Lt => "lt",
        IrOp::Gt => "gt",
        IrOp::Le => "le",
        IrOp::Ge => "ge",
        IrOp::Eq => "eq",
        IrOp::Ne => "ne",
        _ => unreachable!("非关系运算"),
    }
}

/// 依次选择模块中每个函数的指令
pub fn select_module(module: &Module) -> Result<Vec<(String, Iloc)>, SelectError> {
    let mut output = Vec::new();
    for func in module.functions() {
        let iloc = InstSelector::new(func, module).run()?;
        output.push((func.name.clone(), iloc));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::types::Type;

    fn render(iloc: &Iloc) -> Vec<String> {
        iloc.insts().iter().map(|i| i.to_string()).collect()
    }

    fn lone_function(f: Function) -> (Module, String) {
        let name = f.name.clone();
        let mut module = Module::new();
        module.add_function(f);
        (module, name)
    }

    #[test]
    fn test_prologue_and_epilogue() {
        let mut f = Function::new("f", Type::Void);
        f.code.add_inst(Instruction::Entry);
        f.code.add_inst(Instruction::Exit { ret: None });
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let iloc = InstSelector::new(func, &module).run().unwrap();
        let lines = render(&iloc);
        assert_eq!(lines[0], "    push {fp, lr}");
        assert_eq!(lines[1], "    mov fp, sp");
        assert_eq!(lines[2], "    mov sp, fp");
        assert_eq!(lines[3], "    pop {fp, lr}");
        assert_eq!(lines[4], "    bx lr");
    }

    #[test]
    fn test_mod_synthesized_from_sdiv_mul_sub() {
        let mut f = Function::new("f", Type::Int32);
        let t = f.new_temp(Type::Int32);
        f.code.add_inst(Instruction::Binary {
            op: IrOp::Mod,
            lhs: Value::ConstInt(7),
            rhs: Some(Value::ConstInt(3)),
            result: t,
        });
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let iloc = InstSelector::new(func, &module).run().unwrap();
        let lines = render(&iloc);
        assert_eq!(lines[0], "    mov r8, #7");
        assert_eq!(lines[1], "    mov r9, #3");
        assert_eq!(lines[2], "    sdiv r10, r8, r9");
        assert_eq!(lines[3], "    mul r10, r10, r9");
        assert_eq!(lines[4], "    sub r10, r8, r10");
        assert_eq!(lines[5], "    str r10, [fp, #-4]");
    }

    #[test]
    fn test_relational_uses_conditional_mov() {
        let mut f = Function::new("f", Type::Int32);
        let t = f.new_temp(Type::Bool);
        f.code.add_inst(Instruction::Binary {
            op: IrOp::Lt,
            lhs: Value::ConstInt(1),
            rhs: Some(Value::ConstInt(2)),
            result: t,
        });
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let iloc = InstSelector::new(func, &module).run().unwrap();
        let lines = render(&iloc);
        assert_eq!(lines[2], "    cmp r8, r9");
        assert_eq!(lines[3], "    mov r10, #0");
        assert_eq!(lines[4], "    movlt r10, #1");
    }

    #[test]
    fn test_cond_goto_compares_against_zero() {
        let mut f = Function::new("f", Type::Void);
        let t = f.new_temp(Type::Bool);
        f.code.add_inst(Instruction::CondGoto {
            cond: t,
            true_target: LabelId(0),
            false_target: LabelId(1),
        });
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let iloc = InstSelector::new(func, &module).run().unwrap();
        let lines = render(&iloc);
        assert_eq!(lines[0], "    ldr r8, [fp, #-4]");
        assert_eq!(lines[1], "    cmp r8, #0");
        assert_eq!(lines[2], "    bne .Lf_0");
        assert_eq!(lines[3], "    b .Lf_1");
    }

    #[test]
    fn test_call_marshals_stack_args() {
        let mut f = Function::new("f", Type::Void);
        f.note_call_args(5);
        f.code.add_inst(Instruction::Call {
            callee: "g".to_string(),
            args: vec![
                Value::ConstInt(0),
                Value::ConstInt(1),
                Value::ConstInt(2),
                Value::ConstInt(3),
                Value::ConstInt(4),
            ],
            result: None,
        });
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let iloc = InstSelector::new(func, &module).run().unwrap();
        let lines = render(&iloc);
        assert_eq!(lines[0], "    mov r0, #0");
        assert_eq!(lines[3], "    mov r3, #3");
        assert_eq!(lines[4], "    mov r8, #4");
        assert_eq!(lines[5], "    str r8, [sp]");
        assert_eq!(lines[6], "    bl g");
    }

    #[test]
    fn test_stack_param_homing() {
        let mut f = Function::new("f", Type::Void);
        for i in 0..5 {
            f.add_param(format!("p{}", i), Type::Int32);
        }
        f.code.add_inst(Instruction::Entry);
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let iloc = InstSelector::new(func, &module).run().unwrap();
        let lines = render(&iloc);
        // 前四个形参来自 r0-r3
        assert!(lines.contains(&"    str r0, [fp, #-4]".to_string()));
        assert!(lines.contains(&"    str r3, [fp, #-16]".to_string()));
        // 第五个经调用方栈传入
        assert!(lines.contains(&"    ldr r8, [fp, #8]".to_string()));
        assert!(lines.contains(&"    str r8, [fp, #-20]".to_string()));
    }

    #[test]
    fn test_local_array_base_is_frame_address() {
        let mut f = Function::new("f", Type::Void);
        let a = f.new_local("a", Type::array_of(Type::Int32, vec![4]));
        let t = f.new_temp(Type::pointer_to(Type::Int32));
        f.code.add_inst(Instruction::Binary {
            op: IrOp::Add,
            lhs: a,
            rhs: Some(Value::ConstInt(8)),
            result: t,
        });
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let iloc = InstSelector::new(func, &module).run().unwrap();
        let lines = render(&iloc);
        assert_eq!(lines[0], "    sub r8, fp, #16");
    }

    #[test]
    fn test_binary_without_rhs_is_an_error() {
        let mut f = Function::new("f", Type::Int32);
        let t = f.new_temp(Type::Int32);
        f.code.add_inst(Instruction::Binary {
            op: IrOp::Mod,
            lhs: Value::ConstInt(7),
            rhs: None,
            result: t,
        });
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let err = InstSelector::new(func, &module).run().unwrap_err();
        assert_eq!(err, SelectError::MalformedBinary(IrOp::Mod));
    }

    #[test]
    fn test_unknown_binary_op_is_an_error() {
        let mut f = Function::new("f", Type::Int32);
        let t = f.new_temp(Type::Int32);
        f.code.add_inst(Instruction::Binary {
            op: IrOp::Neg,
            lhs: Value::ConstInt(1),
            rhs: Some(Value::ConstInt(2)),
            result: t,
        });
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let err = InstSelector::new(func, &module).run().unwrap_err();
        assert_eq!(err, SelectError::MalformedBinary(IrOp::Neg));
    }

    #[test]
    fn test_move_into_array_base_is_an_error() {
        let mut f = Function::new("f", Type::Void);
        let a = f.new_local("a", Type::array_of(Type::Int32, vec![4]));
        f.code.add_inst(Instruction::Move {
            dst: a,
            src: Value::ConstInt(1),
            kind: MoveKind::Plain,
        });
        let (module, name) = lone_function(f);
        let func = module.function(&name).unwrap();
        let err = InstSelector::new(func, &module).run().unwrap_err();
        assert_eq!(
            err,
            SelectError::BadStoreTarget(BadStoreTarget(Loc::StackAddr(-16)))
        );
    }
}
