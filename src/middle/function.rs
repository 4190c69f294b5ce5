//! IR 函数
//!
//! 持有形参、局部与临时变量表、标签计数器与函数体 IR。
//! break/continue 的目标标签不在这里：循环标签栈由生成器的
//! 下降上下文显式传递。

use crate::middle::instruction::LabelId;
use crate::middle::intercode::InterCode;
use crate::middle::types::Type;
use crate::middle::value::{Value, VarInfo};

/// IR 函数
#[derive(Debug, Clone)]
pub struct Function {
    /// 函数名
    pub name: String,
    /// 返回类型
    pub return_type: Type,
    /// 形参表，顺序即声明顺序
    params: Vec<VarInfo>,
    /// 局部变量表
    locals: Vec<VarInfo>,
    /// 临时变量表
    temps: Vec<VarInfo>,
    /// 标签计数器
    next_label: u32,
    /// 出口标签，return 语句跳转至此
    pub exit_label: Option<LabelId>,
    /// 返回值槽，void 函数为 None
    pub return_slot: Option<Value>,
    /// 本函数发出的调用中最大实参个数，后端据此留出实参传递区
    pub max_call_args: usize,
    /// 函数体
    pub code: InterCode,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        return_type: Type,
    ) -> Self {
        Function {
            name: name.into(),
            return_type,
            params: Vec::new(),
            locals: Vec::new(),
            temps: Vec::new(),
            next_label: 0,
            exit_label: None,
            return_slot: None,
            max_call_args: 0,
            code: InterCode::new(),
        }
    }

    /// 登记一个形参，返回其 Value
    pub fn add_param(
        &mut self,
        name: impl Into<String>,
        ty: Type,
    ) -> Value {
        let idx = self.params.len() as u32;
        self.params.push(VarInfo::new(name, ty));
        Value::Param(idx)
    }

    /// 登记一个局部变量，返回其 Value
    pub fn new_local(
        &mut self,
        name: impl Into<String>,
        ty: Type,
    ) -> Value {
        let idx = self.locals.len() as u32;
        self.locals.push(VarInfo::new(name, ty));
        Value::Local(idx)
    }

    /// 新建一个临时变量，返回其 Value
    pub fn new_temp(
        &mut self,
        ty: Type,
    ) -> Value {
        let idx = self.temps.len() as u32;
        self.temps.push(VarInfo::new(format!("t{}", idx), ty));
        Value::Temp(idx)
    }

    /// 分配一个新标签
    pub fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    /// 记录一次调用的实参个数
    pub fn note_call_args(
        &mut self,
        count: usize,
    ) {
        if count > self.max_call_args {
            self.max_call_args = count;
        }
    }

    pub fn params(&self) -> &[VarInfo] {
        &self.params
    }

    pub fn locals(&self) -> &[VarInfo] {
        &self.locals
    }

    pub fn temps(&self) -> &[VarInfo] {
        &self.temps
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// 查询操作数在本函数内的类型，Global 与 ConstInt 不在此处
    pub fn value_type(
        &self,
        value: Value,
    ) -> Option<&Type> {
        match value {
            Value::Param(i) => self.params.get(i as usize).map(|v| &v.ty),
            Value::Local(i) => self.locals.get(i as usize).map(|v| &v.ty),
            Value::Temp(i) => self.temps.get(i as usize).map(|v| &v.ty),
            Value::ConstInt(_) | Value::Global(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_counter() {
        let mut f = Function::new("f", Type::Int32);
        assert_eq!(f.new_label(), LabelId(0));
        assert_eq!(f.new_label(), LabelId(1));
    }

    #[test]
    fn test_var_arenas() {
        let mut f = Function::new("f", Type::Int32);
        let p = f.add_param("a", Type::Int32);
        let l = f.new_local("x", Type::Int32);
        let t = f.new_temp(Type::Bool);
        assert_eq!(p, Value::Param(0));
        assert_eq!(l, Value::Local(0));
        assert_eq!(t, Value::Temp(0));
        assert_eq!(f.value_type(t), Some(&Type::Bool));
        assert_eq!(f.value_type(Value::ConstInt(1)), None);
        assert_eq!(f.arity(), 1);
    }

    #[test]
    fn test_max_call_args_tracks_maximum() {
        let mut f = Function::new("f", Type::Void);
        f.note_call_args(2);
        f.note_call_args(6);
        f.note_call_args(3);
        assert_eq!(f.max_call_args, 6);
    }
}
