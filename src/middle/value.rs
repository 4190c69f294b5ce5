//! IR 操作数
//!
//! `Value` 是轻量的 Copy 枚举：常量按值即身份，其余按索引指向
//! 模块级（全局变量）或函数级（形参、局部、临时）的变量表。
//! 寄存器绑定等后端状态保存在后端侧表中，Value 创建后不可变。

use std::fmt;

use crate::middle::types::Type;

/// IR 操作数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// 整数常量，数值本身即身份
    ConstInt(i32),
    /// 全局变量，索引指向模块的全局变量表
    Global(u32),
    /// 函数形参，索引指向函数的形参表
    Param(u32),
    /// 局部变量，索引指向函数的局部变量表
    Local(u32),
    /// 临时变量（指令结果），索引指向函数的临时变量表
    Temp(u32),
}

impl Value {
    /// 是否为整数常量
    pub fn is_const(&self) -> bool {
        matches!(self, Value::ConstInt(_))
    }

    /// 常量取值，非常量返回 None
    pub fn as_const(&self) -> Option<i32> {
        match self {
            Value::ConstInt(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::ConstInt(v) => write!(f, "{}", v),
            Value::Global(i) => write!(f, "@g{}", i),
            Value::Param(i) => write!(f, "%p{}", i),
            Value::Local(i) => write!(f, "%l{}", i),
            Value::Temp(i) => write!(f, "%t{}", i),
        }
    }
}

/// 变量表条目：名字与类型元数据
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    pub ty: Type,
}

impl VarInfo {
    pub fn new(
        name: impl Into<String>,
        ty: Type,
    ) -> Self {
        VarInfo {
            name: name.into(),
            ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_identity() {
        assert_eq!(Value::ConstInt(7), Value::ConstInt(7));
        assert_ne!(Value::ConstInt(7), Value::ConstInt(8));
        assert_eq!(Value::ConstInt(7).as_const(), Some(7));
        assert_eq!(Value::Temp(0).as_const(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::ConstInt(-1).to_string(), "-1");
        assert_eq!(Value::Temp(3).to_string(), "%t3");
        assert_eq!(Value::Global(0).to_string(), "@g0");
    }
}
