//! IR 模块与符号表
//!
//! 模块持有全局变量表、函数表、数组形参维度表与全局标量初值记录；
//! 同时充当下降期间的作用域管理器，按块嵌套维护名字到 Value 的映射，
//! 查找自内向外。

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::middle::function::Function;
use crate::middle::types::Type;
use crate::middle::value::{Value, VarInfo};

/// IR 模块
#[derive(Debug, Default)]
pub struct Module {
    /// 全局变量表
    globals: Vec<VarInfo>,
    /// 函数表，迭代顺序即声明顺序
    functions: IndexMap<String, Function>,
    /// 作用域栈，每层为名字到操作数的映射
    scopes: Vec<HashMap<String, Value>>,
    /// 数组形参维度表：(函数名, 形参序号) -> 退化首维之后的各维大小
    param_dims: HashMap<(String, usize), Vec<i32>>,
    /// 全局标量变量的字面量初值，按声明顺序在 main 入口回放
    global_inits: Vec<(Value, i32)>,
}

impl Module {
    pub fn new() -> Self {
        Module {
            globals: Vec::new(),
            functions: IndexMap::new(),
            scopes: vec![HashMap::new()],
            param_dims: HashMap::new(),
            global_inits: Vec::new(),
        }
    }

    // ===== 全局变量 =====

    /// 登记一个全局变量并在最外层作用域可见，返回其 Value
    pub fn new_global(
        &mut self,
        name: impl Into<String>,
        ty: Type,
    ) -> Value {
        let name = name.into();
        let idx = self.globals.len() as u32;
        self.globals.push(VarInfo::new(name.clone(), ty));
        let value = Value::Global(idx);
        self.scopes[0].insert(name, value);
        value
    }

    pub fn globals(&self) -> &[VarInfo] {
        &self.globals
    }

    pub fn global_info(
        &self,
        index: u32,
    ) -> Option<&VarInfo> {
        self.globals.get(index as usize)
    }

    /// 记录一个全局标量的字面量初值
    pub fn record_global_init(
        &mut self,
        value: Value,
        init: i32,
    ) {
        self.global_inits.push((value, init));
    }

    pub fn global_inits(&self) -> &[(Value, i32)] {
        &self.global_inits
    }

    // ===== 作用域 =====

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn leave_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// 在当前作用域声明一个名字
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        value: Value,
    ) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// 自内向外查找名字
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Some(*value);
            }
        }
        None
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    // ===== 函数表 =====

    pub fn add_function(
        &mut self,
        func: Function,
    ) {
        self.functions.insert(func.name.clone(), func);
    }

    pub fn function(
        &self,
        name: &str,
    ) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn take_functions(&mut self) -> IndexMap<String, Function> {
        std::mem::take(&mut self.functions)
    }

    // ===== 数组形参维度表 =====

    /// 记录数组形参退化后剩余的维度
    pub fn set_param_dims(
        &mut self,
        func: impl Into<String>,
        param_index: usize,
        dims: Vec<i32>,
    ) {
        self.param_dims.insert((func.into(), param_index), dims);
    }

    pub fn param_dims(
        &self,
        func: &str,
        param_index: usize,
    ) -> Option<&[i32]> {
        self.param_dims
            .get(&(func.to_string(), param_index))
            .map(|v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_shadowing() {
        let mut m = Module::new();
        let g = m.new_global("x", Type::Int32);
        assert_eq!(m.lookup("x"), Some(g));
        m.enter_scope();
        m.declare("x", Value::Local(0));
        assert_eq!(m.lookup("x"), Some(Value::Local(0)));
        m.leave_scope();
        assert_eq!(m.lookup("x"), Some(g));
    }

    #[test]
    fn test_outermost_scope_not_popped() {
        let mut m = Module::new();
        m.leave_scope();
        assert_eq!(m.scope_depth(), 1);
    }

    #[test]
    fn test_param_dims_roundtrip() {
        let mut m = Module::new();
        m.set_param_dims("f", 1, vec![3, 4]);
        assert_eq!(m.param_dims("f", 1), Some(&[3, 4][..]));
        assert_eq!(m.param_dims("f", 0), None);
        assert_eq!(m.param_dims("g", 1), None);
    }

    #[test]
    fn test_function_table_declaration_order() {
        let mut m = Module::new();
        m.add_function(Function::new("b", Type::Void));
        m.add_function(Function::new("a", Type::Void));
        let names: Vec<_> = m.functions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
