//! AST 到线性 IR 的下降
//!
//! 程序级下降分三遍进行，以支持函数间的前向引用：
//! 1. 处理全局变量声明；
//! 2. 注册所有函数原型，数组形参退化为 `i32*` 并把声明维度记入维度表；
//! 3. 逐个下降函数体。
//!
//! 按节点种类穷尽匹配分发。每个下降方法返回 `Lowered`：
//! 计算该节点所需的指令序列、可选的结果操作数、以及数组访问
//! 作为赋值目标时的元素地址。首个错误即中止整个编译单元。

mod array;
mod call;
mod expr;
mod stmt;


use thiserror::Error;
use tracing::debug;

use crate::frontend::ast::{Ast, AstKind, NodeId};
use crate::middle::function::Function;
use crate::middle::instruction::{Instruction, LabelId, MoveKind};
use crate::middle::intercode::InterCode;
use crate::middle::module::Module;
use crate::middle::types::Type;
use crate::middle::value::Value;

/// 下降错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LowerError {
    /// 变量未定义
    #[error("变量({0})未定义")]
    UndefinedVariable(String),
    /// 函数未定义
    #[error("函数({0})未定义或声明")]
    UndefinedFunction(String),
    /// 调用实参个数与形参个数不一致
    #[error("函数({name})参数数量不匹配，需要{expected}个但提供了{found}个")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// 数组维度不是正的编译期常量
    #[error("数组({0})的维度必须是正的编译期整数常量")]
    NonConstantDimension(String),
    /// AST 节点缺少结构上必需的孩子或位置非法
    #[error("AST节点结构非法: {0}")]
    MalformedNode(&'static str),
    #[error("break语句不在循环内")]
    BreakOutsideLoop,
    #[error("continue语句不在循环内")]
    ContinueOutsideLoop,
    /// 多维下标访问的数组形参没有登记维度信息
    #[error("函数({func})的数组形参#{index}缺少维度信息")]
    MissingParamDims { func: String, index: usize },
    #[error("不支持嵌套函数定义")]
    NestedFunction,
    #[error("不支持的语法构造: {0}")]
    Unsupported(&'static str),
}

/// 单个节点的下降结果
#[derive(Debug, Default)]
pub struct Lowered {
    /// 计算所需的指令序列
    pub code: InterCode,
    /// 结果操作数，语句为 None
    pub value: Option<Value>,
    /// 数组访问的元素地址，供赋值目标使用
    pub array_ptr: Option<Value>,
}

impl Lowered {
    /// 纯语句结果
    pub fn stmt(code: InterCode) -> Self {
        Lowered {
            code,
            value: None,
            array_ptr: None,
        }
    }

    /// 表达式结果
    pub fn expr(
        code: InterCode,
        value: Value,
    ) -> Self {
        Lowered {
            code,
            value: Some(value),
            array_ptr: None,
        }
    }
}

/// 循环标签对，break 跳出口，continue 跳条件
#[derive(Debug, Clone, Copy)]
pub struct LoopLabels {
    pub break_target: LabelId,
    pub continue_target: LabelId,
}

/// 下降上下文：正在构造的函数与循环标签栈
///
/// 标签栈显式传递，嵌套循环的 break/continue 解析到最内层循环。
#[derive(Debug)]
pub struct LowerCtx {
    pub func: Function,
    pub loops: Vec<LoopLabels>,
}

impl LowerCtx {
    pub fn new(func: Function) -> Self {
        LowerCtx {
            func,
            loops: Vec::new(),
        }
    }
}

/// AST 到 IR 的生成器
#[derive(Debug)]
pub struct Generator<'a> {
    ast: &'a Ast,
    module: Module,
}

/// 下降整棵 AST，返回生成的模块
pub fn lower(ast: &Ast) -> Result<Module, LowerError> {
    let mut generator = Generator::new(ast);
    generator.lower_unit()?;
    Ok(generator.into_module())
}

impl<'a> Generator<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        Generator {
            ast,
            module: Module::new(),
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    // ===== 程序级下降 =====

    /// 编译单元下降，三遍
    pub fn lower_unit(&mut self) -> Result<(), LowerError> {
        let ast = self.ast;
        let root = ast
            .root()
            .ok_or(LowerError::MalformedNode("缺少编译单元根节点"))?;

        // 第一遍：全局变量声明
        for item in ast.children(root) {
            match ast.kind(*item) {
                AstKind::VarDecl | AstKind::ArrayDef => {
                    self.lower_global_decl(*item)?;
                }
                _ => {}
            }
        }
        debug!("全局变量处理完成，共{}个", self.module.globals().len());

        // 第二遍：注册函数原型与数组形参维度
        for item in ast.children(root) {
            if ast.kind(*item) == AstKind::FuncDef {
                self.register_prototype(*item)?;
            }
        }

        // 第三遍：下降函数体
        for item in ast.children(root) {
            if ast.kind(*item) == AstKind::FuncDef {
                self.lower_function(*item)?;
            }
        }

        Ok(())
    }

    /// 全局变量声明（第一遍）
    fn lower_global_decl(
        &mut self,
        id: NodeId,
    ) -> Result<(), LowerError> {
        let ast = self.ast;
        let name = ast
            .name(id)
            .ok_or(LowerError::MalformedNode("全局变量缺少名字"))?
            .to_string();
        match ast.kind(id) {
            AstKind::VarDecl => {
                let value = self.module.new_global(&name, Type::Int32);
                if let Some(init) = ast.children(id).first() {
                    // 全局标量初值必须是字面量，在 main 入口回放
                    let literal = self
                        .const_eval(*init)
                        .ok_or(LowerError::Unsupported("全局变量初值必须是编译期常量"))?;
                    self.module.record_global_init(value, literal);
                }
            }
            AstKind::ArrayDef => {
                let dims = self.eval_dimensions(id, &name)?;
                self.module
                    .new_global(&name, Type::array_of(Type::Int32, dims));
            }
            _ => return Err(LowerError::MalformedNode("非法的全局声明节点")),
        }
        Ok(())
    }

    /// 注册函数原型（第二遍）
    fn register_prototype(
        &mut self,
        id: NodeId,
    ) -> Result<(), LowerError> {
        let ast = self.ast;
        let name = ast
            .name(id)
            .ok_or(LowerError::MalformedNode("函数定义缺少名字"))?
            .to_string();
        let return_type = ast
            .node(id)
            .ty
            .clone()
            .ok_or(LowerError::MalformedNode("函数定义缺少返回类型"))?;

        let children = ast.children(id);
        if children.is_empty() {
            return Err(LowerError::MalformedNode("函数定义缺少函数体"));
        }
        let param_nodes = &children[..children.len() - 1];

        let mut func = Function::new(&name, return_type);
        for (idx, pnode) in param_nodes.iter().enumerate() {
            let pname = ast
                .name(*pnode)
                .ok_or(LowerError::MalformedNode("形参缺少名字"))?;
            match ast.kind(*pnode) {
                AstKind::FormalParam => {
                    func.add_param(pname, Type::Int32);
                }
                AstKind::FormalParamArray => {
                    // 数组形参统一注册为 i32*，声明维度记入维度表。
                    // 尾维未声明（int a[] 形式）不入表，单下标按步长 1
                    // 取址，多下标访问由下降阶段诊断
                    func.add_param(pname, Type::pointer_to(Type::Int32));
                    let dims: Vec<i32> = ast
                        .children(*pnode)
                        .iter()
                        .filter_map(|d| ast.node(*d).int_val)
                        .collect();
                    if !dims.is_empty() {
                        self.module.set_param_dims(&name, idx, dims);
                    }
                }
                _ => return Err(LowerError::MalformedNode("形参节点种类非法")),
            }
        }
        debug!("注册函数原型: {}，参数数量: {}", name, func.arity());
        self.module.add_function(func);
        Ok(())
    }

    /// 函数体下降（第三遍）
    fn lower_function(
        &mut self,
        id: NodeId,
    ) -> Result<(), LowerError> {
        let ast = self.ast;
        let name = ast
            .name(id)
            .ok_or(LowerError::MalformedNode("函数定义缺少名字"))?
            .to_string();
        let proto = self
            .module
            .function(&name)
            .cloned()
            .ok_or_else(|| LowerError::UndefinedFunction(name.clone()))?;
        let mut ctx = LowerCtx::new(proto);

        let mut code = InterCode::new();
        code.add_inst(Instruction::Entry);

        // main 函数入口回放全局标量初值
        if name == "main" {
            for (global, init) in self.module.global_inits().to_vec() {
                code.add_inst(Instruction::Move {
                    dst: global,
                    src: Value::ConstInt(init),
                    kind: MoveKind::Plain,
                });
            }
        }

        let exit_label = ctx.func.new_label();
        ctx.func.exit_label = Some(exit_label);

        // 形参具体化：标量拷入局部变量，数组形参直接按指针登记
        self.module.enter_scope();
        let children = ast.children(id);
        let param_nodes = &children[..children.len() - 1];
        let body = children[children.len() - 1];
        for (idx, pnode) in param_nodes.iter().enumerate() {
            let pname = ast
                .name(*pnode)
                .ok_or(LowerError::MalformedNode("形参缺少名字"))?
                .to_string();
            match ast.kind(*pnode) {
                AstKind::FormalParam => {
                    let local = ctx.func.new_local(&pname, Type::Int32);
                    code.add_inst(Instruction::Move {
                        dst: local,
                        src: Value::Param(idx as u32),
                        kind: MoveKind::Plain,
                    });
                    self.module.declare(pname, local);
                }
                AstKind::FormalParamArray => {
                    self.module.declare(pname, Value::Param(idx as u32));
                }
                _ => return Err(LowerError::MalformedNode("形参节点种类非法")),
            }
        }

        if ctx.func.return_type != Type::Void {
            let slot = ctx.func.new_local("retval", Type::Int32);
            ctx.func.return_slot = Some(slot);
        }

        // 函数体块复用形参作用域
        let result = self.lower_block(&mut ctx, body, false);
        self.module.leave_scope();
        let mut body_code = result?;
        code.add_code(&mut body_code);

        code.add_inst(Instruction::Label(exit_label));
        code.add_inst(Instruction::Exit {
            ret: ctx.func.return_slot,
        });

        debug!("函数 {} 下降完成，共{}条指令", name, code.len());
        ctx.func.code = code;
        self.module.add_function(ctx.func);
        Ok(())
    }

    // ===== 分发 =====

    /// 语句位置的分发
    pub(crate) fn lower_stmt(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<InterCode, LowerError> {
        let kind = self.ast.kind(id);
        match kind {
            AstKind::Block => self.lower_block(ctx, id, true),
            AstKind::EmptyStmt => Ok(InterCode::new()),
            AstKind::VarDecl => self.lower_local_decl(ctx, id),
            AstKind::ArrayDef => self.lower_local_array(ctx, id),
            AstKind::Assign => self.lower_assign(ctx, id),
            AstKind::Return => self.lower_return(ctx, id),
            AstKind::If => self.lower_if(ctx, id),
            AstKind::IfElse => self.lower_if_else(ctx, id),
            AstKind::While => self.lower_while(ctx, id),
            AstKind::Break => self.lower_break(ctx),
            AstKind::Continue => self.lower_continue(ctx),
            AstKind::FuncDef => Err(LowerError::NestedFunction),
            AstKind::CompileUnit
            | AstKind::FormalParam
            | AstKind::FormalParamArray => {
                Err(LowerError::MalformedNode("结构节点出现在语句位置"))
            }
            // 表达式语句：求值后丢弃结果
            _ => self.lower_expr(ctx, id).map(|lowered| lowered.code),
        }
    }

    /// 表达式位置的分发
    pub(crate) fn lower_expr(
        &mut self,
        ctx: &mut LowerCtx,
        id: NodeId,
    ) -> Result<Lowered, LowerError> {
        let kind = self.ast.kind(id);
        match kind {
            AstKind::LeafInt => self.lower_leaf_int(id),
            AstKind::LeafVar => self.lower_leaf_var(id),
            AstKind::Add
            | AstKind::Sub
            | AstKind::Mul
            | AstKind::Div
            | AstKind::Mod => self.lower_arith(ctx, id),
            AstKind::Neg => self.lower_neg(ctx, id),
            AstKind::Lt
            | AstKind::Gt
            | AstKind::Le
            | AstKind::Ge
            | AstKind::Eq
            | AstKind::Ne => self.lower_relational(ctx, id),
            AstKind::LogicAnd => self.lower_logic_and(ctx, id),
            AstKind::LogicOr => self.lower_logic_or(ctx, id),
            AstKind::LogicNot => self.lower_logic_not(ctx, id),
            AstKind::ArrayAccess => self.lower_array_access(ctx, id),
            AstKind::FuncCall => self.lower_call(ctx, id),
            _ => Err(LowerError::MalformedNode("语句节点出现在表达式位置")),
        }
    }

    // ===== 公共辅助 =====

    /// 子表达式必须产生值，void 调用用于运算是结构错误
    pub(crate) fn expect_value(
        lowered: &Lowered,
    ) -> Result<Value, LowerError> {
        lowered
            .value
            .ok_or(LowerError::MalformedNode("子表达式未产生值"))
    }

    /// 查询操作数的类型
    pub(crate) fn value_ty(
        &self,
        ctx: &LowerCtx,
        value: Value,
    ) -> Type {
        match value {
            Value::ConstInt(_) => Type::Int32,
            Value::Global(i) => self
                .module
                .global_info(i)
                .map(|g| g.ty.clone())
                .unwrap_or(Type::Int32),
            _ => ctx
                .func
                .value_type(value)
                .cloned()
                .unwrap_or(Type::Int32),
        }
    }

    /// 整数到布尔的转换：已是布尔原样使用，否则合成 `ne 0` 比较
    pub(crate) fn int_to_bool(
        &mut self,
        ctx: &mut LowerCtx,
        code: &mut InterCode,
        value: Value,
    ) -> Value {
        if self.value_ty(ctx, value) == Type::Bool {
            return value;
        }
        let result = ctx.func.new_temp(Type::Bool);
        code.add_inst(Instruction::Binary {
            op: crate::middle::instruction::IrOp::Ne,
            lhs: value,
            rhs: Some(Value::ConstInt(0)),
            result,
        });
        result
    }

    /// 编译期常量折叠，非常量返回 None
    pub(crate) fn const_eval(
        &self,
        id: NodeId,
    ) -> Option<i32> {
        let ast = self.ast;
        let node = ast.node(id);
        match node.kind {
            AstKind::LeafInt => node.int_val,
            AstKind::Neg => {
                let v = self.const_eval(*node.children.first()?)?;
                Some(v.wrapping_neg())
            }
            AstKind::Add | AstKind::Sub | AstKind::Mul | AstKind::Div | AstKind::Mod => {
                let lhs = self.const_eval(*node.children.first()?)?;
                let rhs = self.const_eval(*node.children.get(1)?)?;
                match node.kind {
                    AstKind::Add => Some(lhs.wrapping_add(rhs)),
                    AstKind::Sub => Some(lhs.wrapping_sub(rhs)),
                    AstKind::Mul => Some(lhs.wrapping_mul(rhs)),
                    AstKind::Div if rhs != 0 => Some(lhs.wrapping_div(rhs)),
                    AstKind::Mod if rhs != 0 => Some(lhs.wrapping_rem(rhs)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// 求值数组定义的各维大小，要求正的编译期常量
    pub(crate) fn eval_dimensions(
        &self,
        id: NodeId,
        name: &str,
    ) -> Result<Vec<i32>, LowerError> {
        let ast = self.ast;
        let mut dims = Vec::new();
        for dim in ast.children(id) {
            match self.const_eval(*dim) {
                Some(v) if v > 0 => dims.push(v),
                _ => return Err(LowerError::NonConstantDimension(name.to_string())),
            }
        }
        if dims.is_empty() {
            return Err(LowerError::NonConstantDimension(name.to_string()));
        }
        Ok(dims)
    }

    /// 取出节点的名字载荷
    pub(crate) fn node_name(
        &self,
        id: NodeId,
    ) -> Result<String, LowerError> {
        self.ast
            .name(id)
            .map(|s| s.to_string())
            .ok_or(LowerError::MalformedNode("节点缺少名字载荷"))
    }
}
