//! 抽象语法树
//!
//! 节点存放在一块 `Vec` 竞技场中，节点间以 `NodeId` 相互引用。
//! 构造统一经过 `AstBuilder`：子节点编号与节点形状在构造时校验，
//! 因此下降阶段不会再遇到悬空引用或位置非法的叶子。

use smallvec::SmallVec;
use thiserror::Error;

use crate::middle::types::Type;

/// AST 节点编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// AST 节点种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstKind {
    // ===== 结构 =====
    /// 编译单元，子节点为全局变量声明与函数定义
    CompileUnit,
    /// 函数定义，子节点为形参序列加最后一个 Block
    FuncDef,
    /// 标量形参
    FormalParam,
    /// 数组形参，子节点为退化首维之后的各维大小（整数叶子）
    FormalParamArray,
    /// 语句块
    Block,

    // ===== 语句 =====
    /// 空语句
    EmptyStmt,
    /// 标量变量声明，可带一个初值表达式子节点
    VarDecl,
    /// 数组定义，子节点为各维大小表达式
    ArrayDef,
    /// 赋值语句，子节点为左值与右值
    Assign,
    /// return 语句，至多一个表达式子节点
    Return,
    /// if 语句，子节点为条件与 then 块
    If,
    /// if-else 语句，子节点为条件、then 块与 else 块
    IfElse,
    /// while 语句，子节点为条件与循环体
    While,
    Break,
    Continue,

    // ===== 表达式 =====
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// 一元取负
    Neg,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    LogicAnd,
    LogicOr,
    LogicNot,
    /// 函数调用，子节点为实参表达式
    FuncCall,
    /// 数组访问，子节点为各维下标表达式
    ArrayAccess,
    /// 整数字面量叶子
    LeafInt,
    /// 变量名叶子
    LeafVar,
}

impl AstKind {
    /// 是否为双操作数表达式
    pub fn is_binary_expr(&self) -> bool {
        matches!(
            self,
            AstKind::Add
                | AstKind::Sub
                | AstKind::Mul
                | AstKind::Div
                | AstKind::Mod
                | AstKind::Lt
                | AstKind::Gt
                | AstKind::Le
                | AstKind::Ge
                | AstKind::Eq
                | AstKind::Ne
                | AstKind::LogicAnd
                | AstKind::LogicOr
        )
    }
}

/// AST 节点
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: AstKind,
    pub children: SmallVec<[NodeId; 4]>,
    /// 名字载荷：变量名、函数名、形参名
    pub name: Option<String>,
    /// 整数载荷：字面量取值
    pub int_val: Option<i32>,
    /// 类型载荷：声明与函数定义的类型标注
    pub ty: Option<Type>,
}

/// AST 竞技场
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<AstNode>,
    /// 编译单元根节点
    root: Option<NodeId>,
}

impl Ast {
    pub fn node(
        &self,
        id: NodeId,
    ) -> &AstNode {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(
        &self,
        id: NodeId,
    ) -> AstKind {
        self.node(id).kind
    }

    pub fn children(
        &self,
        id: NodeId,
    ) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn name(
        &self,
        id: NodeId,
    ) -> Option<&str> {
        self.node(id).name.as_deref()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// AST 构造错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AstBuildError {
    /// 子节点编号越界
    #[error("无效的节点编号: {0:?}")]
    InvalidNodeId(NodeId),
    /// 子节点种类不合位置要求
    #[error("位置 {at} 处期望 {expected}，实际为 {found:?}")]
    InvalidChildKind {
        at: &'static str,
        expected: &'static str,
        found: AstKind,
    },
    /// 数组定义或访问缺少维度
    #[error("数组 {0} 至少需要一个维度")]
    MissingDimensions(String),
}

/// AST 构造器
///
/// 所有组合节点的构造方法先校验子节点，再入场返回编号。
#[derive(Debug, Default)]
pub struct AstBuilder {
    ast: Ast,
}

impl AstBuilder {
    pub fn new() -> Self {
        AstBuilder {
            ast: Ast::default(),
        }
    }

    /// 完成构造，取出 AST
    pub fn build(self) -> Ast {
        self.ast
    }

    fn push(
        &mut self,
        node: AstNode,
    ) -> NodeId {
        let id = NodeId(self.ast.nodes.len() as u32);
        self.ast.nodes.push(node);
        id
    }

    fn check(
        &self,
        id: NodeId,
    ) -> Result<(), AstBuildError> {
        if (id.0 as usize) < self.ast.nodes.len() {
            Ok(())
        } else {
            Err(AstBuildError::InvalidNodeId(id))
        }
    }

    fn check_all(
        &self,
        ids: &[NodeId],
    ) -> Result<(), AstBuildError> {
        for id in ids {
            self.check(*id)?;
        }
        Ok(())
    }

    // ===== 叶子 =====

    pub fn leaf_int(
        &mut self,
        value: i32,
    ) -> NodeId {
        self.push(AstNode {
            kind: AstKind::LeafInt,
            children: SmallVec::new(),
            name: None,
            int_val: Some(value),
            ty: Some(Type::Int32),
        })
    }

    pub fn leaf_var(
        &mut self,
        name: impl Into<String>,
    ) -> NodeId {
        self.push(AstNode {
            kind: AstKind::LeafVar,
            children: SmallVec::new(),
            name: Some(name.into()),
            int_val: None,
            ty: None,
        })
    }

    // ===== 表达式 =====

    /// 双操作数表达式
    pub fn binary(
        &mut self,
        kind: AstKind,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, AstBuildError> {
        if !kind.is_binary_expr() {
            return Err(AstBuildError::InvalidChildKind {
                at: "binary",
                expected: "双操作数表达式种类",
                found: kind,
            });
        }
        self.check(lhs)?;
        self.check(rhs)?;
        Ok(self.push(AstNode {
            kind,
            children: SmallVec::from_slice(&[lhs, rhs]),
            name: None,
            int_val: None,
            ty: None,
        }))
    }

    /// 一元取负
    pub fn neg(
        &mut self,
        operand: NodeId,
    ) -> Result<NodeId, AstBuildError> {
        self.check(operand)?;
        Ok(self.push(AstNode {
            kind: AstKind::Neg,
            children: SmallVec::from_slice(&[operand]),
            name: None,
            int_val: None,
            ty: None,
        }))
    }

    /// 逻辑非
    pub fn logic_not(
        &mut self,
        operand: NodeId,
    ) -> Result<NodeId, AstBuildError> {
        self.check(operand)?;
        Ok(self.push(AstNode {
            kind: AstKind::LogicNot,
            children: SmallVec::from_slice(&[operand]),
            name: None,
            int_val: None,
            ty: None,
        }))
    }

    /// 数组访问 `name[i0][i1]...`
    pub fn array_access(
        &mut self,
        name: impl Into<String>,
        indices: &[NodeId],
    ) -> Result<NodeId, AstBuildError> {
        let name = name.into();
        if indices.is_empty() {
            return Err(AstBuildError::MissingDimensions(name));
        }
        self.check_all(indices)?;
        Ok(self.push(AstNode {
            kind: AstKind::ArrayAccess,
            children: SmallVec::from_slice(indices),
            name: Some(name),
            int_val: None,
            ty: None,
        }))
    }

    /// 函数调用
    pub fn func_call(
        &mut self,
        name: impl Into<String>,
        args: &[NodeId],
    ) -> Result<NodeId, AstBuildError> {
        self.check_all(args)?;
        Ok(self.push(AstNode {
            kind: AstKind::FuncCall,
            children: SmallVec::from_slice(args),
            name: Some(name.into()),
            int_val: None,
            ty: None,
        }))
    }

    // ===== 语句 =====

    pub fn empty_stmt(&mut self) -> NodeId {
        self.push(AstNode {
            kind: AstKind::EmptyStmt,
            children: SmallVec::new(),
            name: None,
            int_val: None,
            ty: None,
        })
    }

    /// 标量变量声明，init 为可选初值表达式
    pub fn var_decl(
        &mut self,
        name: impl Into<String>,
        init: Option<NodeId>,
    ) -> Result<NodeId, AstBuildError> {
        let mut children = SmallVec::new();
        if let Some(init) = init {
            self.check(init)?;
            children.push(init);
        }
        Ok(self.push(AstNode {
            kind: AstKind::VarDecl,
            children,
            name: Some(name.into()),
            int_val: None,
            ty: Some(Type::Int32),
        }))
    }

    /// 数组定义，dims 为各维大小表达式
    pub fn array_def(
        &mut self,
        name: impl Into<String>,
        dims: &[NodeId],
    ) -> Result<NodeId, AstBuildError> {
        let name = name.into();
        if dims.is_empty() {
            return Err(AstBuildError::MissingDimensions(name));
        }
        self.check_all(dims)?;
        Ok(self.push(AstNode {
            kind: AstKind::ArrayDef,
            children: SmallVec::from_slice(dims),
            name: Some(name),
            int_val: None,
            ty: None,
        }))
    }

    /// 赋值语句，左值必须是变量或数组访问
    pub fn assign(
        &mut self,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, AstBuildError> {
        self.check(lhs)?;
        self.check(rhs)?;
        let lhs_kind = self.ast.kind(lhs);
        if !matches!(lhs_kind, AstKind::LeafVar | AstKind::ArrayAccess) {
            return Err(AstBuildError::InvalidChildKind {
                at: "assign",
                expected: "变量或数组访问",
                found: lhs_kind,
            });
        }
        Ok(self.push(AstNode {
            kind: AstKind::Assign,
            children: SmallVec::from_slice(&[lhs, rhs]),
            name: None,
            int_val: None,
            ty: None,
        }))
    }

    pub fn return_stmt(
        &mut self,
        value: Option<NodeId>,
    ) -> Result<NodeId, AstBuildError> {
        let mut children = SmallVec::new();
        if let Some(value) = value {
            self.check(value)?;
            children.push(value);
        }
        Ok(self.push(AstNode {
            kind: AstKind::Return,
            children,
            name: None,
            int_val: None,
            ty: None,
        }))
    }

    pub fn if_stmt(
        &mut self,
        cond: NodeId,
        then_body: NodeId,
    ) -> Result<NodeId, AstBuildError> {
        self.check(cond)?;
        self.check(then_body)?;
        Ok(self.push(AstNode {
            kind: AstKind::If,
            children: SmallVec::from_slice(&[cond, then_body]),
            name: None,
            int_val: None,
            ty: None,
        }))
    }

    pub fn if_else_stmt(
        &mut self,
        cond: NodeId,
        then_body: NodeId,
        else_body: NodeId,
    ) -> Result<NodeId, AstBuildError> {
        self.check(cond)?;
        self.check(then_body)?;
        self.check(else_body)?;
        Ok(self.push(AstNode {
            kind: AstKind::IfElse,
            children: SmallVec::from_slice(&[cond, then_body, else_body]),
            name: None,
            int_val: None,
            ty: None,
        }))
    }

    pub fn while_stmt(
        &mut self,
        cond: NodeId,
        body: NodeId,
    ) -> Result<NodeId, AstBuildError> {
        self.check(cond)?;
        self.check(body)?;
        Ok(self.push(AstNode {
            kind: AstKind::While,
            children: SmallVec::from_slice(&[cond, body]),
            name: None,
            int_val: None,
            ty: None,
        }))
    }

    pub fn break_stmt(&mut self) -> NodeId {
        self.push(AstNode {
            kind: AstKind::Break,
            children: SmallVec::new(),
            name: None,
            int_val: None,
            ty: None,
        })
    }

    pub fn continue_stmt(&mut self) -> NodeId {
        self.push(AstNode {
            kind: AstKind::Continue,
            children: SmallVec::new(),
            name: None,
            int_val: None,
            ty: None,
        })
    }

    pub fn block(
        &mut self,
        stmts: &[NodeId],
    ) -> Result<NodeId, AstBuildError> {
        self.check_all(stmts)?;
        Ok(self.push(AstNode {
            kind: AstKind::Block,
            children: SmallVec::from_slice(stmts),
            name: None,
            int_val: None,
            ty: None,
        }))
    }

    // ===== 函数与编译单元 =====

    /// 标量形参
    pub fn formal_param(
        &mut self,
        name: impl Into<String>,
    ) -> NodeId {
        self.push(AstNode {
            kind: AstKind::FormalParam,
            children: SmallVec::new(),
            name: Some(name.into()),
            int_val: None,
            ty: Some(Type::Int32),
        })
    }

    /// 数组形参 `int name[][d1][d2]...`，trailing_dims 为首维之后的各维大小
    pub fn formal_param_array(
        &mut self,
        name: impl Into<String>,
        trailing_dims: &[i32],
    ) -> NodeId {
        let dims: SmallVec<[NodeId; 4]> = trailing_dims
            .iter()
            .map(|d| self.leaf_int(*d))
            .collect();
        self.push(AstNode {
            kind: AstKind::FormalParamArray,
            children: dims,
            name: Some(name.into()),
            int_val: None,
            ty: Some(Type::pointer_to(Type::Int32)),
        })
    }

    /// 函数定义，子节点为各形参加最后一个函数体块
    pub fn func_def(
        &mut self,
        name: impl Into<String>,
        return_type: Type,
        params: &[NodeId],
        body: NodeId,
    ) -> Result<NodeId, AstBuildError> {
        self.check_all(params)?;
        self.check(body)?;
        for p in params {
            let kind = self.ast.kind(*p);
            if !matches!(kind, AstKind::FormalParam | AstKind::FormalParamArray) {
                return Err(AstBuildError::InvalidChildKind {
                    at: "func_def",
                    expected: "形参节点",
                    found: kind,
                });
            }
        }
        if self.ast.kind(body) != AstKind::Block {
            return Err(AstBuildError::InvalidChildKind {
                at: "func_def",
                expected: "语句块",
                found: self.ast.kind(body),
            });
        }
        let mut children: SmallVec<[NodeId; 4]> = SmallVec::from_slice(params);
        children.push(body);
        Ok(self.push(AstNode {
            kind: AstKind::FuncDef,
            children,
            name: Some(name.into()),
            int_val: None,
            ty: Some(return_type),
        }))
    }

    /// 编译单元，items 为全局变量声明与函数定义，构造后设为根节点
    pub fn compile_unit(
        &mut self,
        items: &[NodeId],
    ) -> Result<NodeId, AstBuildError> {
        self.check_all(items)?;
        for item in items {
            let kind = self.ast.kind(*item);
            if !matches!(
                kind,
                AstKind::FuncDef | AstKind::VarDecl | AstKind::ArrayDef
            ) {
                return Err(AstBuildError::InvalidChildKind {
                    at: "compile_unit",
                    expected: "函数定义或全局变量声明",
                    found: kind,
                });
            }
        }
        let id = self.push(AstNode {
            kind: AstKind::CompileUnit,
            children: SmallVec::from_slice(items),
            name: None,
            int_val: None,
            ty: None,
        });
        self.ast.root = Some(id);
        Ok(id)
    }
}
