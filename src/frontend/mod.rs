//! 前端接口
//!
//! 本 crate 专注中端与后端：前端只提供 AST 竞技场与构造器，
//! 词法与语法分析不在范围内。

pub mod ast;

pub use ast::{Ast, AstBuildError, AstBuilder, AstKind, AstNode, NodeId};
