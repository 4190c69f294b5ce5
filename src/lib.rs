//! MiniC 编译器中后端
//!
//! 把 MiniC 的语法树降为线性三地址 IR，再为 ARM32 选择指令。
//! 流水线分两段：
//!
//! - `middle::lower`：AST → IR，三遍扫描支持前向引用
//! - `backend::arm32`：IR → ARM32 汇编文本，按需寄存器分配
//!
//! # Example
//!
//! ```no_run
//! use minic::frontend::ast::AstBuilder;
//! use minic::middle::types::Type;
//!
//! fn main() -> minic::Result<()> {
//!     let mut builder = AstBuilder::new();
//!     let body = builder.block(&[])?;
//!     let main = builder.func_def("main", Type::Int32, &[], body)?;
//!     builder.compile_unit(&[main])?;
//!     let asm = minic::compile(&builder.build())?;
//!     println!("{}", asm);
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod backend;
pub mod frontend;
pub mod middle;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

use tracing::debug;

use crate::frontend::ast::Ast;
use crate::middle::module::Module;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 降为线性 IR
pub fn compile_to_ir(ast: &Ast) -> Result<Module> {
    debug!("开始 IR 生成");
    let module = middle::generator::lower(ast)?;
    debug!("IR 生成完成: {} 个函数", module.functions().count());
    Ok(module)
}

/// 全流程：AST → IR → ARM32 汇编文本
pub fn compile(ast: &Ast) -> Result<String> {
    use std::fmt::Write;

    let module = compile_to_ir(ast)?;
    debug!("开始指令选择");
    let selected = backend::arm32::select_module(&module)?;

    let mut out = String::new();
    writeln!(&mut out, ".text")?;
    for (name, iloc) in &selected {
        writeln!(&mut out, ".global {}", name)?;
        writeln!(&mut out, "{}:", name)?;
        write!(&mut out, "{}", iloc)?;
    }
    if !module.globals().is_empty() {
        writeln!(&mut out, ".data")?;
        for global in module.globals() {
            writeln!(&mut out, ".global {}", global.name)?;
            writeln!(&mut out, "{}:", global.name)?;
            writeln!(&mut out, "    .space {}", global.ty.size())?;
        }
    }
    debug!("指令选择完成");
    Ok(out)
}
