//! 中端：线性三地址 IR 与 AST 下降
//!
//! 从 AST 生成带标签与跳转的线性 IR，供后端逐条选择指令。

pub mod function;
pub mod generator;
pub mod instruction;
pub mod intercode;
pub mod module;
pub mod types;
pub mod value;

pub use function::Function;
pub use generator::{lower, Generator, LowerError};
pub use instruction::{Instruction, IrOp, LabelId, MoveKind};
pub use intercode::InterCode;
pub use module::Module;
pub use types::Type;
pub use value::{Value, VarInfo};
