//! 后端：目标指令选择与寄存器分配

pub mod arm32;
