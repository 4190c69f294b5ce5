//! ARM32 后端
//!
//! 平台约定：r0-r3 传参，fp(r11) 为帧指针，ip(r12) 为寻址暂存
//! 寄存器，r8-r10 为按需分配器的草稿寄存器池。

pub mod iloc;
pub mod regalloc;
pub mod selector;
pub mod stack;

pub use iloc::{ArmInst, BadStoreTarget, Iloc, Loc, Operand};
pub use regalloc::SimpleRegisterAllocator;
pub use selector::{select_module, InstSelector, SelectError};
pub use stack::StackLayout;

use std::fmt;

/// 物理寄存器编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegId(pub u8);

/// 寄存器名表
pub const REG_NAMES: [&str; 16] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "fp",
    "ip", "sp", "lr", "pc",
];

/// 传参寄存器个数，r0-r3
pub const ARG_REG_COUNT: usize = 4;

/// 帧指针
pub const FP: RegId = RegId(11);
/// 寻址暂存寄存器，溢出槽偏移过大时用于合成地址
pub const IP: RegId = RegId(12);
pub const SP: RegId = RegId(13);
pub const LR: RegId = RegId(14);

/// 按需分配器的草稿寄存器池。单条指令至多两个源操作数加一个
/// 结果，三个足够
pub const SCRATCH_REGS: [RegId; 3] = [RegId(8), RegId(9), RegId(10)];

impl RegId {
    pub fn name(&self) -> &'static str {
        REG_NAMES[self.0 as usize]
    }
}

impl fmt::Display for RegId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 判断立即数能否用 ARM 的 8 位循环移位形式编码
pub fn is_imm8m(value: i32) -> bool {
    let v = value as u32;
    for rot in (0..32).step_by(2) {
        if v.rotate_left(rot) <= 0xff {
            return true;
        }
    }
    false
}

/// ldr/str 的立即数偏移范围
pub fn is_ldst_offset(offset: i32) -> bool {
    (-4095..=4095).contains(&offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg_names() {
        assert_eq!(FP.name(), "fp");
        assert_eq!(RegId(0).name(), "r0");
        assert_eq!(SCRATCH_REGS[0].name(), "r8");
    }

    #[test]
    fn test_imm8m() {
        assert!(is_imm8m(0));
        assert!(is_imm8m(255));
        assert!(is_imm8m(0x3FC)); // 0xFF << 2
        assert!(!is_imm8m(257));
        assert!(!is_imm8m(-1));
    }

    #[test]
    fn test_ldst_offset_range() {
        assert!(is_ldst_offset(-4095));
        assert!(is_ldst_offset(4095));
        assert!(!is_ldst_offset(4096));
    }
}
