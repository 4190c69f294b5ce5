//! 按需寄存器分配
//!
//! 寄存器只在一条 IR 指令的翻译期间被占用：操作数装入时分配，
//! 结果写回后立即全部释放。草稿池为单条指令的操作数集合预留了
//! 足够容量，正常情况下分配总能成功。

use std::collections::HashMap;

use crate::middle::value::Value;

use super::{RegId, SCRATCH_REGS};

/// 朴素按需寄存器分配器
#[derive(Debug)]
pub struct SimpleRegisterAllocator {
    free: Vec<RegId>,
    bindings: HashMap<Value, RegId>,
}

impl Default for SimpleRegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleRegisterAllocator {
    pub fn new() -> Self {
        // 逆序入栈，分配顺序即 r8、r9、r10
        let mut free: Vec<RegId> = SCRATCH_REGS.to_vec();
        free.reverse();
        SimpleRegisterAllocator {
            free,
            bindings: HashMap::new(),
        }
    }

    /// 为操作数分配寄存器，已绑定则复用
    pub fn allocate(
        &mut self,
        value: Value,
    ) -> Option<RegId> {
        if let Some(reg) = self.bindings.get(&value) {
            return Some(*reg);
        }
        let reg = self.free.pop()?;
        self.bindings.insert(value, reg);
        Some(reg)
    }

    /// 查询已有绑定
    pub fn reg_of(
        &self,
        value: Value,
    ) -> Option<RegId> {
        self.bindings.get(&value).copied()
    }

    /// 释放操作数占用的寄存器，未绑定时为空操作
    pub fn free(
        &mut self,
        value: Value,
    ) {
        if let Some(reg) = self.bindings.remove(&value) {
            self.free.push(reg);
        }
    }

    pub fn in_use(&self) -> usize {
        self.bindings.len()
    }
}
