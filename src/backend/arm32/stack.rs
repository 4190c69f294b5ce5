//! 栈帧布局
//!
//! 每个形参、局部变量与临时变量分得一个 fp 相对的槽位，
//! 数组按全尺寸分配，槽位偏移指向最低地址（数组基址）。
//! 帧底预留外传实参区，大小取自函数的 max_call_args 统计。

use std::collections::HashMap;

use crate::middle::function::Function;
use crate::middle::types::WORD_SIZE;
use crate::middle::value::Value;

use super::ARG_REG_COUNT;

/// 一个函数的栈帧布局
#[derive(Debug)]
pub struct StackLayout {
    slots: HashMap<Value, i32>,
    frame_size: i32,
    outgoing_size: i32,
}

impl StackLayout {
    pub fn build(func: &Function) -> Self {
        let mut slots = HashMap::new();
        let mut offset = 0i32;

        for (i, _) in func.params().iter().enumerate() {
            offset -= WORD_SIZE;
            slots.insert(Value::Param(i as u32), offset);
        }
        for (i, local) in func.locals().iter().enumerate() {
            let size = local.ty.size().max(WORD_SIZE);
            offset -= size;
            slots.insert(Value::Local(i as u32), offset);
        }
        for (i, _) in func.temps().iter().enumerate() {
            offset -= WORD_SIZE;
            slots.insert(Value::Temp(i as u32), offset);
        }

        let vars_size = -offset;
        let outgoing_size = func
            .max_call_args
            .saturating_sub(ARG_REG_COUNT) as i32
            * WORD_SIZE;
        // sp 按 8 字节对齐
        let frame_size = (vars_size + outgoing_size + 7) & !7;

        StackLayout {
            slots,
            frame_size,
            outgoing_size,
        }
    }

    /// 操作数的 fp 相对偏移，常量与全局没有槽位
    pub fn offset_of(
        &self,
        value: Value,
    ) -> Option<i32> {
        self.slots.get(&value).copied()
    }

    pub fn frame_size(&self) -> i32 {
        self.frame_size
    }

    pub fn outgoing_size(&self) -> i32 {
        self.outgoing_size
    }

    /// 第 index 个形参在调用方帧中的偏移（仅第 4 个及以后经栈传递）
    pub fn incoming_param_offset(index: usize) -> i32 {
        // push {fp, lr} 之后 fp+0 为旧 fp，fp+4 为 lr
        8 + (index.saturating_sub(ARG_REG_COUNT) as i32) * WORD_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::types::Type;

    #[test]
    fn test_every_var_gets_a_slot() {
        let mut f = Function::new("f", Type::Int32);
        let p = f.add_param("a", Type::Int32);
        let l = f.new_local("x", Type::Int32);
        let t = f.new_temp(Type::Int32);
        let layout = StackLayout::build(&f);
        assert_eq!(layout.offset_of(p), Some(-4));
        assert_eq!(layout.offset_of(l), Some(-8));
        assert_eq!(layout.offset_of(t), Some(-12));
        assert_eq!(layout.offset_of(Value::ConstInt(1)), None);
        assert_eq!(layout.frame_size(), 16);
    }

    #[test]
    fn test_array_local_takes_full_size() {
        let mut f = Function::new("f", Type::Void);
        let a = f.new_local("a", Type::array_of(Type::Int32, vec![2, 3]));
        let x = f.new_local("x", Type::Int32);
        let layout = StackLayout::build(&f);
        assert_eq!(layout.offset_of(a), Some(-24));
        assert_eq!(layout.offset_of(x), Some(-28));
    }

    #[test]
    fn test_outgoing_area_from_max_call_args() {
        let mut f = Function::new("f", Type::Void);
        f.note_call_args(6);
        let layout = StackLayout::build(&f);
        assert_eq!(layout.outgoing_size(), 8);
        assert_eq!(layout.frame_size(), 8);
    }

    #[test]
    fn test_incoming_param_offsets() {
        assert_eq!(StackLayout::incoming_param_offset(4), 8);
        assert_eq!(StackLayout::incoming_param_offset(5), 12);
    }
}
