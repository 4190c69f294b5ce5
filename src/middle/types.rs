//! IR 类型系统
//!
//! MiniC 的值类型：void、32 位整数、布尔（关系运算的结果类型）、
//! 指针与数组。数组元素统一为 4 字节整数。

use std::fmt;

/// 机器字长（字节），所有标量与指针均占一个字
pub const WORD_SIZE: i32 = 4;

/// IR 值类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// 无值（函数返回类型）
    Void,
    /// 32 位有符号整数
    Int32,
    /// 布尔值，关系与逻辑运算的结果类型
    Bool,
    /// 指针类型，指向 pointee
    Pointer(Box<Type>),
    /// 数组类型，element 为元素类型，dims 为各维大小
    Array {
        element: Box<Type>,
        dims: Vec<i32>,
    },
}

impl Type {
    /// 构造指向 `pointee` 的指针类型
    pub fn pointer_to(pointee: Type) -> Type {
        Type::Pointer(Box::new(pointee))
    }

    /// 构造数组类型，要求至少一维且每维为正
    pub fn array_of(
        element: Type,
        dims: Vec<i32>,
    ) -> Type {
        debug_assert!(!dims.is_empty());
        debug_assert!(dims.iter().all(|d| *d > 0));
        Type::Array {
            element: Box::new(element),
            dims,
        }
    }

    /// 是否为指针类型
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    /// 是否为数组类型
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    /// 解引用一次后的类型，非指针返回 None
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// 连续解引用到底后的类型（根类型）
    pub fn root_type(&self) -> &Type {
        match self {
            Type::Pointer(inner) => inner.root_type(),
            other => other,
        }
    }

    /// 指针深度，即可连续解引用的次数
    pub fn depth(&self) -> u32 {
        match self {
            Type::Pointer(inner) => inner.depth() + 1,
            _ => 0,
        }
    }

    /// 类型占用的字节数
    pub fn size(&self) -> i32 {
        match self {
            Type::Void => 0,
            Type::Int32 | Type::Bool | Type::Pointer(_) => WORD_SIZE,
            Type::Array { element, dims } => {
                dims.iter().product::<i32>() * element.size()
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int32 => write!(f, "i32"),
            Type::Bool => write!(f, "i1"),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Array { element, dims } => {
                write!(f, "{}", element)?;
                for d in dims {
                    write!(f, "[{}]", d)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_depth_and_root() {
        let p = Type::pointer_to(Type::pointer_to(Type::Int32));
        assert_eq!(p.depth(), 2);
        assert_eq!(p.root_type(), &Type::Int32);
        assert_eq!(p.pointee(), Some(&Type::pointer_to(Type::Int32)));
    }

    #[test]
    fn test_array_size() {
        let a = Type::array_of(Type::Int32, vec![2, 3]);
        assert_eq!(a.size(), 24);
        assert_eq!(a.to_string(), "i32[2][3]");
    }

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(Type::Int32.size(), 4);
        assert_eq!(Type::Bool.size(), 4);
        assert_eq!(Type::pointer_to(Type::Int32).size(), 4);
        assert_eq!(Type::Void.size(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::pointer_to(Type::Int32).to_string(), "i32*");
        assert_eq!(Type::Bool.to_string(), "i1");
    }
}
