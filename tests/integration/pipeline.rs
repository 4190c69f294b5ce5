//! AST 到 ARM32 汇编的全流程检查

use minic::frontend::ast::{AstBuilder, AstKind, NodeId};
use minic::middle::types::Type;

/// int min(int a, int b) { if (a < b) { return a; } return b; }
fn build_min(b: &mut AstBuilder) -> NodeId {
    let pa = b.formal_param("a");
    let pb = b.formal_param("b");
    let va = b.leaf_var("a");
    let vb = b.leaf_var("b");
    let cond = b.binary(AstKind::Lt, va, vb).unwrap();
    let ra = b.leaf_var("a");
    let ret_a = b.return_stmt(Some(ra)).unwrap();
    let then_body = b.block(&[ret_a]).unwrap();
    let if_stmt = b.if_stmt(cond, then_body).unwrap();
    let rb = b.leaf_var("b");
    let ret_b = b.return_stmt(Some(rb)).unwrap();
    let body = b.block(&[if_stmt, ret_b]).unwrap();
    b.func_def("min", Type::Int32, &[pa, pb], body).unwrap()
}

#[test]
fn test_min_function_selects_compare_and_branch() {
    // 整个测试进程只初始化一次日志
    minic::util::logger::init();

    let mut b = AstBuilder::new();
    let min = build_min(&mut b);
    let a3 = b.leaf_int(3);
    let a4 = b.leaf_int(4);
    let call = b.func_call("min", &[a3, a4]).unwrap();
    let ret = b.return_stmt(Some(call)).unwrap();
    let main_body = b.block(&[ret]).unwrap();
    let main = b.func_def("main", Type::Int32, &[], main_body).unwrap();
    b.compile_unit(&[min, main]).unwrap();

    let asm = minic::compile(&b.build()).unwrap();
    assert!(asm.contains(".global min"));
    assert!(asm.contains(".global main"));
    assert!(asm.contains("push {fp, lr}"));
    // a < b 经 cmp 加条件 mov 物化为 0/1
    assert!(asm.contains("cmp r8, r9"));
    assert!(asm.contains("movlt r10, #1"));
    assert!(asm.contains("bl min"));
    assert!(asm.contains("bx lr"));
}

#[test]
fn test_while_loop_selects_backward_branch() {
    // int main() { int i; int s; i = 0; s = 0;
    //   while (i < 10) { s = s + i; i = i + 1; } return s; }
    let mut b = AstBuilder::new();
    let di = b.var_decl("i", None).unwrap();
    let ds = b.var_decl("s", None).unwrap();
    let vi = b.leaf_var("i");
    let ten = b.leaf_int(10);
    let cond = b.binary(AstKind::Lt, vi, ten).unwrap();
    let vs = b.leaf_var("s");
    let vi2 = b.leaf_var("i");
    let sum = b.binary(AstKind::Add, vs, vi2).unwrap();
    let ls = b.leaf_var("s");
    let upd_s = b.assign(ls, sum).unwrap();
    let vi3 = b.leaf_var("i");
    let one = b.leaf_int(1);
    let inc = b.binary(AstKind::Add, vi3, one).unwrap();
    let li = b.leaf_var("i");
    let upd_i = b.assign(li, inc).unwrap();
    let loop_body = b.block(&[upd_s, upd_i]).unwrap();
    let w = b.while_stmt(cond, loop_body).unwrap();
    let rs = b.leaf_var("s");
    let ret = b.return_stmt(Some(rs)).unwrap();
    let body = b.block(&[di, ds, w, ret]).unwrap();
    let main = b.func_def("main", Type::Int32, &[], body).unwrap();
    b.compile_unit(&[main]).unwrap();

    let asm = minic::compile(&b.build()).unwrap();
    // 条件跳转展开为 bne 真目标加无条件假目标
    assert!(asm.contains("bne .Lmain_"));
    assert!(asm.contains("b .Lmain_"));
    assert!(asm.contains(".Lmain_1:"));
}

#[test]
fn test_global_array_lands_in_data_section() {
    let mut b = AstBuilder::new();
    let d0 = b.leaf_int(2);
    let d1 = b.leaf_int(3);
    let arr = b.array_def("table", &[d0, d1]).unwrap();
    let i0 = b.leaf_int(1);
    let i1 = b.leaf_int(2);
    let access = b.array_access("table", &[i0, i1]).unwrap();
    let ret = b.return_stmt(Some(access)).unwrap();
    let body = b.block(&[ret]).unwrap();
    let main = b.func_def("main", Type::Int32, &[], body).unwrap();
    b.compile_unit(&[arr, main]).unwrap();

    let asm = minic::compile(&b.build()).unwrap();
    assert!(asm.contains(".data"));
    assert!(asm.contains("table:"));
    // 2×3 的 i32 数组占 24 字节
    assert!(asm.contains(".space 24"));
    // 全局数组基址按符号装入
    assert!(asm.contains("ldr r8, =table"));
}

#[test]
fn test_mod_operator_survives_whole_pipeline() {
    let mut b = AstBuilder::new();
    let p = b.formal_param("n");
    let v = b.leaf_var("n");
    let two = b.leaf_int(2);
    let rem = b.binary(AstKind::Mod, v, two).unwrap();
    let ret = b.return_stmt(Some(rem)).unwrap();
    let body = b.block(&[ret]).unwrap();
    let f = b.func_def("parity", Type::Int32, &[p], body).unwrap();
    b.compile_unit(&[f]).unwrap();

    let asm = minic::compile(&b.build()).unwrap();
    assert!(asm.contains("sdiv r10, r8, r9"));
    assert!(asm.contains("mul r10, r10, r9"));
    assert!(asm.contains("sub r10, r8, r10"));
}

#[test]
fn test_call_with_stack_arguments() {
    let mut b = AstBuilder::new();
    let params: Vec<NodeId> =
        (0..6).map(|i| b.formal_param(format!("p{}", i))).collect();
    let v = b.leaf_var("p5");
    let ret = b.return_stmt(Some(v)).unwrap();
    let gbody = b.block(&[ret]).unwrap();
    let g = b.func_def("last", Type::Int32, &params, gbody).unwrap();
    let args: Vec<NodeId> = (0..6).map(|i| b.leaf_int(i * 10)).collect();
    let call = b.func_call("last", &args).unwrap();
    let mret = b.return_stmt(Some(call)).unwrap();
    let mbody = b.block(&[mret]).unwrap();
    let main = b.func_def("main", Type::Int32, &[], mbody).unwrap();
    b.compile_unit(&[g, main]).unwrap();

    let asm = minic::compile(&b.build()).unwrap();
    // 第 5、6 个实参经外传区传递
    assert!(asm.contains("str r8, [sp]"));
    assert!(asm.contains("str r8, [sp, #4]"));
    // 被调方从调用帧取回栈上形参
    assert!(asm.contains("ldr r8, [fp, #8]"));
    assert!(asm.contains("ldr r8, [fp, #12]"));
}
