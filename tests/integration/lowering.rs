//! AST 到 IR 的模块级检查：全局表、原型表与维度表

use minic::frontend::ast::{AstBuilder, AstKind};
use minic::middle::types::Type;
use minic::middle::value::Value;

#[test]
fn test_globals_keep_declaration_order() {
    let mut b = AstBuilder::new();
    let i1 = b.leaf_int(1);
    let x = b.var_decl("x", Some(i1)).unwrap();
    let d = b.leaf_int(8);
    let arr = b.array_def("buf", &[d]).unwrap();
    let y = b.var_decl("y", None).unwrap();
    let body = b.block(&[]).unwrap();
    let main = b.func_def("main", Type::Int32, &[], body).unwrap();
    b.compile_unit(&[x, arr, y, main]).unwrap();

    let module = minic::compile_to_ir(&b.build()).unwrap();
    let names: Vec<&str> = module.globals().iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["x", "buf", "y"]);
    assert_eq!(
        module.globals()[1].ty,
        Type::array_of(Type::Int32, vec![8])
    );
    assert_eq!(module.global_inits(), &[(Value::Global(0), 1)]);
}

#[test]
fn test_array_param_dims_recorded_per_callee() {
    let mut b = AstBuilder::new();
    let n = b.formal_param("n");
    let a = b.formal_param_array("a", &[3, 5]);
    let body = b.block(&[]).unwrap();
    let f = b.func_def("f", Type::Void, &[n, a], body).unwrap();
    b.compile_unit(&[f]).unwrap();

    let module = minic::compile_to_ir(&b.build()).unwrap();
    let func = module.function("f").unwrap();
    assert_eq!(func.arity(), 2);
    assert_eq!(func.params()[0].ty, Type::Int32);
    assert_eq!(func.params()[1].ty, Type::pointer_to(Type::Int32));
    assert_eq!(module.param_dims("f", 1), Some(&[3, 5][..]));
    assert_eq!(module.param_dims("f", 0), None);
}

#[test]
fn test_functions_lowered_in_declaration_order() {
    let mut b = AstBuilder::new();
    let body_a = b.block(&[]).unwrap();
    let fa = b.func_def("alpha", Type::Void, &[], body_a).unwrap();
    let body_b = b.block(&[]).unwrap();
    let fb = b.func_def("beta", Type::Void, &[], body_b).unwrap();
    b.compile_unit(&[fa, fb]).unwrap();

    let module = minic::compile_to_ir(&b.build()).unwrap();
    let names: Vec<&str> = module.functions().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
}

#[test]
fn test_expression_statement_discards_value() {
    let mut b = AstBuilder::new();
    let one = b.leaf_int(1);
    let two = b.leaf_int(2);
    let sum = b.binary(AstKind::Add, one, two).unwrap();
    let body = b.block(&[sum]).unwrap();
    let f = b.func_def("f", Type::Void, &[], body).unwrap();
    b.compile_unit(&[f]).unwrap();

    let module = minic::compile_to_ir(&b.build()).unwrap();
    let lines: Vec<String> = module
        .function("f")
        .unwrap()
        .code
        .iter()
        .map(|i| i.to_string())
        .collect();
    assert_eq!(lines, vec!["entry", "%t0 = add 1, 2", ".L0:", "exit"]);
}
