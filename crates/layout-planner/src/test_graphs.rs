// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Small graphs shared by the unit tests.

use graph_ir::{
    graph::{Loaded, Validated},
    BinaryOp, BufferAlloc, Graph, NodeId, OpKind, Operand, UnaryOp, ValueType,
};
use layout_core::{GridShape, HardwareDesc, PageMode, ScalarKind, TensorType};

pub fn bf16(dims: &[usize]) -> TensorType {
    TensorType::new(dims, ScalarKind::Bf16)
}

pub fn hw(rows: usize, cols: usize, scratch: usize) -> HardwareDesc {
    HardwareDesc::new(GridShape::new(rows, cols), scratch)
}

fn empty() -> OpKind {
    OpKind::Empty {
        alloc: BufferAlloc {
            scalar_kind: ScalarKind::Bf16,
            page_mode: PageMode::Tiled,
            memory_config: None,
        },
    }
}

/// Appends `empty_<tag>` plus a destination-style node `<name>`.
pub fn dps(
    g: &mut Graph<Loaded>,
    f: usize,
    kind: OpKind,
    name: &str,
    inputs: Vec<Operand>,
    result: TensorType,
) -> NodeId {
    let buf = g.append(
        f,
        empty(),
        Some(&format!("empty_{name}")),
        vec![],
        Some(result.clone()),
    );
    let mut operands = inputs;
    operands.push(Operand::Node(buf));
    g.append(f, kind, Some(name), operands, Some(result))
}

/// `relu_0 → relu_1 → … → return` over one argument.
pub fn chain(dims: &[usize], len: usize) -> Graph<Validated> {
    let t = bf16(dims);
    let mut g = Graph::new("chain");
    let f = g.add_function("forward", vec![ValueType::new(t.clone())]);
    let mut prev = Operand::Arg(0);
    for i in 0..len {
        let id = dps(
            &mut g,
            f,
            OpKind::Unary(UnaryOp::Relu),
            &format!("relu_{i}"),
            vec![prev],
            t.clone(),
        );
        prev = Operand::Node(id);
    }
    g.append(f, OpKind::Return, None, vec![prev], None);
    g.validate().expect("chain graph is valid")
}

/// A one-node main function plus a const-eval function.
pub fn with_const_eval() -> Graph<Validated> {
    let t = bf16(&[64, 64]);
    let mut g = Graph::new("ce");
    let f = g.add_function("forward", vec![ValueType::new(t.clone())]);
    let r = dps(&mut g, f, OpKind::Unary(UnaryOp::Relu), "relu_0", vec![Operand::Arg(0)], t.clone());
    g.append(f, OpKind::Return, None, vec![Operand::Node(r)], None);

    let ce = g.add_function("forward_const_eval_0", vec![ValueType::new(t.clone())]);
    g.set_const_eval(ce, true);
    let c = g.append(ce, OpKind::Reshape, Some("ce_reshape"), vec![Operand::Arg(0)], Some(t));
    g.append(ce, OpKind::Return, None, vec![Operand::Node(c)], None);
    g.validate().expect("const-eval graph is valid")
}

/// `a = relu(arg0)`, `b = exp(arg0)`, `c = add(a, b)`: two live tensors
/// when `c` runs.
pub fn diamond(dims: &[usize]) -> Graph<Validated> {
    let t = bf16(dims);
    let mut g = Graph::new("diamond");
    let f = g.add_function("forward", vec![ValueType::new(t.clone())]);
    let a = dps(&mut g, f, OpKind::Unary(UnaryOp::Relu), "a", vec![Operand::Arg(0)], t.clone());
    let b = dps(&mut g, f, OpKind::Unary(UnaryOp::Exp), "b", vec![Operand::Arg(0)], t.clone());
    let c = dps(
        &mut g,
        f,
        OpKind::Binary(BinaryOp::Add),
        "c",
        vec![Operand::Node(a), Operand::Node(b)],
        t,
    );
    g.append(f, OpKind::Return, None, vec![Operand::Node(c)], None);
    g.validate().expect("diamond graph is valid")
}

/// `mm = matmul(arg0, arg1)`, `sm = softmax(mm)`, `rs = reshape(sm)`.
pub fn matmul_softmax_reshape() -> Graph<Validated> {
    let mut g = Graph::new("mm");
    let f = g.add_function(
        "forward",
        vec![
            ValueType::new(bf16(&[256, 128])),
            ValueType::new(bf16(&[128, 256])),
        ],
    );
    let out = bf16(&[256, 256]);
    let mm = dps(
        &mut g,
        f,
        OpKind::Matmul,
        "mm",
        vec![Operand::Arg(0), Operand::Arg(1)],
        out.clone(),
    );
    let sm = dps(&mut g, f, OpKind::Softmax { dim: -1 }, "sm", vec![Operand::Node(mm)], out.clone());
    let rs = g.append(
        f,
        OpKind::Reshape,
        Some("rs"),
        vec![Operand::Node(sm)],
        Some(bf16(&[1, 256, 256])),
    );
    g.append(f, OpKind::Return, None, vec![Operand::Node(rs)], None);
    g.validate().expect("matmul graph is valid")
}
