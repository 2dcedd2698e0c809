//! Operations for the autograd system.
//!
//! Each operation computes its forward value eagerly. If at least one operand requires a
//! gradient it also records a node holding whatever the backward rule needs; otherwise it returns
//! a constant and the graph stays empty.
//!
//! | Operation | Backward |
//! |---|---|
//! | `matmul` | `dA = G·Bᵀ`, `dB = Aᵀ·G` |
//! | `transpose` | `dX = Gᵀ` |
//! | `exp` | `dX = G ⊙ Y` |
//! | `relu` | `dX = G ⊙ [X > 0]` |
//! | `sum` | `dX = g · 1` |
//! | `scale_by` | `dX = s·G`, `ds = Σ G ⊙ X` |
//! | `add_row` | `dX = G`, `db = Σ_rows G` |
//! | `l2_normalize_rows` | `dX = (G - Y ⊙ ⟨G, Y⟩_row) / ‖X‖` |
//! | `cross_entropy` | `dZ = g · (softmax(Z) - onehot(t)) / R` |
//! | `embedding_mean` | scatter-add of `G / L` into the looked-up rows |

use super::{GradCell, GraphNode, Variable, accumulate, parent_nodes};
use crate::tensor::{FloatElem, Result, Tensor, TensorError, elem_from_usize};
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

fn new_cell<T: FloatElem, const RANK: usize>() -> GradCell<T, RANK> {
    Rc::new(RefCell::new(None))
}

/// Reads the output gradient, or `None` if nothing flowed into this node.
fn incoming<T: FloatElem, const RANK: usize>(cell: &GradCell<T, RANK>) -> Option<Tensor<T, RANK>> {
    cell.borrow().clone()
}

// --- MatMul Node ---
#[derive(Debug)]
struct MatMulNode<T: FloatElem> {
    lhs: Tensor<T, 2>,
    rhs: Tensor<T, 2>,
    lhs_grad: Option<GradCell<T, 2>>,
    rhs_grad: Option<GradCell<T, 2>>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem> GraphNode for MatMulNode<T> {
    fn backward(&self) -> Result<()> {
        let Some(grad) = incoming(&self.out_grad) else { return Ok(()) };
        if let Some(cell) = &self.lhs_grad {
            accumulate(cell, grad.matmul(&self.rhs.transpose()?)?)?;
        }
        if let Some(cell) = &self.rhs_grad {
            accumulate(cell, self.lhs.transpose()?.matmul(&grad)?)?;
        }
        Ok(())
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Transpose Node ---
#[derive(Debug)]
struct TransposeNode<T: FloatElem> {
    input_grad: GradCell<T, 2>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem> GraphNode for TransposeNode<T> {
    fn backward(&self) -> Result<()> {
        let Some(grad) = incoming(&self.out_grad) else { return Ok(()) };
        accumulate(&self.input_grad, grad.transpose()?)
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Exp Node ---
#[derive(Debug)]
struct ExpNode<T: FloatElem, const RANK: usize> {
    output: Tensor<T, RANK>,
    input_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem, const RANK: usize> GraphNode for ExpNode<T, RANK> {
    fn backward(&self) -> Result<()> {
        let Some(grad) = incoming(&self.out_grad) else { return Ok(()) };
        accumulate(&self.input_grad, (&grad * &self.output)?)
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- ReLU Node ---
#[derive(Debug)]
struct ReluNode<T: FloatElem, const RANK: usize> {
    input: Tensor<T, RANK>,
    input_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem, const RANK: usize> GraphNode for ReluNode<T, RANK> {
    fn backward(&self) -> Result<()> {
        let Some(mut grad) = incoming(&self.out_grad) else { return Ok(()) };
        for (g, &x) in grad.data_mut().iter_mut().zip(self.input.data()) {
            if x <= T::zero() {
                *g = T::zero();
            }
        }
        accumulate(&self.input_grad, grad)
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Sum Node ---
#[derive(Debug)]
struct SumNode<T: FloatElem, const RANK: usize> {
    shape: [usize; RANK],
    input_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, 0>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem, const RANK: usize> GraphNode for SumNode<T, RANK> {
    fn backward(&self) -> Result<()> {
        let Some(grad) = incoming(&self.out_grad) else { return Ok(()) };
        accumulate(&self.input_grad, Tensor::full(self.shape, grad.item()))
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- ScaleBy Node ---
#[derive(Debug)]
struct ScaleByNode<T: FloatElem> {
    input: Tensor<T, 2>,
    factor: T,
    input_grad: Option<GradCell<T, 2>>,
    factor_grad: Option<GradCell<T, 2>>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem> GraphNode for ScaleByNode<T> {
    fn backward(&self) -> Result<()> {
        let Some(grad) = incoming(&self.out_grad) else { return Ok(()) };
        if let Some(cell) = &self.input_grad {
            accumulate(cell, grad.scale(self.factor))?;
        }
        if let Some(cell) = &self.factor_grad {
            let dot = (&grad * &self.input)?.sum();
            accumulate(cell, Tensor::new(vec![dot], [1, 1])?)?;
        }
        Ok(())
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- AddRow Node ---
#[derive(Debug)]
struct AddRowNode<T: FloatElem> {
    input_grad: Option<GradCell<T, 2>>,
    row_grad: Option<GradCell<T, 2>>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem> GraphNode for AddRowNode<T> {
    fn backward(&self) -> Result<()> {
        let Some(grad) = incoming(&self.out_grad) else { return Ok(()) };
        if let Some(cell) = &self.row_grad {
            accumulate(cell, grad.sum_rows())?;
        }
        if let Some(cell) = &self.input_grad {
            accumulate(cell, grad)?;
        }
        Ok(())
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- L2Normalize Node ---
#[derive(Debug)]
struct L2NormalizeNode<T: FloatElem> {
    output: Tensor<T, 2>,
    norms: Vec<T>,
    eps: T,
    input_grad: GradCell<T, 2>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem> GraphNode for L2NormalizeNode<T> {
    fn backward(&self) -> Result<()> {
        let Some(grad) = incoming(&self.out_grad) else { return Ok(()) };
        let cols = self.output.cols();
        let mut dx = Tensor::zeros(*self.output.shape());
        if cols > 0 {
            let rows = dx
                .data_mut()
                .chunks_mut(cols)
                .zip(grad.data().chunks(cols))
                .zip(self.output.data().chunks(cols))
                .zip(&self.norms);
            for (((dx_row, g), y), &norm) in rows {
                if norm > self.eps {
                    let dot = g.iter().zip(y).fold(T::zero(), |acc, (&a, &b)| acc + a * b);
                    for ((d, &gi), &yi) in dx_row.iter_mut().zip(g).zip(y) {
                        *d = (gi - yi * dot) / norm;
                    }
                } else {
                    // Clamped rows are a plain division by eps.
                    for (d, &gi) in dx_row.iter_mut().zip(g) {
                        *d = gi / norm;
                    }
                }
            }
        }
        accumulate(&self.input_grad, dx)
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- CrossEntropy Node ---
#[derive(Debug)]
struct CrossEntropyNode<T: FloatElem> {
    log_probs: Tensor<T, 2>,
    targets: Vec<usize>,
    input_grad: GradCell<T, 2>,
    out_grad: GradCell<T, 0>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem> GraphNode for CrossEntropyNode<T> {
    fn backward(&self) -> Result<()> {
        let Some(grad) = incoming(&self.out_grad) else { return Ok(()) };
        let rows: T = elem_from_usize(self.targets.len())?;
        let factor = grad.item() / rows;

        let mut dz = self.log_probs.exp();
        let cols = dz.cols();
        for (row, &t) in dz.data_mut().chunks_mut(cols).zip(&self.targets) {
            row[t] -= T::one();
            for v in row.iter_mut() {
                *v = *v * factor;
            }
        }
        accumulate(&self.input_grad, dz)
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- EmbeddingMean Node ---
#[derive(Debug)]
struct EmbeddingMeanNode<T: FloatElem> {
    ids: Tensor<usize, 2>,
    table_shape: [usize; 2],
    table_grad: GradCell<T, 2>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: FloatElem> GraphNode for EmbeddingMeanNode<T> {
    fn backward(&self) -> Result<()> {
        let Some(grad) = incoming(&self.out_grad) else { return Ok(()) };
        let [_, seq_len] = *self.ids.shape();
        let dim = self.table_shape[1];
        let inv_len = T::one() / elem_from_usize::<T>(seq_len)?;

        let mut dtable = Tensor::zeros(self.table_shape);
        if dim == 0 {
            return accumulate(&self.table_grad, dtable);
        }
        let table = dtable.data_mut();
        for (ids, g) in self.ids.data().chunks(seq_len).zip(grad.data().chunks(dim)) {
            for &id in ids {
                for (t, &gi) in table[id * dim..(id + 1) * dim].iter_mut().zip(g) {
                    *t += gi * inv_len;
                }
            }
        }
        accumulate(&self.table_grad, dtable)
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T, const RANK: usize> Variable<T, RANK>
where
    T: FloatElem,
{
    /// Element-wise `exp`.
    pub fn exp(&self) -> Self {
        let output = self.data.exp();
        let Some(input_grad) = self.grad_cell() else {
            return Variable::constant(output);
        };
        let out_grad = new_cell();
        let node = Rc::new(ExpNode {
            output: output.clone(),
            input_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node]),
        });
        Variable::with_node(output, node, out_grad)
    }

    /// Element-wise `max(0, x)`.
    pub fn relu(&self) -> Self {
        let output = self.data.map(|x| if x > T::zero() { x } else { T::zero() });
        let Some(input_grad) = self.grad_cell() else {
            return Variable::constant(output);
        };
        let out_grad = new_cell();
        let node = Rc::new(ReluNode {
            input: self.data.clone(),
            input_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node]),
        });
        Variable::with_node(output, node, out_grad)
    }

    /// Sums all elements into a scalar.
    pub fn sum(&self) -> Variable<T, 0> {
        let output = Tensor::scalar(self.data.sum());
        let Some(input_grad) = self.grad_cell() else {
            return Variable::constant(output);
        };
        let out_grad = new_cell();
        let node = Rc::new(SumNode {
            shape: *self.data.shape(),
            input_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node]),
        });
        Variable::with_node(output, node, out_grad)
    }
}

impl<T> Variable<T, 2>
where
    T: FloatElem,
{
    /// Matrix product `[M, K] x [K, N] -> [M, N]`.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        let output = self.data.matmul(&rhs.data)?;
        let lhs_grad = self.grad_cell();
        let rhs_grad = rhs.grad_cell();
        if lhs_grad.is_none() && rhs_grad.is_none() {
            return Ok(Variable::constant(output));
        }
        let out_grad = new_cell();
        let node = Rc::new(MatMulNode {
            lhs: self.data.clone(),
            rhs: rhs.data.clone(),
            lhs_grad,
            rhs_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node, &rhs.node]),
        });
        Ok(Variable::with_node(output, node, out_grad))
    }

    /// Swaps rows and columns.
    pub fn transpose(&self) -> Result<Self> {
        let output = self.data.transpose()?;
        let Some(input_grad) = self.grad_cell() else {
            return Ok(Variable::constant(output));
        };
        let out_grad = new_cell();
        let node = Rc::new(TransposeNode {
            input_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node]),
        });
        Ok(Variable::with_node(output, node, out_grad))
    }

    /// Multiplies every element by the single value of a `[1, 1]` variable.
    ///
    /// This is how the learned temperature scales a logit matrix while still receiving a gradient.
    pub fn scale_by(&self, factor: &Self) -> Result<Self> {
        if factor.data.shape() != &[1, 1] {
            return Err(TensorError::ShapeMismatch {
                expected: vec![1, 1],
                got: factor.data.shape().to_vec(),
            });
        }
        let s = factor.data.data()[0];
        let output = self.data.scale(s);
        let input_grad = self.grad_cell();
        let factor_grad = factor.grad_cell();
        if input_grad.is_none() && factor_grad.is_none() {
            return Ok(Variable::constant(output));
        }
        let out_grad = new_cell();
        let node = Rc::new(ScaleByNode {
            input: self.data.clone(),
            factor: s,
            input_grad,
            factor_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node, &factor.node]),
        });
        Ok(Variable::with_node(output, node, out_grad))
    }

    /// Adds a `[1, C]` row (a bias) to every row.
    pub fn add_row(&self, row: &Self) -> Result<Self> {
        let output = self.data.add_row(&row.data)?;
        let input_grad = self.grad_cell();
        let row_grad = row.grad_cell();
        if input_grad.is_none() && row_grad.is_none() {
            return Ok(Variable::constant(output));
        }
        let out_grad = new_cell();
        let node = Rc::new(AddRowNode {
            input_grad,
            row_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node, &row.node]),
        });
        Ok(Variable::with_node(output, node, out_grad))
    }

    /// Divides every row by its L2 norm, clamped below at `eps`.
    pub fn l2_normalize_rows(&self, eps: T) -> Result<Self> {
        let (output, norms) = self.data.l2_normalize_rows(eps)?;
        let Some(input_grad) = self.grad_cell() else {
            return Ok(Variable::constant(output));
        };
        let out_grad = new_cell();
        let node = Rc::new(L2NormalizeNode {
            output: output.clone(),
            norms,
            eps,
            input_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node]),
        });
        Ok(Variable::with_node(output, node, out_grad))
    }

    /// Mean cross-entropy of row-wise logits against one target class per row.
    ///
    /// # Errors
    ///
    /// Fails if `targets` does not have one entry per row, if a target is not a valid column,
    /// or if there are no rows.
    pub fn cross_entropy(&self, targets: &[usize]) -> Result<Variable<T, 0>> {
        let log_probs = self.data.log_softmax_rows()?;
        let loss = crate::loss::nll_mean(&log_probs, targets)?;
        let output = Tensor::scalar(loss);
        let Some(input_grad) = self.grad_cell() else {
            return Ok(Variable::constant(output));
        };
        let out_grad = new_cell();
        let node = Rc::new(CrossEntropyNode {
            log_probs,
            targets: targets.to_vec(),
            input_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node]),
        });
        Ok(Variable::with_node(output, node, out_grad))
    }

    /// Looks up rows of this `[vocab, dim]` table for every token id and averages them per
    /// sequence, producing `[batch, dim]`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` for an id outside the table and
    /// `TensorError::Unsupported` for zero-length sequences.
    pub fn embedding_mean(&self, ids: &Tensor<usize, 2>) -> Result<Self> {
        let [batch, seq_len] = *ids.shape();
        let [vocab, dim] = *self.data.shape();
        if seq_len == 0 {
            return Err(TensorError::Unsupported(
                "embedding_mean over empty sequences".into(),
            ));
        }
        let inv_len = T::one() / elem_from_usize::<T>(seq_len)?;

        let table = self.data.data();
        let mut output = Tensor::zeros([batch, dim]);
        let out = output.data_mut();
        for (b, seq) in ids.data().chunks(seq_len).enumerate() {
            let dest = &mut out[b * dim..(b + 1) * dim];
            for &id in seq {
                if id >= vocab {
                    return Err(TensorError::IndexOutOfBounds {
                        index: vec![id],
                        shape: vec![vocab, dim],
                    });
                }
                for (o, &w) in dest.iter_mut().zip(&table[id * dim..(id + 1) * dim]) {
                    *o += w * inv_len;
                }
            }
        }

        let Some(table_grad) = self.grad_cell() else {
            return Ok(Variable::constant(output));
        };
        let out_grad = new_cell();
        let node = Rc::new(EmbeddingMeanNode {
            ids: ids.clone(),
            table_shape: [vocab, dim],
            table_grad,
            out_grad: out_grad.clone(),
            parents: parent_nodes(&[&self.node]),
        });
        Ok(Variable::with_node(output, node, out_grad))
    }
}
