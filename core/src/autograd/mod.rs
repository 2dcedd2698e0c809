//! Automatic Differentiation (Autograd) module.
//!
//! # What is Autograd?
//!
//! Automatic Differentiation (AD) evaluates the derivative of a function specified by a program.
//! It is what lets the contrastive loss of a mini-chunk be turned into gradients for every
//! encoder parameter and for the shared `logit_scale`.
//!
//! `clip-rs` implements **Reverse-Mode AD** using a **Tape-based** approach.
//!
//! # How it Works
//!
//! 1. **Forward Pass**: operations on `Variable`s that require gradients record a node in a
//!    computation graph (a DAG). Operations on constants record nothing.
//! 2. **Backward Pass**: `.backward()` on a scalar (usually the loss) visits the graph in reverse
//!    topological order and applies the chain rule at every node.
//! 3. **Accumulation**: gradients are *added* into the gradient cell of each leaf. Calling
//!    `backward` once per mini-chunk therefore sums the per-chunk gradients, and the optimizer
//!    reads the sum. `Variable::zero_grad` clears a leaf before the next step.
//!
//! # Example: Simple Gradient Computation
//!
//! The derivative of $f(x) = \sum e^x$ at $x = 0$ is $1$ for every element.
//!
//! ```rust
//! use clip_rs::tensor::Tensor;
//! use clip_rs::autograd::Variable;
//!
//! let x = Variable::new(Tensor::<f64, 2>::zeros([1, 3]));
//! let y = x.exp().sum();
//! y.backward().unwrap();
//!
//! let grad = x.grad().unwrap();
//! assert_eq!(grad.data(), &[1.0, 1.0, 1.0]);
//! ```
//!
//! # Gradient-free passes
//!
//! There is no global "no grad" switch. A pass that must not build a graph passes
//! [`GradMode::Disabled`] down to the code that produces `Variable`s, which then wraps
//! parameters with [`Variable::constant`] instead of sharing their gradient cells. Since none of
//! the inputs require gradients, no node is recorded anywhere in that pass.
//!
//! > [!TIP]
//! > **Expert Note: Wengert List (Tape)**
//! > This is a "Define-by-Run" scheme. The "tape" is implicitly formed by the `Rc<dyn GraphNode>`
//! > links between variables, so a graph lives exactly as long as the last `Variable` that can
//! > reach it. Dropping the loss of a mini-chunk frees that chunk's activations.

use crate::tensor::{FloatElem, Result, Tensor, TensorElem};
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

pub mod engine;
pub mod ops;

/// Shared, lazily initialised gradient storage of a `Variable`.
pub type GradCell<T, const RANK: usize> = Rc<RefCell<Option<Tensor<T, RANK>>>>;

/// Whether a forward pass records a computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradMode {
    /// Parameters participate with their gradient cells; backward is possible.
    Enabled,
    /// Parameters participate as constants; nothing is recorded.
    Disabled,
}

impl GradMode {
    pub const fn is_enabled(self) -> bool {
        matches!(self, GradMode::Enabled)
    }
}

/// A node in the computation graph.
///
/// This trait represents an operation that can be backpropagated through.
pub trait GraphNode: Debug {
    /// Reads the gradient of this node's output and adds the input gradients into the
    /// cells of its operands.
    fn backward(&self) -> Result<()>;
    /// Returns the nodes that produced the operands of this node.
    fn parents(&self) -> Vec<Rc<dyn GraphNode>>;
}

/// A variable in the computation graph.
///
/// Wraps a `Tensor` and tracks its gradient and the operation that created it.
#[derive(Clone, Debug)]
pub struct Variable<T, const RANK: usize>
where
    T: TensorElem,
{
    /// The actual tensor data.
    pub data: Tensor<T, RANK>,
    /// The gradient of the loss with respect to this variable.
    pub grad: GradCell<T, RANK>,
    /// The node in the computation graph that produced this variable.
    pub node: Option<Rc<dyn GraphNode>>,
    requires_grad: bool,
}

impl<T, const RANK: usize> Variable<T, RANK>
where
    T: TensorElem + 'static,
{
    /// Creates a new leaf variable that collects gradients.
    ///
    /// Leaf variables are the inputs to the computation graph (weights, `logit_scale`).
    /// They do not have a parent node.
    pub fn new(data: Tensor<T, RANK>) -> Self {
        Self {
            data,
            grad: Rc::new(RefCell::new(None)),
            node: None,
            requires_grad: true,
        }
    }

    /// Creates a leaf that never receives a gradient.
    ///
    /// Input batches, detached embeddings and parameters in a [`GradMode::Disabled`] pass are
    /// constants.
    pub fn constant(data: Tensor<T, RANK>) -> Self {
        Self {
            data,
            grad: Rc::new(RefCell::new(None)),
            node: None,
            requires_grad: false,
        }
    }

    /// Creates a new variable with an associated graph node.
    ///
    /// This is used by operations to create output variables.
    pub fn with_node(data: Tensor<T, RANK>, node: Rc<dyn GraphNode>, grad: GradCell<T, RANK>) -> Self {
        Self {
            data,
            grad,
            node: Some(node),
            requires_grad: true,
        }
    }

    /// Enters this variable into a pass with the given mode.
    ///
    /// With gradients enabled the returned variable shares this variable's gradient cell, so
    /// backward passes accumulate into it. With gradients disabled it is a constant copy.
    pub fn track(&self, mode: GradMode) -> Self {
        if mode.is_enabled() {
            self.clone()
        } else {
            Self::constant(self.data.clone())
        }
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// The gradient cell handed to a graph node, or `None` for constants.
    pub(crate) fn grad_cell(&self) -> Option<GradCell<T, RANK>> {
        self.requires_grad.then(|| self.grad.clone())
    }

    /// Returns a copy of the accumulated gradient, if any.
    pub fn grad(&self) -> Option<Tensor<T, RANK>> {
        self.grad.borrow().clone()
    }

    /// Clears the accumulated gradient.
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Triggers the backward pass starting from this variable.
    ///
    /// This variable is typically the loss value (a scalar).
    /// Its gradient is seeded with ones. Backward on a constant is a no-op.
    pub fn backward(&self) -> Result<()> {
        if !self.requires_grad {
            return Ok(());
        }
        if self.grad.borrow().is_none() {
            *self.grad.borrow_mut() = Some(Tensor::ones(*self.data.shape()));
        }

        engine::backward(self.node.clone())
    }
}

impl<T> Variable<T, 0>
where
    T: FloatElem,
{
    /// The value of a scalar variable.
    pub fn item(&self) -> T {
        self.data.item()
    }
}

/// Adds `grad` into `cell`, initialising it on first use.
pub(crate) fn accumulate<T, const RANK: usize>(cell: &GradCell<T, RANK>, grad: Tensor<T, RANK>) -> Result<()>
where
    T: TensorElem,
{
    let mut slot = cell.borrow_mut();
    match slot.as_mut() {
        Some(existing) => existing.add_assign(&grad)?,
        None => *slot = Some(grad),
    }
    Ok(())
}

/// Collects the creator nodes of the given variables.
pub(crate) fn parent_nodes(nodes: &[&Option<Rc<dyn GraphNode>>]) -> Vec<Rc<dyn GraphNode>> {
    nodes.iter().filter_map(|n| (*n).clone()).collect()
}
