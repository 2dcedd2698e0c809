use crate::Result;
use crate::tensor::{FloatElem, Tensor};

/// Abstraction for a distributed communication backend.
///
/// Every replica must call the same collectives in the same order with tensors of the same
/// width; a collective is a barrier for all replicas.
pub trait CollectiveBackend: Send + Sync {
    /// Returns the rank of the current process/thread.
    fn rank(&self) -> usize;

    /// Returns the total number of processes/threads.
    fn world_size(&self) -> usize;

    /// Performs an All-Reduce sum on the given tensor.
    ///
    /// Every replica receives the element-wise sum of all replicas' tensors.
    fn all_reduce_sum<T: FloatElem>(&self, tensor: &Tensor<T, 2>) -> Result<Tensor<T, 2>>;

    /// Collects one tensor from every replica.
    ///
    /// The result has `world_size` entries; entry `r` is the tensor contributed by rank `r`.
    fn all_gather<T: FloatElem>(&self, tensor: &Tensor<T, 2>) -> Result<Vec<Tensor<T, 2>>>;
}

/// The backend of a run with a single replica.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl CollectiveBackend for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn all_reduce_sum<T: FloatElem>(&self, tensor: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        Ok(tensor.clone())
    }

    fn all_gather<T: FloatElem>(&self, tensor: &Tensor<T, 2>) -> Result<Vec<Tensor<T, 2>>> {
        Ok(vec![tensor.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_process_identity() {
        let backend = SingleProcess;
        let t = Tensor::<f32, 2>::new(vec![1.0, 2.0], [1, 2]).unwrap();

        assert_eq!(backend.rank(), 0);
        assert_eq!(backend.world_size(), 1);
        assert_eq!(backend.all_reduce_sum(&t).unwrap(), t);

        let gathered = backend.all_gather(&t).unwrap();
        assert_eq!(gathered.len(), 1);
        assert_eq!(gathered[0], t);
    }
}
