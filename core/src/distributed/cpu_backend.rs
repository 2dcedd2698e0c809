use super::backend::CollectiveBackend;
use crate::tensor::{FloatElem, Tensor, elem_from_f64};
use crate::{Error, Result};
use crossbeam::channel::{Receiver, Sender, unbounded};
use tracing::trace;

/// A message travelling around the ring.
///
/// Payloads are widened to `f64` so that one channel type serves every float element type;
/// `f32 -> f64 -> f32` is exact.
#[derive(Debug)]
struct Packet {
    /// Rank whose data this is.
    origin: usize,
    shape: [usize; 2],
    data: Vec<f64>,
}

/// A CPU-based collective backend.
///
/// Implements **Ring All-Reduce** and **Ring All-Gather** over `crossbeam` channels. Each
/// replica runs on its own thread and only talks to its neighbours: it receives from
/// `rank - 1` and sends to `rank + 1` (mod `world_size`). After `world_size - 1` hops every
/// piece of data has visited every replica.
pub struct CpuBackend {
    rank: usize,
    world_size: usize,
    left_rx: Receiver<Packet>,
    right_tx: Sender<Packet>,
}

impl CpuBackend {
    /// Builds `world_size` backends wired into a ring. Entry `r` has rank `r`; move each one
    /// into its replica's thread.
    pub fn ring(world_size: usize) -> Vec<CpuBackend> {
        let world_size = world_size.max(1);
        // Channel r carries data from rank r to rank r + 1.
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..world_size).map(|_| unbounded::<Packet>()).unzip();

        let mut receivers: Vec<Option<Receiver<Packet>>> = receivers.into_iter().map(Some).collect();
        (0..world_size)
            .map(|rank| {
                let left = (rank + world_size - 1) % world_size;
                CpuBackend {
                    rank,
                    world_size,
                    left_rx: receivers[left].take().unwrap_or_else(|| unbounded().1),
                    right_tx: senders[rank].clone(),
                }
            })
            .collect()
    }

    fn send(&self, packet: Packet) -> Result<()> {
        self.right_tx
            .send(packet)
            .map_err(|e| Error::Collective(format!("rank {}: send failed: {e}", self.rank)))
    }

    fn recv(&self) -> Result<Packet> {
        self.left_rx
            .recv()
            .map_err(|e| Error::Collective(format!("rank {}: receive failed: {e}", self.rank)))
    }

    /// Rank `self.rank - offset` on the ring.
    fn rank_behind(&self, offset: usize) -> usize {
        (self.rank + self.world_size - offset % self.world_size) % self.world_size
    }
}

fn widen<T: FloatElem>(data: &[T]) -> Result<Vec<f64>> {
    data.iter()
        .map(|x| {
            x.to_f64()
                .ok_or_else(|| Error::Collective(format!("{x:?} does not fit in f64")))
        })
        .collect()
}

fn narrow<T: FloatElem>(data: &[f64]) -> Vec<T> {
    data.iter().map(|&x| elem_from_f64(x)).collect()
}

impl CollectiveBackend for CpuBackend {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_reduce_sum<T: FloatElem>(&self, tensor: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        let mut data = widen(tensor.data())?;
        let total_elements = data.len();
        let chunk_size = total_elements.div_ceil(self.world_size);
        let chunk_range = |idx: usize| {
            let start = (idx * chunk_size).min(total_elements);
            start..(start + chunk_size).min(total_elements)
        };

        // --- Phase 1: Scatter-Reduce ---
        // Rank r sends chunk (r - step) and adds the incoming chunk (r - step - 1) into its buffer.
        // Afterwards rank r owns the fully reduced chunk (r + 1).
        for step in 0..self.world_size - 1 {
            let send = chunk_range(self.rank_behind(step));
            self.send(Packet {
                origin: self.rank,
                shape: [1, send.len()],
                data: data[send].to_vec(),
            })?;

            let packet = self.recv()?;
            let recv = chunk_range(self.rank_behind(step + 1));
            if packet.data.len() != recv.len() {
                return Err(Error::Collective(format!(
                    "rank {}: all_reduce chunk of {} elements from rank {}, expected {}",
                    self.rank,
                    packet.data.len(),
                    packet.origin,
                    recv.len()
                )));
            }
            for (d, v) in data[recv].iter_mut().zip(packet.data) {
                *d += v;
            }
        }

        // --- Phase 2: All-Gather ---
        // Circulate the reduced chunks so everyone ends with the full sum.
        for step in 0..self.world_size - 1 {
            let send = chunk_range((self.rank + 1 + self.world_size - step % self.world_size) % self.world_size);
            self.send(Packet {
                origin: self.rank,
                shape: [1, send.len()],
                data: data[send].to_vec(),
            })?;

            let packet = self.recv()?;
            let recv = chunk_range(self.rank_behind(step));
            if packet.data.len() != recv.len() {
                return Err(Error::Collective(format!(
                    "rank {}: all_reduce chunk of {} elements from rank {}, expected {}",
                    self.rank,
                    packet.data.len(),
                    packet.origin,
                    recv.len()
                )));
            }
            data[recv].copy_from_slice(&packet.data);
        }

        trace!(rank = self.rank, elements = total_elements, "all_reduce_sum done");
        Ok(Tensor::new(narrow(&data), *tensor.shape())?)
    }

    fn all_gather<T: FloatElem>(&self, tensor: &Tensor<T, 2>) -> Result<Vec<Tensor<T, 2>>> {
        let mut slots: Vec<Option<Tensor<T, 2>>> = vec![None; self.world_size];
        slots[self.rank] = Some(tensor.clone());

        // At step s, forward what arrived from rank (r - s) and receive rank (r - s - 1)'s data.
        let mut outgoing = Packet {
            origin: self.rank,
            shape: *tensor.shape(),
            data: widen(tensor.data())?,
        };
        for _ in 0..self.world_size - 1 {
            let forward = Packet {
                origin: outgoing.origin,
                shape: outgoing.shape,
                data: outgoing.data.clone(),
            };
            self.send(forward)?;

            let packet = self.recv()?;
            if packet.origin >= self.world_size || slots[packet.origin].is_some() {
                return Err(Error::Collective(format!(
                    "rank {}: unexpected all_gather packet from rank {}",
                    self.rank, packet.origin
                )));
            }
            if packet.shape[1] != tensor.cols() {
                return Err(Error::Collective(format!(
                    "rank {}: rank {} contributed {} columns, expected {}",
                    self.rank,
                    packet.origin,
                    packet.shape[1],
                    tensor.cols()
                )));
            }
            slots[packet.origin] = Some(Tensor::new(narrow(&packet.data), packet.shape)?);
            outgoing = packet;
        }

        trace!(rank = self.rank, world_size = self.world_size, "all_gather done");
        slots
            .into_iter()
            .enumerate()
            .map(|(rank, slot)| {
                slot.ok_or_else(|| Error::Collective(format!("no data from rank {rank}")))
            })
            .collect()
    }
}
