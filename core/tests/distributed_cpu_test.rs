use clip_rs::distributed::{CollectiveBackend, CpuBackend};
use clip_rs::tensor::Tensor;
use std::thread;

#[test]
fn test_ring_all_reduce_cpu() {
    let world_size = 4;
    let mut handles = vec![];

    for backend in CpuBackend::ring(world_size) {
        let handle = thread::spawn(move || {
            let rank = backend.rank();

            // Rank 0 has 1s, Rank 1 has 2s, etc.
            // Sum should be 1+2+3+4 = 10.
            let data = vec![(rank + 1) as f32; 8];
            let tensor = Tensor::<f32, 2>::new(data, [2, 4]).unwrap();

            let result = backend.all_reduce_sum(&tensor).unwrap();

            assert_eq!(result.shape(), &[2, 4]);
            for &val in result.data() {
                assert!((val - 10.0).abs() < 1e-5, "Rank {rank}: expected 10, got {val}");
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_ring_all_reduce_uneven_split() {
    // 7 elements over 3 ranks: segments of 3, 2 and 2.
    let world_size = 3;
    let handles: Vec<_> = CpuBackend::ring(world_size)
        .into_iter()
        .map(|backend| {
            thread::spawn(move || {
                let rank = backend.rank() as f64;
                let tensor = Tensor::new((0..7).map(|i| i as f64 * (rank + 1.0)).collect(), [1, 7]).unwrap();
                backend.all_reduce_sum(&tensor).unwrap()
            })
        })
        .collect();

    let expected: Vec<f64> = (0..7).map(|i| i as f64 * 6.0).collect();
    for handle in handles {
        let result = handle.join().unwrap();
        assert_eq!(result.data(), expected.as_slice());
    }
}

#[test]
fn test_ring_all_gather_preserves_rank_order() {
    let world_size = 3;
    let handles: Vec<_> = CpuBackend::ring(world_size)
        .into_iter()
        .map(|backend| {
            thread::spawn(move || {
                let rank = backend.rank();
                // Different row counts per rank, same width.
                let rows = rank + 1;
                let tensor = Tensor::<f32, 2>::full([rows, 2], rank as f32);
                backend.all_gather(&tensor).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let gathered = handle.join().unwrap();
        assert_eq!(gathered.len(), world_size);
        for (origin, part) in gathered.iter().enumerate() {
            assert_eq!(part.shape(), &[origin + 1, 2]);
            assert!(part.data().iter().all(|&v| v == origin as f32));
        }
    }
}

#[test]
fn test_collectives_can_be_interleaved() {
    let handles: Vec<_> = CpuBackend::ring(2)
        .into_iter()
        .map(|backend| {
            thread::spawn(move || {
                let rank = backend.rank() as f64;
                let embeds = Tensor::full([2, 3], rank);
                let gathered = Tensor::concat_rows(&backend.all_gather(&embeds).unwrap()).unwrap();
                let grad = Tensor::full([1, 2], rank + 1.0);
                let summed = backend.all_reduce_sum(&grad).unwrap();
                (gathered, summed)
            })
        })
        .collect();

    for handle in handles {
        let (gathered, summed) = handle.join().unwrap();
        assert_eq!(gathered.data(), &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(summed.data(), &[3.0, 3.0]);
    }
}
