//! Shadow model for randomized heap tests
//!
//! Tracks what every live allocation should contain and checks the heap
//! against it after each step.

use std::vec::Vec;

use proptest::prelude::*;

use crate::backend::block::blocks_for;
use crate::backend::fit::{BestFit, FirstFit, FitStrategy};
use crate::backend::heap::Heap;
use crate::config::{Config, PoisonConfig};
use crate::error::HeapError;
use crate::{Allocator, Handle};

struct Live {
    handle: Handle,
    data: Vec<u8>,
}

struct ShadowHeap {
    live: Vec<Live>,
    stamp: u8,
}

impl ShadowHeap {
    pub fn new() -> Self {
        Self {
            live: Vec::new(),
            stamp: 0,
        }
    }

    fn next_stamp(&mut self) -> u8 {
        self.stamp = self.stamp.wrapping_add(1);
        self.stamp
    }

    fn fill<S: FitStrategy>(
        &mut self,
        heap: &mut Heap<'_, S>,
        handle: Handle,
        from: usize,
        to: usize,
    ) -> Vec<u8> {
        let seed = self.next_stamp();
        let bytes = heap.get_mut(handle).unwrap();
        for (i, b) in bytes[from..to].iter_mut().enumerate() {
            *b = seed.wrapping_add(i as u8);
        }
        bytes[..to].to_vec()
    }

    pub fn allocate<S: FitStrategy>(&mut self, heap: &mut Heap<'_, S>, size: usize) {
        match heap.allocate(size) {
            Ok(handle) => {
                let data = self.fill(heap, handle, 0, size);
                self.live.push(Live { handle, data });
            }
            Err(HeapError::OutOfMemory { .. }) => {}
            Err(e) => panic!("allocate({size}) failed: {e}"),
        }
    }

    pub fn free<S: FitStrategy>(&mut self, heap: &mut Heap<'_, S>, pick: usize) {
        if self.live.is_empty() {
            return;
        }
        let entry = self.live.swap_remove(pick % self.live.len());
        heap.free(entry.handle).unwrap();
        assert!(heap.get(entry.handle).is_none());
    }

    pub fn resize<S: FitStrategy>(&mut self, heap: &mut Heap<'_, S>, pick: usize, size: usize) {
        if self.live.is_empty() {
            return;
        }
        let i = pick % self.live.len();
        let old = self.live[i].handle;
        let old_len = self.live[i].data.len();

        match heap.resize(old, size) {
            Ok(handle) => {
                let keep = old_len.min(size);
                assert_eq!(&heap.get(handle).unwrap()[..keep], &self.live[i].data[..keep]);
                if size <= old_len {
                    assert_eq!(handle, old);
                }
                let data = if size > keep {
                    self.fill(heap, handle, keep, size)
                } else {
                    heap.get(handle).unwrap()[..size].to_vec()
                };
                self.live[i] = Live { handle, data };
            }
            Err(HeapError::OutOfMemory { .. }) => {
                assert_eq!(&heap.get(old).unwrap()[..old_len], &self.live[i].data[..]);
            }
            Err(e) => panic!("resize({size}) failed: {e}"),
        }
    }

    /// Checks structure, exact block lengths and contents
    pub fn verify<S: FitStrategy>(&self, heap: &Heap<'_, S>) {
        heap.check_integrity().unwrap();
        assert_eq!(heap.len(), self.live.len());
        assert_eq!(heap.info().used_entries, self.live.len());

        let overhead = heap.config().overhead();
        for entry in &self.live {
            let len = entry.data.len();
            assert_eq!(heap.block_len(entry.handle), blocks_for(len + overhead));
            assert_eq!(&heap.get(entry.handle).unwrap()[..len], &entry.data[..]);
        }
    }

    pub fn drain<S: FitStrategy>(&mut self, heap: &mut Heap<'_, S>) {
        for entry in self.live.drain(..) {
            heap.free(entry.handle).unwrap();
        }
    }
}

#[derive(Clone, Debug)]
enum Op {
    Allocate(usize),
    Free(usize),
    Resize(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..160).prop_map(Op::Allocate),
        2 => any::<usize>().prop_map(Op::Free),
        2 => (any::<usize>(), 1usize..240).prop_map(|(i, n)| Op::Resize(i, n)),
    ]
}

fn run<S: FitStrategy>(ops: &[Op], config: Config) {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut arena = [0u8; 2048];
    let mut heap: Heap<'_, S> = Heap::with_strategy(&mut arena, config).unwrap();
    let initial = heap.info();
    let mut shadow = ShadowHeap::new();

    for op in ops {
        match *op {
            Op::Allocate(n) => shadow.allocate(&mut heap, n),
            Op::Free(i) => shadow.free(&mut heap, i),
            Op::Resize(i, n) => shadow.resize(&mut heap, i, n),
        }
        shadow.verify(&heap);
    }

    shadow.drain(&mut heap);
    assert_eq!(heap.info(), initial);
    assert!(heap.is_empty());
}

proptest! {
    #[test]
    fn random_ops_best_fit(ops in prop::collection::vec(op(), 1..120)) {
        run::<BestFit>(&ops, Config::PLAIN.with_integrity_check(true));
    }

    #[test]
    fn random_ops_first_fit(ops in prop::collection::vec(op(), 1..120)) {
        run::<FirstFit>(&ops, Config::PLAIN.with_integrity_check(true));
    }

    #[test]
    fn random_ops_poisoned(ops in prop::collection::vec(op(), 1..120)) {
        run::<BestFit>(
            &ops,
            Config::PLAIN
                .with_integrity_check(true)
                .with_poison(PoisonConfig::DEFAULT),
        );
    }
}
