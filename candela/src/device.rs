use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use glam::{uvec2, UVec2};
use log::{debug, trace};
use rayon::prelude::*;

use crate::{Buffer, Error, Result, StorageBuffer};

#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceDescriptor {
    /// Number of worker threads; defaults to the number of CPUs.
    pub threads: Option<usize>,

    /// Maximum number of bytes all live buffers and textures can take.
    pub memory_budget: Option<usize>,
}

/// Compute device that runs kernels in wide parallel batches.
///
/// Each dispatch is a batch of independent work items executed in no
/// particular order; a dispatch returns only after all of its items have
/// finished, which acts as the barrier between consecutive stages.
pub struct Device {
    pool: rayon::ThreadPool,
    memory_budget: Option<usize>,
    allocated: Arc<AtomicUsize>,
}

impl Device {
    pub fn new(desc: DeviceDescriptor) -> Result<Self> {
        let mut pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|idx| format!("candela-worker-{idx}"));

        if let Some(threads) = desc.threads {
            pool = pool.num_threads(threads);
        }

        let pool = pool.build().map_err(|err| Error::ResourceCreation {
            label: "thread pool".into(),
            reason: err.to_string(),
        })?;

        debug!(
            "Device created; threads={}, memory_budget={:?}",
            pool.current_num_threads(),
            desc.memory_budget,
        );

        Ok(Self {
            pool,
            memory_budget: desc.memory_budget,
            allocated: Default::default(),
        })
    }

    /// Returns the number of bytes taken by live buffers and textures.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Reserves zeroed memory for `len` words, failing when that would
    /// exceed the memory budget.
    pub(crate) fn allocate(
        &self,
        label: &str,
        len: usize,
    ) -> Result<(Box<[AtomicU32]>, Allocation)> {
        let bytes = len * 4;
        let prev = self.allocated.fetch_add(bytes, Ordering::AcqRel);

        let allocation = Allocation {
            allocated: Arc::clone(&self.allocated),
            bytes,
        };

        if let Some(budget) = self.memory_budget {
            if prev + bytes > budget {
                return Err(Error::ResourceCreation {
                    label: label.into(),
                    reason: format!(
                        "{bytes} bytes requested, but only {} left in the \
                         budget",
                        budget.saturating_sub(prev),
                    ),
                });
            }
        }

        let mut words = Vec::new();

        words
            .try_reserve_exact(len)
            .map_err(|err| Error::ResourceCreation {
                label: label.into(),
                reason: err.to_string(),
            })?;

        words.extend((0..len).map(|_| AtomicU32::new(0)));

        Ok((words.into_boxed_slice(), allocation))
    }

    /// Runs `kernel` once for each index in `0..count`.
    pub fn dispatch<F>(&self, label: &str, count: u32, kernel: F)
    where
        F: Fn(u32) + Send + Sync,
    {
        let tt = Instant::now();

        self.pool.install(|| {
            (0..count).into_par_iter().for_each(&kernel);
        });

        trace!("Dispatched `{label}`; count={count}, took={:?}", tt.elapsed());
    }

    /// Runs `kernel` once for each position in a `size.x * size.y` grid.
    pub fn dispatch_2d<F>(&self, label: &str, size: UVec2, kernel: F)
    where
        F: Fn(UVec2) + Send + Sync,
    {
        self.dispatch(label, size.x * size.y, |idx| {
            kernel(uvec2(idx % size.x, idx / size.x));
        });
    }

    /// Runs `kernel` once for each index in `0..count`, where `count` is the
    /// first word of given buffer, read when the dispatch starts.
    pub fn dispatch_indirect<F>(
        &self,
        label: &str,
        count: &StorageBuffer,
        max: u32,
        kernel: F,
    ) where
        F: Fn(u32) + Send + Sync,
    {
        let count = count.view().load(0).min(max);

        self.dispatch(label, count, kernel);
    }

    /// Writes the exclusive prefix sum of the first `len` words of `src` into
    /// `dst`.
    pub fn scan(&self, src: &StorageBuffer, dst: &StorageBuffer, len: usize) {
        let tt = Instant::now();
        let (src_view, dst_view) = (src.view(), dst.view());

        // Two-level scan: each chunk gets summed in parallel, then chunks get
        // offset by the totals of the chunks before them
        const CHUNK: usize = 4096;

        let chunks = (len + CHUNK - 1) / CHUNK;

        let totals: Vec<u32> = self.pool.install(|| {
            (0..chunks)
                .into_par_iter()
                .map(|chunk| {
                    let range = chunk * CHUNK..((chunk + 1) * CHUNK).min(len);
                    let mut sum = 0u32;

                    for idx in range {
                        let val = src_view.load(idx);

                        dst_view.store(idx, sum);
                        sum = sum.wrapping_add(val);
                    }

                    sum
                })
                .collect()
        });

        let mut offset = 0u32;

        let offsets: Vec<u32> = totals
            .iter()
            .map(|total| {
                let chunk_offset = offset;

                offset = offset.wrapping_add(*total);
                chunk_offset
            })
            .collect();

        self.pool.install(|| {
            offsets.par_iter().enumerate().skip(1).for_each(
                |(chunk, chunk_offset)| {
                    let range = chunk * CHUNK..((chunk + 1) * CHUNK).min(len);

                    for idx in range {
                        dst_view.store(
                            idx,
                            dst_view.load(idx).wrapping_add(*chunk_offset),
                        );
                    }
                },
            );
        });

        trace!(
            "Scanned `{}` into `{}`; len={len}, took={:?}",
            src.label(),
            dst.label(),
            tt.elapsed()
        );
    }

    /// Copies contents of `src` into `dst`; both must be of the same length.
    pub fn copy(&self, src: &impl Buffer, dst: &impl Buffer) {
        let (src_words, dst_words) = (src.words(), dst.words());

        assert_eq!(
            src_words.len(),
            dst_words.len(),
            "cannot copy `{}` into `{}`",
            src.label(),
            dst.label()
        );

        self.pool.install(|| {
            src_words
                .par_iter()
                .zip(dst_words.par_iter())
                .for_each(|(src, dst)| {
                    dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
                });
        });
    }

    /// Sets all words of given buffer to zero.
    pub fn clear(&self, buffer: &impl Buffer) {
        self.fill(buffer, 0);
    }

    pub fn fill(&self, buffer: &impl Buffer, val: u32) {
        let words = buffer.words();

        self.pool.install(|| {
            words.par_iter().for_each(|word| {
                word.store(val, Ordering::Relaxed);
            });
        });
    }
}

/// Share of the device's memory budget taken by a single buffer; given back
/// when dropped.
#[derive(Debug)]
pub(crate) struct Allocation {
    allocated: Arc<AtomicUsize>,
    bytes: usize,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.allocated.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
