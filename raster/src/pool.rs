//! The processor pool: worker threads, semaphores and the shared bin and
//! queue storage every pipeline stage runs against.
//!
//! One long-lived worker exists per CPU slot minus one; the thread calling
//! a draw/blit/clear entry point always participates as the last worker.
//! All shared state is either atomic or `UnsafeCell` storage with a strict
//! single-writer discipline (a thread only writes its own bin array, queue
//! and framebuffer row strip).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use glam::{Mat4, Vec4};
use raster_tasks::{Task, Worker};

use crate::buffer::{IndexBuffer, UniformBuffer, VertexBuffer};
use crate::color::Color;
use crate::framebuffer::FramebufferView;
use crate::mesh::{Mesh, RenderMode};
use crate::pipeline::blit::BlitProcessor;
use crate::pipeline::clear::{ClearProcessor, MAX_CLEAR_TARGETS};
use crate::pipeline::vertex::VertexProcessor;
use crate::pipeline::{FragQueue, FragmentBin, MAX_BINNED_PRIMS};
use crate::shader::Shader;
use crate::texture::TextureView;
use crate::vertex_array::VertexArray;

/// Pads hot atomics to their own cache line.
#[repr(align(64))]
struct CachePadded<T>(T);

/// A reusable spin barrier keyed by monotonic tickets, so threads racing
/// into the next cycle can never corrupt the current one.
struct SpinBarrier {
    total: u64,
    arrived: AtomicU64,
    released: AtomicU64,
}

impl SpinBarrier {
    fn new(total: usize) -> Self {
        Self {
            total: total as u64,
            arrived: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Blocks (spinning) until all `total` threads arrive. Returns `true`
    /// on exactly one thread per cycle: the last arriver.
    fn wait(&self) -> bool {
        let ticket = self.arrived.fetch_add(1, Ordering::AcqRel);
        let cycle = ticket / self.total;

        if ticket % self.total == self.total - 1 {
            self.released.fetch_add(1, Ordering::Release);
            true
        } else {
            while self.released.load(Ordering::Acquire) <= cycle {
                std::hint::spin_loop();
            }
            false
        }
    }
}

/// The cross-thread state of one pool configuration.
pub(crate) struct PoolShared {
    num_threads: usize,
    /// Threads still producing bins in the current draw.
    shade_active: CachePadded<AtomicI64>,
    /// Outstanding drain requests; nonzero summons every thread into a
    /// drain cycle.
    frag_active: CachePadded<AtomicI64>,
    barrier: SpinBarrier,
    /// Per-thread count of acquired bin slots. Only the owner increments.
    bins_used: Box<[CachePadded<AtomicU32>]>,
    /// Per-thread count of fully-written bins; release-published by the
    /// owner, acquire-read by every drainer.
    bins_ready: Box<[CachePadded<AtomicU32>]>,
    /// `num_threads * MAX_BINNED_PRIMS` bins; slot `i` of thread `t` is
    /// only written by `t`, and only read by others between a release
    /// publish and the next reset.
    bins: Box<[UnsafeCell<FragmentBin>]>,
    /// One fragment queue per thread; strictly thread-local.
    queues: Box<[UnsafeCell<FragQueue>]>,
}

// SAFETY: all shared fields are atomics or UnsafeCell storage governed by
// the single-writer rules documented on each field.
unsafe impl Send for PoolShared {}
unsafe impl Sync for PoolShared {}

impl PoolShared {
    fn new(num_threads: usize) -> Self {
        Self {
            num_threads,
            shade_active: CachePadded(AtomicI64::new(0)),
            frag_active: CachePadded(AtomicI64::new(0)),
            barrier: SpinBarrier::new(num_threads),
            bins_used: (0..num_threads)
                .map(|_| CachePadded(AtomicU32::new(0)))
                .collect(),
            bins_ready: (0..num_threads)
                .map(|_| CachePadded(AtomicU32::new(0)))
                .collect(),
            bins: (0..num_threads * MAX_BINNED_PRIMS)
                .map(|_| UnsafeCell::new(FragmentBin::EMPTY))
                .collect(),
            queues: (0..num_threads)
                .map(|_| UnsafeCell::new(FragQueue::new()))
                .collect(),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Resets every bin counter. Only called while no thread is binning.
    pub fn clear_bins(&self) {
        for t in 0..self.num_threads {
            self.bins_used[t].0.store(0, Ordering::Relaxed);
            self.bins_ready[t].0.store(0, Ordering::Release);
        }
    }

    pub fn begin_draw(&self) {
        self.shade_active
            .0
            .store(self.num_threads as i64, Ordering::SeqCst);
        self.frag_active.0.store(0, Ordering::SeqCst);
        self.clear_bins();
    }

    /// Grabs the next bin slot for `thread_id`, or `None` when the array
    /// is full and a flush is needed.
    pub fn try_acquire_bin(&self, thread_id: usize) -> Option<usize> {
        let slot = self.bins_used[thread_id].0.fetch_add(1, Ordering::AcqRel) as usize;
        (slot < MAX_BINNED_PRIMS).then_some(slot)
    }

    /// Exclusive access to an unpublished bin slot.
    ///
    /// # Safety
    ///
    /// `slot` must have been acquired by `thread_id` via
    /// [`try_acquire_bin`] and not yet published.
    ///
    /// [`try_acquire_bin`]: Self::try_acquire_bin
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bin_mut(&self, thread_id: usize, slot: usize) -> &mut FragmentBin {
        let cell = &self.bins[thread_id * MAX_BINNED_PRIMS + slot];
        // SAFETY: per the contract, only the owning thread touches an
        // unpublished slot.
        unsafe { &mut *cell.get() }
    }

    /// Makes the bin at `slot` visible to drainers. Slots of one thread
    /// fill sequentially, so the published count is `slot + 1`.
    pub fn publish_bin(&self, thread_id: usize, slot: usize) {
        self.bins_ready[thread_id]
            .0
            .store(slot as u32 + 1, Ordering::Release);
    }

    /// Shared access to a published bin.
    ///
    /// # Safety
    ///
    /// `slot` must be below the owner's published count and no drain reset
    /// may have happened since the publish was observed.
    pub unsafe fn bin(&self, owner: usize, slot: usize) -> &FragmentBin {
        let cell = &self.bins[owner * MAX_BINNED_PRIMS + slot];
        // SAFETY: published bins are immutable until the next reset.
        unsafe { &*cell.get() }
    }

    pub fn ready_count(&self, owner: usize) -> usize {
        self.bins_ready[owner].0.load(Ordering::Acquire) as usize
    }

    /// The calling thread's fragment queue.
    ///
    /// # Safety
    ///
    /// Only thread `thread_id` may call this, and not reentrantly.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn queue_mut(&self, thread_id: usize) -> &mut FragQueue {
        // SAFETY: queues are strictly thread-local per the contract.
        unsafe { &mut *self.queues[thread_id].get() }
    }

    /// Whether any thread has requested a drain cycle.
    pub fn flush_requested(&self) -> bool {
        self.frag_active.0.load(Ordering::Acquire) > 0
    }

    /// Summons every thread into a drain cycle.
    pub fn request_flush(&self) {
        self.frag_active.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Permanently retires the calling thread from bin production for the
    /// current draw.
    pub fn finish_producing(&self) {
        self.shade_active.0.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn producers_remaining(&self) -> i64 {
        self.shade_active.0.load(Ordering::SeqCst)
    }

    /// Rendezvous of all pool threads. Returns `true` on the last arriver.
    pub fn barrier_wait(&self) -> bool {
        self.barrier.wait()
    }

    /// Clears drain state so producers can resume binning. Must only run
    /// on one thread, between drain-completion and release barriers.
    pub fn reset_after_drain(&self) {
        self.clear_bins();
        self.frag_active.0.store(0, Ordering::SeqCst);
    }
}

/// A mesh with its vertex-array bindings resolved for the duration of a
/// draw.
#[derive(Copy, Clone)]
pub(crate) struct BoundMesh {
    pub mesh: Mesh,
    pub vao: *const VertexArray,
    pub vbo: *const VertexBuffer,
    /// Null when the mesh is non-indexed.
    pub ibo: *const IndexBuffer,
}

impl BoundMesh {
    pub fn vao(&self) -> &VertexArray {
        // SAFETY: resolved from the live registry; the draw call joins all
        // workers before anything is destroyed.
        unsafe { &*self.vao }
    }

    pub fn vbo(&self) -> &VertexBuffer {
        // SAFETY: as in `vao`.
        unsafe { &*self.vbo }
    }

    pub fn ibo(&self) -> Option<&IndexBuffer> {
        // SAFETY: as in `vao`.
        unsafe { self.ibo.as_ref() }
    }
}

/// Everything one draw call hands the vertex and fragment stages.
///
/// Raw pointers stand in for borrows because the record crosses thread
/// boundaries through the worker queues; `run_shader_processors` does not
/// return until every worker is done with it.
#[derive(Copy, Clone)]
pub(crate) struct DrawFrame {
    pub shader: *const Shader,
    pub uniforms: *const UniformBuffer,
    pub meshes: *const BoundMesh,
    pub num_meshes: usize,
    pub num_instances: usize,
    pub mode: RenderMode,
    pub fbo: FramebufferView,
    pub scissor: Mat4,
    pub viewport: Vec4,
}

// SAFETY: the pointed-to resources outlive the draw call, which joins all
// workers before returning.
unsafe impl Send for DrawFrame {}

impl DrawFrame {
    pub fn shader(&self) -> &Shader {
        // SAFETY: see the Send justification above.
        unsafe { &*self.shader }
    }

    pub fn uniforms(&self) -> &UniformBuffer {
        // SAFETY: see the Send justification above.
        unsafe { &*self.uniforms }
    }

    pub fn meshes(&self) -> &[BoundMesh] {
        // SAFETY: see the Send justification above.
        unsafe { std::slice::from_raw_parts(self.meshes, self.num_meshes) }
    }
}

/// A unit of work shipped to a pool worker.
pub(crate) enum ShaderProcessor {
    Vertex(VertexProcessor),
    Blit(BlitProcessor),
    Clear(ClearProcessor),
}

impl Task for ShaderProcessor {
    fn run(&mut self) {
        match self {
            Self::Vertex(task) => task.execute(),
            Self::Blit(task) => task.execute(),
            Self::Clear(task) => task.execute(),
        }
    }
}

/// The fixed worker set plus the shared pipeline storage.
pub(crate) struct ProcessorPool {
    shared: Box<PoolShared>,
    /// `num_threads - 1` workers; the caller is the last thread.
    workers: Vec<Worker<ShaderProcessor>>,
}

impl ProcessorPool {
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);

        let pool = Self {
            shared: Box::new(PoolShared::new(num_threads)),
            workers: (0..num_threads - 1).map(|_| Worker::new()).collect(),
        };

        tracing::info!(
            threads = num_threads,
            bins_per_thread = MAX_BINNED_PRIMS,
            queued_frags = crate::pipeline::MAX_QUEUED_FRAGS,
            bin_bytes = size_of::<FragmentBin>(),
            "processor pool configured"
        );

        pool
    }

    pub fn concurrency(&self) -> usize {
        self.shared.num_threads()
    }

    /// Resizes the pool, dropping and respawning workers and all
    /// per-thread storage. Clamped to at least one thread.
    pub fn set_concurrency(&mut self, num_threads: usize) -> usize {
        let num_threads = num_threads.max(1);
        if num_threads != self.concurrency() {
            *self = Self::new(num_threads);
        }
        num_threads
    }

    fn shared_ptr(&self) -> *const PoolShared {
        &*self.shared
    }

    /// Fans a task out to every worker, runs the last share inline and
    /// waits for the workers to finish.
    fn run<F>(&self, mut make_task: F)
    where
        F: FnMut(usize) -> ShaderProcessor,
    {
        for (thread_id, worker) in self.workers.iter().enumerate() {
            worker.push(make_task(thread_id));
            worker.flush();
        }

        let mut own = make_task(self.shared.num_threads() - 1);
        own.run();

        for worker in &self.workers {
            worker.wait();
        }
    }

    /// Runs the full vertex + fragment pipeline for one draw call. By the
    /// time this returns, every pixel is committed.
    pub fn run_shader_processors(&self, frame: &DrawFrame) {
        self.shared.begin_draw();

        let shared = self.shared_ptr();
        self.run(|thread_id| {
            ShaderProcessor::Vertex(VertexProcessor {
                thread_id,
                num_threads: self.shared.num_threads(),
                shared,
                frame: *frame,
            })
        });
    }

    /// Copies (and type-converts) a rectangle of `src` into `dst` across
    /// all threads.
    pub fn run_blit_processors(
        &self,
        src: TextureView,
        dst: TextureView,
        src_rect: [u16; 4],
        dst_rect: [u16; 4],
    ) {
        self.run(|thread_id| {
            ShaderProcessor::Blit(BlitProcessor {
                thread_id,
                num_threads: self.shared.num_threads(),
                src,
                dst,
                src_rect,
                dst_rect,
            })
        });
    }

    /// Fills up to [`MAX_CLEAR_TARGETS`] attachments with typed clear
    /// values across all threads.
    pub fn run_clear_processors(&self, targets: [Option<(TextureView, Color)>; MAX_CLEAR_TARGETS]) {
        self.run(|thread_id| {
            ShaderProcessor::Clear(ClearProcessor {
                thread_id,
                num_threads: self.shared.num_threads(),
                targets,
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{PoolShared, SpinBarrier};
    use crate::pipeline::MAX_BINNED_PRIMS;

    #[test]
    fn spin_barrier_elects_one_leader_per_cycle() {
        let barrier = Arc::new(SpinBarrier::new(4));
        let leaders = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = barrier.clone();
                let leaders = leaders.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if barrier.wait() {
                            leaders.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(leaders.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn bin_acquisition_overflows_at_capacity() {
        let shared = PoolShared::new(1);

        for slot in 0..MAX_BINNED_PRIMS {
            assert_eq!(shared.try_acquire_bin(0), Some(slot));
        }
        assert_eq!(shared.try_acquire_bin(0), None);

        shared.clear_bins();
        assert_eq!(shared.try_acquire_bin(0), Some(0));
    }

    #[test]
    fn publish_makes_bins_visible() {
        let shared = PoolShared::new(2);
        assert_eq!(shared.ready_count(0), 0);

        let slot = shared.try_acquire_bin(0).unwrap();
        // SAFETY: slot is unpublished and this test is single-threaded.
        unsafe { shared.bin_mut(0, slot) }.prim_index = 42;
        shared.publish_bin(0, slot);

        assert_eq!(shared.ready_count(0), 1);
        assert_eq!(shared.ready_count(1), 0);
        // SAFETY: published above.
        assert_eq!(unsafe { shared.bin(0, slot) }.prim_index, 42);
    }
}
