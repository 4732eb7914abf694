//! Per-framebuffer jobs and the write-hazard bookkeeping between them.
//!
//! A job accumulates every draw and clear aimed at one set of render targets. It holds the GP
//! and PLBU command streams, the buffer objects each pipe touches and the screen area that was
//! drawn. Jobs are flushed to the submit queue when another job needs to see their results, when
//! a clear follows a draw, or on an explicit [`crate::Context::flush`].

use bitflags::bitflags;
use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::bo::{BoHandle, BoRef};
use crate::cmd::{CmdStream, PlbuCmd};
use crate::rect::Rect;
use crate::state::{FramebufferKey, FramebufferState, SurfaceRef};

bitflags! {
    /// Render target planes, as cleared, resolved or reloaded.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ClearBuffers: u8 {
        const DEPTH = 1 << 0;
        const STENCIL = 1 << 1;
        const COLOR0 = 1 << 2;
    }
}

impl ClearBuffers {
    pub const DEPTH_STENCIL: Self = Self::DEPTH.union(Self::STENCIL);
}

bitflags! {
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BoAccess: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// Hardware unit a buffer reference belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pipe {
    /// Geometry processor: vertex shading and polygon list building.
    Gp,
    /// Pixel processor: fragment shading and tile write-back.
    Pp,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

#[derive(Clone, Debug)]
pub struct JobBo {
    pub bo: BoRef,
    pub access: BoAccess,
}

/// Clear values, applied before the first draw of the job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobClear {
    pub buffers: ClearBuffers,
    /// RGBA8, red in the low byte.
    pub color_8pc: u32,
    /// RGBA16, red in the low half-word.
    pub color_16pc: u64,
    /// 24-bit unorm depth.
    pub depth: u32,
    pub stencil: u32,
}

#[derive(Debug)]
pub struct Job {
    id: JobId,
    key: FramebufferKey,
    cbuf: Option<SurfaceRef>,
    zsbuf: Option<SurfaceRef>,
    pub vs_cmd: CmdStream,
    pub plbu_cmd: CmdStream,
    gp_bos: Vec<JobBo>,
    pp_bos: Vec<JobBo>,
    pub damage: Rect,
    /// Planes written by this job that must reach memory.
    pub resolve: ClearBuffers,
    pub clear: JobClear,
    /// Planes read back from memory before rendering, fixed at submission.
    pub reload: ClearBuffers,
    pub pp_max_stack_size: u32,
    pub draws: u32,
}

impl Job {
    fn new(id: JobId, fb: &FramebufferState) -> Self {
        Self {
            id,
            key: fb.key(),
            cbuf: fb.cbuf.clone(),
            zsbuf: fb.zsbuf.clone(),
            vs_cmd: CmdStream::new(),
            plbu_cmd: CmdStream::new(),
            gp_bos: Vec::new(),
            pp_bos: Vec::new(),
            damage: Rect::EMPTY,
            resolve: ClearBuffers::empty(),
            clear: JobClear::default(),
            reload: ClearBuffers::empty(),
            pp_max_stack_size: 0,
            draws: 0,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn key(&self) -> &FramebufferKey {
        &self.key
    }

    pub fn has_draw_pending(&self) -> bool {
        !self.plbu_cmd.is_empty()
    }

    /// Reference `bo` from `pipe`. Repeated references merge their access.
    pub fn add_bo(&mut self, pipe: Pipe, bo: &BoRef, access: BoAccess) {
        let list = match pipe {
            Pipe::Gp => &mut self.gp_bos,
            Pipe::Pp => &mut self.pp_bos,
        };
        match list.iter_mut().find(|e| e.bo.handle() == bo.handle()) {
            Some(entry) => entry.access |= access,
            None => list.push(JobBo {
                bo: bo.clone(),
                access,
            }),
        }
    }

    pub fn bos(&self, pipe: Pipe) -> &[JobBo] {
        match pipe {
            Pipe::Gp => &self.gp_bos,
            Pipe::Pp => &self.pp_bos,
        }
    }

    /// Combined access of both pipes to `handle`.
    pub fn access(&self, handle: BoHandle) -> BoAccess {
        self.gp_bos
            .iter()
            .chain(self.pp_bos.iter())
            .filter(|e| e.bo.handle() == handle)
            .fold(BoAccess::empty(), |acc, e| acc | e.access)
    }

    fn is_empty(&self) -> bool {
        !self.has_draw_pending() && self.clear.buffers.is_empty()
    }
}

/// Open jobs keyed by framebuffer, the last job to write each buffer, and the submit queue.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: HashMap<FramebufferKey, Job>,
    writers: HashMap<BoHandle, JobId>,
    submitted: Vec<Job>,
    next_id: u64,
    submitted_total: u64,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The open job for `fb`, created on first use.
    pub fn current(&mut self, fb: &FramebufferState) -> &mut Job {
        let key = fb.key();
        let next_id = &mut self.next_id;
        self.jobs.entry(key).or_insert_with(|| {
            let id = JobId(*next_id);
            *next_id += 1;
            trace!(job = id.0, "new job");
            Job::new(id, fb)
        })
    }

    pub fn job(&self, key: &FramebufferKey) -> Option<&Job> {
        self.jobs.get(key)
    }

    pub fn open_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Record the job for `fb` as the last writer of `bo`.
    pub fn set_writer(&mut self, bo: BoHandle, fb: &FramebufferState) {
        let id = self.current(fb).id;
        self.writers.insert(bo, id);
    }

    pub fn writer(&self, bo: BoHandle) -> Option<JobId> {
        self.writers.get(&bo).copied()
    }

    /// Flush every open job that writes `bo`, or that touches it at all when `any_access`.
    pub fn flush_accessing_bo(&mut self, bo: BoHandle, any_access: bool) {
        let mut keys: Vec<(JobId, FramebufferKey)> = self
            .jobs
            .iter()
            .filter(|(_, job)| {
                let access = job.access(bo);
                if any_access {
                    !access.is_empty()
                } else {
                    access.contains(BoAccess::WRITE)
                }
            })
            .map(|(key, job)| (job.id, *key))
            .collect();
        keys.sort_unstable_by_key(|(id, _)| *id);
        for (_, key) in keys {
            self.flush_key(&key);
        }
    }

    /// Flush the job that last wrote `bo`, if it is still open.
    pub fn flush_previous_write_job(&mut self, bo: BoHandle) {
        let Some(id) = self.writers.get(&bo).copied() else {
            return;
        };
        let key = self
            .jobs
            .iter()
            .find(|(_, job)| job.id == id)
            .map(|(key, _)| *key);
        if let Some(key) = key {
            self.flush_key(&key);
        }
    }

    /// Flush the open job for `fb`, if any.
    pub fn flush_current(&mut self, fb: &FramebufferState) {
        self.flush_key(&fb.key());
    }

    /// Flush every open job, oldest first.
    pub fn flush_all(&mut self) {
        let mut keys: Vec<(JobId, FramebufferKey)> =
            self.jobs.iter().map(|(key, job)| (job.id, *key)).collect();
        keys.sort_unstable_by_key(|(id, _)| *id);
        for (_, key) in keys {
            self.flush_key(&key);
        }
    }

    fn flush_key(&mut self, key: &FramebufferKey) {
        let Some(mut job) = self.jobs.remove(key) else {
            return;
        };
        let id = job.id;
        self.writers.retain(|_, writer| *writer != id);

        if job.is_empty() {
            trace!(job = id.0, "dropping empty job");
            return;
        }

        if job.has_draw_pending() {
            job.plbu_cmd.push(PlbuCmd::End);
        }

        if let Some(surf) = &job.cbuf {
            job.reload |= surf.reload.get() & ClearBuffers::COLOR0;
            if job.resolve.contains(ClearBuffers::COLOR0) {
                surf.reload.set(surf.reload.get() | ClearBuffers::COLOR0);
            }
        }
        if let Some(surf) = &job.zsbuf {
            job.reload |= surf.reload.get() & ClearBuffers::DEPTH_STENCIL;
            let resolved = job.resolve & ClearBuffers::DEPTH_STENCIL;
            surf.reload.set(surf.reload.get() | resolved);
        }
        // Cleared planes are written by the clear, never read back.
        job.reload -= job.clear.buffers;

        debug!(
            job = id.0,
            draws = job.draws,
            gp_bos = job.gp_bos.len(),
            pp_bos = job.pp_bos.len(),
            clear = ?job.clear.buffers,
            "submitting job"
        );
        self.submitted_total += 1;
        self.submitted.push(job);
    }

    /// Drain jobs flushed since the last call, in submission order.
    pub fn take_submitted(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.submitted)
    }

    pub fn submitted_total(&self) -> u64 {
        self.submitted_total
    }
}
