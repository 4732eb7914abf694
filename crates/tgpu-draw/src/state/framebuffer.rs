use std::cell::Cell;
use std::rc::Rc;

use crate::bo::{BoHandle, BoRef};
use crate::job::ClearBuffers;

/// A render target view. `reload` records which of its contents must be read back before
/// the next job renders to it.
#[derive(Debug)]
pub struct Surface {
    pub bo: BoRef,
    pub width: u32,
    pub height: u32,
    pub reload: Cell<ClearBuffers>,
}

pub type SurfaceRef = Rc<Surface>;

impl Surface {
    pub fn new(bo: BoRef, width: u32, height: u32) -> SurfaceRef {
        Rc::new(Self {
            bo,
            width,
            height,
            reload: Cell::new(ClearBuffers::empty()),
        })
    }
}

/// Identifies the render targets a job draws into; one job is open per key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FramebufferKey {
    pub cbuf: Option<BoHandle>,
    pub zsbuf: Option<BoHandle>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Default)]
pub struct FramebufferState {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub cbuf: Option<SurfaceRef>,
    pub zsbuf: Option<SurfaceRef>,
}

impl FramebufferState {
    pub fn key(&self) -> FramebufferKey {
        FramebufferKey {
            cbuf: self.cbuf.as_ref().map(|s| s.bo.handle()),
            zsbuf: self.zsbuf.as_ref().map(|s| s.bo.handle()),
            width: self.width,
            height: self.height,
        }
    }

    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }
}
