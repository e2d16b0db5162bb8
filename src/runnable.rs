// edgert: Runnable interface
// A runnable is a pure periodic computation with explicit input/output label
// sets and init/deinit hooks. The engine copies label values into the spec's
// staging buffers before each job and publishes the output buffers after.

use crate::error::RtResult;
use crate::labels::{LabelId, LabelStore};
use smallvec::SmallVec;

/// Capability set implemented by application computations.
///
/// `step` runs once per job on the staging buffers; `init`/`deinit` run once
/// around the whole experiment. Runnables must not block on I/O inside
/// `step`; label traffic goes through the declared bindings and cross-node
/// traffic through a [`crate::channel::Channel`] the runnable owns.
pub trait Runnable: Send {
    fn init(&mut self, _ctx: &mut RunnableCtx<'_>) {}
    fn deinit(&mut self, _ctx: &mut RunnableCtx<'_>) {}
    fn step(&mut self, ctx: &mut RunnableCtx<'_>);
}

/// Adapter turning a closure into a [`Runnable`] with empty hooks.
pub struct FnRunnable<F>(pub F);

impl<F> Runnable for FnRunnable<F>
where
    F: FnMut(&mut RunnableCtx<'_>) + Send,
{
    fn step(&mut self, ctx: &mut RunnableCtx<'_>) {
        (self.0)(ctx);
    }
}

struct LabelBinding {
    id: LabelId,
    buf: Box<[u8]>,
}

/// A runnable plus its declared label bindings and owned staging buffers.
///
/// Input buffers are scratch: a runnable that mutates them must not expect
/// persistence across jobs.
pub struct RunnableSpec {
    runnable: Box<dyn Runnable>,
    inputs: SmallVec<[LabelBinding; 4]>,
    outputs: SmallVec<[LabelBinding; 4]>,
}

impl RunnableSpec {
    pub fn new(runnable: impl Runnable + 'static) -> Self {
        Self {
            runnable: Box::new(runnable),
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
        }
    }

    /// Declare an input label; its value is staged into a buffer of `size`
    /// bytes at the start of every job, in declaration order.
    pub fn with_input(mut self, id: LabelId, size: usize) -> Self {
        self.inputs.push(LabelBinding {
            id,
            buf: vec![0u8; size].into_boxed_slice(),
        });
        self
    }

    /// Declare an output label; its staging buffer is published at the end of
    /// every job, in declaration order.
    pub fn with_output(mut self, id: LabelId, size: usize) -> Self {
        self.outputs.push(LabelBinding {
            id,
            buf: vec![0u8; size].into_boxed_slice(),
        });
        self
    }

    pub(crate) fn run_init(&mut self) {
        let mut ctx = RunnableCtx {
            inputs: &mut self.inputs,
            outputs: &mut self.outputs,
        };
        self.runnable.init(&mut ctx);
    }

    pub(crate) fn run_deinit(&mut self) {
        let mut ctx = RunnableCtx {
            inputs: &mut self.inputs,
            outputs: &mut self.outputs,
        };
        self.runnable.deinit(&mut ctx);
    }

    /// Read phase: stage every declared input label.
    pub(crate) fn read_phase(&mut self, store: &LabelStore) -> RtResult<()> {
        for binding in self.inputs.iter_mut() {
            store.read(binding.id, &mut binding.buf)?;
        }
        Ok(())
    }

    /// Execute phase: one invocation of the runnable on its staging buffers.
    pub(crate) fn execute_phase(&mut self) {
        let mut ctx = RunnableCtx {
            inputs: &mut self.inputs,
            outputs: &mut self.outputs,
        };
        self.runnable.step(&mut ctx);
    }

    /// Write phase: publish every declared output label.
    pub(crate) fn write_phase(&self, store: &LabelStore) -> RtResult<()> {
        for binding in self.outputs.iter() {
            store.write(binding.id, &binding.buf)?;
        }
        Ok(())
    }
}

/// View of a runnable's staging buffers during a hook or job.
pub struct RunnableCtx<'a> {
    inputs: &'a mut SmallVec<[LabelBinding; 4]>,
    outputs: &'a mut SmallVec<[LabelBinding; 4]>,
}

impl RunnableCtx<'_> {
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Staged value of the idx-th declared input.
    pub fn input(&self, idx: usize) -> &[u8] {
        &self.inputs[idx].buf
    }

    /// Mutable staging buffer of the idx-th declared output.
    pub fn output_mut(&mut self, idx: usize) -> &mut [u8] {
        &mut self.outputs[idx].buf
    }

    /// First four bytes of input `idx` as a host-order u32.
    pub fn input_u32(&self, idx: usize) -> u32 {
        let b = &self.inputs[idx].buf;
        u32::from_ne_bytes([b[0], b[1], b[2], b[3]])
    }

    /// First four bytes of input `idx` as a host-order f32.
    pub fn input_f32(&self, idx: usize) -> f32 {
        f32::from_ne_bytes(self.input_u32(idx).to_ne_bytes())
    }

    pub fn set_output_u32(&mut self, idx: usize, value: u32) {
        self.outputs[idx].buf[..4].copy_from_slice(&value.to_ne_bytes());
    }

    pub fn set_output_f32(&mut self, idx: usize, value: f32) {
        self.outputs[idx].buf[..4].copy_from_slice(&value.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelStore;

    #[test]
    fn test_phases_copy_through_staging_buffers() {
        let store = LabelStore::new();
        let input = store.register("in", 4).unwrap();
        let output = store.register("out", 4).unwrap();
        store.write(input, &7u32.to_ne_bytes()).unwrap();

        let mut spec = RunnableSpec::new(FnRunnable(|ctx: &mut RunnableCtx<'_>| {
            let v = ctx.input_u32(0);
            ctx.set_output_u32(0, v * 2);
        }))
        .with_input(input, 4)
        .with_output(output, 4);

        spec.read_phase(&store).unwrap();
        spec.execute_phase();
        spec.write_phase(&store).unwrap();

        let mut buf = [0u8; 4];
        store.read(output, &mut buf).unwrap();
        assert_eq!(u32::from_ne_bytes(buf), 14);
    }

    #[test]
    fn test_read_phase_surfaces_size_mismatch() {
        let store = LabelStore::new();
        let input = store.register("in", 4).unwrap();
        let mut spec = RunnableSpec::new(FnRunnable(|_: &mut RunnableCtx<'_>| {}))
            .with_input(input, 8);
        assert!(spec.read_phase(&store).is_err());
    }

    #[test]
    fn test_init_and_deinit_hooks_observe_buffers() {
        struct Hooked {
            init_seen: usize,
        }
        impl Runnable for Hooked {
            fn init(&mut self, ctx: &mut RunnableCtx<'_>) {
                self.init_seen = ctx.output_count();
                ctx.set_output_u32(0, 99);
            }
            fn step(&mut self, _ctx: &mut RunnableCtx<'_>) {}
        }

        let store = LabelStore::new();
        let out = store.register("out", 4).unwrap();
        let mut spec = RunnableSpec::new(Hooked { init_seen: 0 }).with_output(out, 4);
        spec.run_init();
        spec.write_phase(&store).unwrap();

        let mut buf = [0u8; 4];
        store.read(out, &mut buf).unwrap();
        assert_eq!(u32::from_ne_bytes(buf), 99);
    }
}
