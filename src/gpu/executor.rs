// gpu/executor.rs — Running one frame through the device context.
//
// `DeviceContext::run` is the per-frame choreography:
//
//   (a) write the frame into the input buffer        → WriteFailure
//   (b) bind input / output / params to the kernel    ┐
//   (c) read the device's workgroup limits (logged)   ├ DispatchFailure
//   (d) clear output, dispatch W*H work items, submit ┘
//   (e) block until the queue drains
//   (f) copy output → readback, map, copy to host     → ReadbackFailure
//
// Each stage runs inside a device error scope; the first captured error
// aborts the frame with the stage's variant. Nothing is retried and no
// partial result is returned: the caller either gets the whole filtered
// frame or an error.
//
// The output buffer is cleared before every dispatch because the kernel
// ORs its byte into a shared word. Without the clear, bits from the
// previous frame would leak into this one.

use std::borrow::Cow;

use crate::backend::ComputeBackend;
use crate::error::ExecError;
use crate::frame::Frame;
use crate::gpu::device::{scoped, DeviceContext};

/// Geometry of the last dispatch, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchInfo {
    /// Work items requested (one per pixel).
    pub work_items: u32,
    pub workgroup_size: u32,
    pub workgroups: (u32, u32),
    /// `max_compute_invocations_per_workgroup` reported by the device.
    pub max_workgroup_size: u32,
}

impl DeviceContext {
    /// Filter one frame on the device.
    ///
    /// # Errors
    /// `FrameSizeMismatch` if `input` is not the size the buffers were
    /// allocated for; otherwise the variant of the stage that failed.
    pub fn run(&mut self, input: &Frame) -> Result<Frame, ExecError> {
        self.run_with_info(input).map(|(frame, _)| frame)
    }

    /// [`run`](Self::run), also returning the dispatch geometry.
    pub fn run_with_info(&mut self, input: &Frame) -> Result<(Frame, DispatchInfo), ExecError> {
        pollster::block_on(self.run_async(input))
    }

    async fn run_async(&mut self, input: &Frame) -> Result<(Frame, DispatchInfo), ExecError> {
        if input.size() != self.frame_size {
            return Err(ExecError::FrameSizeMismatch {
                expected: self.frame_size,
                actual: input.size(),
            });
        }
        let pixels = self.frame_size.pixel_count();

        // (a) upload
        let words = pad_to_words(input.as_slice(), self.buffer_bytes as usize);
        let ((), error) = scoped(&self.device, || {
            self.queue.write_buffer(&self.input, 0, &words);
        })
        .await;
        if let Some(e) = error {
            return Err(ExecError::WriteFailure(e.to_string()));
        }

        // (b) bind
        let (bind_group, error) = scoped(&self.device, || {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("convstream BG"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.input.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: self.output.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: self.params.as_entire_binding() },
                ],
            })
        })
        .await;
        if let Some(e) = error {
            return Err(ExecError::DispatchFailure(format!("binding kernel arguments: {e}")));
        }

        // (c) granularity
        let (grid_x, grid_y) = self.dispatch_size();
        let info = DispatchInfo {
            work_items: pixels as u32,
            workgroup_size: self.workgroup_size,
            workgroups: (grid_x, grid_y),
            max_workgroup_size: self.device.limits().max_compute_invocations_per_workgroup,
        };
        log::debug!("dispatch {info:?}");

        // (d) dispatch
        let (submission, error) = scoped(&self.device, || {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("convstream dispatch"),
                });
            encoder.clear_buffer(&self.output, 0, None);
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(self.entry_point.as_str()),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(grid_x, grid_y, 1);
            }
            self.queue.submit(std::iter::once(encoder.finish()))
        })
        .await;
        if let Some(e) = error {
            return Err(ExecError::DispatchFailure(e.to_string()));
        }

        // (e) wait
        self.device.poll(wgpu::Maintain::wait_for(submission));

        // (f) readback
        let ((), error) = scoped(&self.device, || {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("convstream readback"),
                });
            encoder.copy_buffer_to_buffer(&self.output, 0, &self.readback, 0, self.buffer_bytes);
            self.queue.submit(std::iter::once(encoder.finish()));
        })
        .await;
        if let Some(e) = error {
            return Err(ExecError::ReadbackFailure(e.to_string()));
        }

        let slice = self.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver outlives the poll below; a send error means the
            // frame was already abandoned.
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ExecError::ReadbackFailure(e.to_string())),
            Err(_) => {
                return Err(ExecError::ReadbackFailure(
                    "map callback dropped before completion".to_string(),
                ))
            }
        }

        let out = {
            let mapped = slice.get_mapped_range();
            mapped[..pixels].to_vec()
        };
        self.readback.unmap();

        let frame = Frame::from_vec(self.frame_size.width, self.frame_size.height, out);
        Ok((frame, info))
    }
}

/// Frame bytes padded with zeros to the device buffer length.
fn pad_to_words(pixels: &[u8], buffer_bytes: usize) -> Cow<'_, [u8]> {
    if pixels.len() == buffer_bytes {
        Cow::Borrowed(pixels)
    } else {
        let mut padded = vec![0u8; buffer_bytes];
        padded[..pixels.len()].copy_from_slice(pixels);
        Cow::Owned(padded)
    }
}

/// [`ComputeBackend`] running on a [`DeviceContext`].
pub struct GpuBackend {
    ctx: DeviceContext,
    name: String,
    last_dispatch: Option<DispatchInfo>,
}

impl GpuBackend {
    pub fn new(ctx: DeviceContext) -> Self {
        let name = format!("gpu ({})", ctx.adapter_info.name);
        GpuBackend { ctx, name, last_dispatch: None }
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn last_dispatch(&self) -> Option<DispatchInfo> {
        self.last_dispatch
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, input: &Frame) -> Result<Frame, ExecError> {
        let (frame, info) = self.ctx.run_with_info(input)?;
        self.last_dispatch = Some(info);
        Ok(frame)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
