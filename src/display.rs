// display.rs — Frame sinks.
//
//   NullSink   — discards everything (headless runs, tests, benches).
//   LogSink    — logs each frame's mean intensity at debug level.
//   WindowSink — one minifb window per frame name (`display` feature).
//                Closing a window or pressing Escape marks the sink closed,
//                which ends the frame loop.

use crate::frame::Frame;
use crate::pipeline::FrameSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn display(&mut self, _name: &str, _frame: &Frame) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FrameSink for LogSink {
    fn display(&mut self, name: &str, frame: &Frame) {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{name}: {} mean {:.2}", frame.size(), mean(frame));
        }
    }
}

fn mean(frame: &Frame) -> f64 {
    let n = frame.as_slice().len();
    if n == 0 {
        return 0.0;
    }
    let sum: u64 = frame.as_slice().iter().map(|&v| u64::from(v)).sum();
    sum as f64 / n as f64
}

/// Expand a grayscale frame into a 0x00RRGGBB framebuffer.
pub fn render_grayscale(frame: &Frame, fb: &mut Vec<u32>) {
    fb.clear();
    fb.extend(frame.as_slice().iter().map(|&v| {
        let v = u32::from(v);
        (v << 16) | (v << 8) | v
    }));
}

#[cfg(feature = "display")]
pub use window::WindowSink;

#[cfg(feature = "display")]
mod window {
    use minifb::{Key, Window, WindowOptions};

    use super::render_grayscale;
    use crate::frame::Frame;
    use crate::pipeline::FrameSink;

    struct Named {
        name: String,
        window: Window,
        fb: Vec<u32>,
    }

    /// Windows created lazily on first display of each name.
    #[derive(Default)]
    pub struct WindowSink {
        windows: Vec<Named>,
        closed: bool,
    }

    impl WindowSink {
        pub fn new() -> Self {
            Self::default()
        }

        fn window_for(&mut self, name: &str, frame: &Frame) -> Option<&mut Named> {
            let pos = self.windows.iter().position(|w| w.name == name);
            let idx = match pos {
                Some(idx) => idx,
                None => {
                    let window = match Window::new(
                        name,
                        frame.width(),
                        frame.height(),
                        WindowOptions { resize: false, ..WindowOptions::default() },
                    ) {
                        Ok(w) => w,
                        Err(e) => {
                            log::error!("failed to open window {name}: {e}");
                            self.closed = true;
                            return None;
                        }
                    };
                    self.windows.push(Named {
                        name: name.to_string(),
                        window,
                        fb: Vec::new(),
                    });
                    self.windows.len() - 1
                }
            };
            self.windows.get_mut(idx)
        }
    }

    impl FrameSink for WindowSink {
        fn display(&mut self, name: &str, frame: &Frame) {
            let (w, h) = (frame.width(), frame.height());
            let Some(named) = self.window_for(name, frame) else {
                return;
            };
            render_grayscale(frame, &mut named.fb);
            let closed = match named.window.update_with_buffer(&named.fb, w, h) {
                Ok(()) => !named.window.is_open() || named.window.is_key_down(Key::Escape),
                Err(e) => {
                    log::error!("window {name}: {e}");
                    true
                }
            };
            if closed {
                log::info!("window {name} closed");
                self.closed = true;
            }
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }
}
