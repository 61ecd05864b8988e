//! A minimal preview GUI: image windows and key presses.
//!
//! The native event loop has to run on the main thread, so [`run`] takes over the main thread and
//! runs the application code on a second thread. That thread talks to the GUI only through
//! [`show_image`] and [`wait_key`].

mod renderer;

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::Mutex,
    time::Duration,
};

use anyhow::anyhow;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use once_cell::sync::OnceCell;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy},
    window::WindowId,
};

use crate::{
    image::{Image, Resolution},
    termination::{Failure, Termination},
};

use self::renderer::{Gpu, Renderer, Window};

/// A key event delivered to the application thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A character was typed into one of the windows.
    Char(char),
    /// A window was closed by the user.
    WindowClosed,
}

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
    keys: Sender<Key>,
}

impl Gui {
    fn new(keys: Sender<Key>) -> Self {
        let gpu = match pollster::block_on(Gpu::open()) {
            Ok(gpu) => gpu,
            Err(e) => Failure::from(e.context("failed to open graphics device")).exit(),
        };
        Self {
            gpu: Rc::new(gpu),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
            keys,
        }
    }

    fn renderer_mut(&mut self, win: WindowId) -> Option<&mut Renderer> {
        let key = self.win_id_to_key.get(&win)?;
        self.windows.get_mut(key)
    }

    fn show(
        &mut self,
        target: &winit::event_loop::EventLoopWindowTarget<Msg>,
        key: String,
        res: Resolution,
        data: Vec<u8>,
    ) -> anyhow::Result<()> {
        if !self.windows.contains_key(&key) {
            log::debug!("creating window '{key}' at {res}");
            let win = Window::open(target, &key, res)?;
            let win_id = win.win.id();
            let renderer = Renderer::new(win, self.gpu.clone())?;
            self.win_id_to_key.insert(win_id, key.clone());
            self.windows.insert(key.clone(), renderer);
        }

        if let Some(renderer) = self.windows.get_mut(&key) {
            renderer.update_texture(res, &data);
            renderer.window().request_redraw();
        }
        Ok(())
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(Msg::Image { key, res, data }) => {
                    if let Err(e) = self.show(target, key, res, data) {
                        log::error!("failed to display image: {e:#}");
                    }
                }
                Event::RedrawRequested(window) => {
                    if let Some(renderer) = self.renderer_mut(window) {
                        if let Err(e) = renderer.redraw() {
                            log::error!("failed to redraw window: {e:#}");
                        }
                    }
                }
                Event::WindowEvent { event, .. } => {
                    let key = match event {
                        WindowEvent::ReceivedCharacter(c) => Key::Char(c),
                        WindowEvent::CloseRequested => Key::WindowClosed,
                        _ => return,
                    };
                    // The application thread may have stopped listening already.
                    self.keys.try_send(key).ok();
                }
                _ => {}
            }
        });
    }
}

#[derive(Debug)]
enum Msg {
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

/// Handles the application thread uses to reach the event loop.
struct Display {
    proxy: Mutex<EventLoopProxy<Msg>>,
    keys: Receiver<Key>,
}

static DISPLAY: OnceCell<Display> = OnceCell::new();

impl Display {
    fn get() -> anyhow::Result<&'static Display> {
        DISPLAY
            .get()
            .ok_or_else(|| anyhow!("GUI not initialized (application must be started via `gui::run`)"))
    }
}

fn send(msg: Msg) -> anyhow::Result<()> {
    Display::get()?
        .proxy
        .lock()
        .map_err(|_| anyhow!("event loop proxy poisoned"))?
        .send_event(msg)
        .map_err(|_closed| anyhow!("event loop closed"))
}

/// Takes over the main thread to run the GUI event loop, and runs `cb` on a new thread.
///
/// When `cb` returns, the process exits with the status its [`Termination`] value maps to. If
/// `cb` panics, the process exits with status 101.
pub fn run<F, R>(cb: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    // Bounded so that a flood of key repeats can't grow memory while the app is busy.
    let (key_sender, key_receiver) = crossbeam_channel::bounded(16);
    let display = Display {
        proxy: Mutex::new(event_loop.create_proxy()),
        keys: key_receiver,
    };
    if DISPLAY.set(display).is_err() {
        Failure::from(anyhow!("`gui::run` called more than once")).exit();
    }

    // The event loop is now reachable; run the application code on its own thread.
    std::thread::spawn(move || match catch_unwind(AssertUnwindSafe(cb)) {
        Ok(term) => term.exit(),
        Err(_payload) => {
            // The panic hook has printed the message already, exit with 101 like libstd does.
            process::exit(101);
        }
    });

    let gui = Gui::new(key_sender);
    gui.run(event_loop);
}

/// Displays an image in the window named `key`, creating the window if it doesn't exist yet.
///
/// The window title is `key`.
pub fn show_image(key: impl Into<String>, image: &Image) -> anyhow::Result<()> {
    // Image data is RGBA8 internally so that no conversion before GPU upload is needed.
    send(Msg::Image {
        key: key.into(),
        res: image.resolution(),
        data: image.data().to_vec(),
    })
}

/// Waits up to `timeout` for a key press (or window close) in any window.
///
/// Returns `None` if the timeout elapses first.
pub fn wait_key(timeout: Duration) -> anyhow::Result<Option<Key>> {
    match Display::get()?.keys.recv_timeout(timeout) {
        Ok(key) => Ok(Some(key)),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("GUI event loop has shut down")),
    }
}
