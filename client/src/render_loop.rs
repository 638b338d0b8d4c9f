use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;

/// Coalesces surface flushes onto `requestAnimationFrame`.
///
/// Every engine mutation calls `request()`. The flush closure runs at most once
/// per frame; returning `true` asks for one more frame (deferred work still
/// pending).
pub struct FrameScheduler {
    inner: Rc<Inner>,
}

struct Inner {
    window: Option<web_sys::Window>,
    pending: Cell<bool>,
    scheduled: Cell<bool>,
    raf_id: Cell<Option<i32>>,
    callback: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl Inner {
    fn schedule(&self) {
        if self.scheduled.get() {
            return;
        }
        let callback = self.callback.borrow();
        let (Some(cb), Some(window)) = (callback.as_ref(), self.window.as_ref()) else {
            return;
        };
        self.scheduled.set(true);
        match window.request_animation_frame(cb.as_ref().unchecked_ref()) {
            Ok(id) => self.raf_id.set(Some(id)),
            Err(_) => self.scheduled.set(false),
        }
    }
}

impl FrameScheduler {
    pub fn new(mut flush: impl FnMut() -> bool + 'static) -> Self {
        let inner = Rc::new(Inner {
            window: web_sys::window(),
            pending: Cell::new(false),
            scheduled: Cell::new(false),
            raf_id: Cell::new(None),
            callback: RefCell::new(None),
        });

        let weak = Rc::downgrade(&inner);
        let cb = Closure::<dyn FnMut()>::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.scheduled.set(false);
            inner.raf_id.set(None);
            if !inner.pending.replace(false) {
                return;
            }
            if flush() {
                inner.pending.set(true);
                inner.schedule();
            }
        });
        *inner.callback.borrow_mut() = Some(cb);

        Self { inner }
    }

    pub fn request(&self) {
        self.inner.pending.set(true);
        self.inner.schedule();
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if let Some(raf_id) = self.inner.raf_id.replace(None)
            && let Some(window) = self.inner.window.as_ref()
        {
            let _ = window.cancel_animation_frame(raf_id);
        }
        self.inner.scheduled.set(false);
        self.inner.pending.set(false);
        self.inner.callback.borrow_mut().take();
    }
}
