mod app;
mod data;
mod logging;
mod overview_canvas;
mod render_loop;

use std::any::Any;
use std::cell::RefCell;

use leptos::mount::mount_to;
use wasm_bindgen::JsCast;

thread_local! {
    /// The live mount. Holding it keeps the reactive owner alive.
    static MOUNTED_APP: RefCell<Option<Box<dyn Any>>> = const { RefCell::new(None) };
}

/// `#app` if the page provides it, otherwise `<body>`.
fn mount_point() -> Option<web_sys::HtmlElement> {
    let document = web_sys::window()?.document()?;
    document
        .get_element_by_id("app")
        .and_then(|el| el.dyn_into::<web_sys::HtmlElement>().ok())
        .or_else(|| document.body())
}

fn main() {
    console_error_panic_hook::set_once();
    logging::init();

    let Some(target) = mount_point() else {
        web_sys::console::error_1(&"no mount point for the overview".into());
        return;
    };

    MOUNTED_APP.with(|slot| {
        // Unmount first so two apps never share the same stores.
        drop(slot.borrow_mut().take());
        let handle = mount_to(target, app::App);
        *slot.borrow_mut() = Some(Box::new(handle));
    });
}
