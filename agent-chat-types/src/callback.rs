/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Framework-agnostic callback type.
//!
//! Chat handlers are invoked from the connection driver task, which may run on
//! any tokio worker, so the wrapped closure must be `Send + Sync`.

use std::fmt;
use std::sync::Arc;

/// Universal callback wrapper.
///
/// An `Arc` wrapper is used to make it cloneable across threads.
pub struct Callback<IN, OUT = ()> {
    cb: Arc<dyn Fn(IN) -> OUT + Send + Sync>,
}

impl<IN, OUT, F: Fn(IN) -> OUT + Send + Sync + 'static> From<F> for Callback<IN, OUT> {
    fn from(func: F) -> Self {
        Callback { cb: Arc::new(func) }
    }
}

impl<IN, OUT> Clone for Callback<IN, OUT> {
    fn clone(&self) -> Self {
        Self {
            cb: self.cb.clone(),
        }
    }
}

impl<IN, OUT> fmt::Debug for Callback<IN, OUT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback<_>")
    }
}

impl<IN, OUT> Callback<IN, OUT> {
    /// Calls the callback's function.
    pub fn emit(&self, value: IN) -> OUT {
        (*self.cb)(value)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb = Callback::from(move |v: bool| sink.lock().unwrap().push(v));
        cb.emit(true);
        cb.emit(false);
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_callback_returns_output() {
        let cb: Callback<String, usize> = Callback::from(|v: String| v.len());
        assert_eq!(cb.emit("done".to_string()), 4);
    }

    #[test]
    fn test_callback_is_send_across_threads() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb = Callback::from(move |v: u32| sink.lock().unwrap().push(v));
        let remote = cb.clone();
        std::thread::spawn(move || remote.emit(7)).join().unwrap();
        cb.emit(8);
        assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_debug_hides_closure() {
        let cb = Callback::from(|_: ()| ());
        assert_eq!(format!("{cb:?}"), "Callback<_>");
    }
}
