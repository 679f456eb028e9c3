use core::any::Any;
use std::thread;

/// Number of logical processors, or `1` if it cannot be determined.
pub(crate) fn default_worker_count() -> usize {
    thread::available_parallelism().map_or(1, usize::from)
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
