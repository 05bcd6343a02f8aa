/// Helper macro for locking items
///
/// A poisoned lock is recovered.
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex);
///  *data = Some(handle);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}
