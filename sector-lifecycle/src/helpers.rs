use std::time::Instant;

/// Logs, at debug level, how long the enclosing scope took once dropped.
pub struct Elapsed {
    operation: &'static str,
    start: Instant,
}

pub fn elapsed(operation: &'static str) -> Elapsed {
    Elapsed {
        operation,
        start: Instant::now(),
    }
}

impl Drop for Elapsed {
    fn drop(&mut self) {
        debug!("{} took {:?}", self.operation, self.start.elapsed());
    }
}
