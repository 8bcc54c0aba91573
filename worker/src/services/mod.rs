pub mod backoff;
pub mod keyed_locks;
pub mod supervisor;
pub mod worker_loop;
