//! # Workers
//!
//! Pool fijo de threads que ejecuta el trabajo bloqueante (lectura de
//! archivos, supervisión de procesos CGI) fuera del thread del reactor.

pub mod pool;

pub use pool::{ShutdownMode, SubmitError, Task, WorkerPool};
