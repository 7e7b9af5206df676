//! # Pool de Workers
//! src/workers/pool.rs
//!
//! N threads de larga vida consumiendo una cola FIFO acotada, protegida por
//! un `Mutex` y un `Condvar`.
//!
//! ```text
//! reactor --submit()--> [ cola FIFO (max N) ] --pop--> worker-0
//!                                              --pop--> worker-1
//!                                              --pop--> ...
//! ```
//!
//! `submit` nunca bloquea: si la cola está llena, falla y no tiene efectos.

use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Unidad de trabajo de la cola
pub enum Task {
    /// Trabajo normal: se ejecuta y se descarta
    Run(Box<dyn FnOnce() + Send + 'static>),
    /// Hace salir al worker que la toma
    Exit,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task::Run(Box::new(f))
    }
}

/// Qué hacer con las tareas pendientes al apagar el pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Se ejecutan las tareas encoladas antes de salir
    Graceful,
    /// Se descartan las tareas encoladas
    Immediate,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("task queue is full (max capacity: {0})")]
    QueueFull(usize),
    #[error("worker pool is shut down")]
    ShutDown,
}

struct Shared {
    queue: Mutex<State>,
    available: Condvar,
}

struct State {
    tasks: VecDeque<Task>,
    shutting_down: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Ninguna tarea corre con el lock tomado, así que un panic nunca deja
        // la cola a medio modificar.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pool de tamaño fijo
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    max_queue: usize,
    mode: ShutdownMode,
}

impl WorkerPool {
    /// Crea el pool y arranca sus `workers` threads
    pub fn new(workers: usize, max_queue: usize, mode: ShutdownMode) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(State {
                tasks: VecDeque::with_capacity(max_queue.min(4096)),
                shutting_down: false,
            }),
            available: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(workers),
            max_queue,
            mode,
        };

        for i in 0..workers {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("worker-{}", i))
                .spawn(move || Self::worker_loop(shared))?;
            pool.workers.push(handle);
        }

        tracing::info!(workers, max_queue, ?mode, "worker pool started");
        Ok(pool)
    }

    /// Encola una tarea
    ///
    /// Retorna error, sin encolar nada, si la cola está llena.
    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        let mut state = self.shared.lock();

        if state.shutting_down {
            return Err(SubmitError::ShutDown);
        }
        if state.tasks.len() >= self.max_queue {
            return Err(SubmitError::QueueFull(self.max_queue));
        }

        state.tasks.push_back(task);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Atajo para encolar un closure
    pub fn execute<F>(&self, f: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(f))
    }

    /// Tareas esperando en la cola
    pub fn queued(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Apaga el pool y espera a que salgan todos los workers
    ///
    /// Encola exactamente una `Task::Exit` por worker, despierta a todos y
    /// hace join. En modo `Immediate` primero vacía la cola.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        {
            let mut state = self.shared.lock();
            state.shutting_down = true;

            if self.mode == ShutdownMode::Immediate {
                let dropped = state.tasks.len();
                state.tasks.clear();
                if dropped > 0 {
                    tracing::warn!(dropped, "discarding queued tasks on shutdown");
                }
            }
            for _ in 0..self.workers.len() {
                state.tasks.push_back(Task::Exit);
            }
            self.shared.available.notify_all();
        }

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
        tracing::info!("worker pool stopped");
    }

    /// Loop principal del worker
    fn worker_loop(shared: Arc<Shared>) {
        tracing::debug!("worker started");
        loop {
            let task = {
                let mut state = shared.lock();
                loop {
                    if let Some(task) = state.tasks.pop_front() {
                        break task;
                    }
                    state = shared
                        .available
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };

            match task {
                Task::Run(f) => {
                    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
                        tracing::error!("task panicked");
                    }
                }
                Task::Exit => break,
            }
        }
        tracing::debug!("worker exiting");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
