use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use lockwarden::{Lock, LockRegistry, Session};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub iterations: usize,
    pub hold: Duration,
    pub show_rounds: usize,
    pub show_interval: Duration,
}

/// One run of worker threads against a shared registry.
pub struct Scenario {
    registry: Arc<LockRegistry>,
    settings: Settings,
}

impl Scenario {
    pub fn new(registry: Arc<LockRegistry>, settings: Settings) -> Self {
        Self { registry, settings }
    }

    pub fn basic(&self) -> Result<()> {
        let lock = self.registry.create_mutex("simpleton")?;
        let workers = vec![
            self.spawn("basic1", basic_worker(lock.clone(), self.settings))?,
            self.spawn("basic2", basic_worker(lock, self.settings))?,
        ];
        self.finish(workers)
    }

    pub fn recursive(&self) -> Result<()> {
        let lock = self.registry.create_recursive("recursive")?;
        let workers = vec![
            self.spawn("rec1", recursive_worker(lock.clone(), self.settings))?,
            self.spawn("rec2", recursive_worker(lock, self.settings))?,
        ];
        self.finish(workers)
    }

    pub fn readwrite(&self) -> Result<()> {
        let lock = self.registry.create_rw("i-can-do-things")?;
        let mut workers = Vec::new();
        for i in 1..=4 {
            workers.push(self.spawn(
                &format!("read{i}"),
                rw_worker(lock.clone(), false, self.settings),
            )?);
        }
        for i in 1..=2 {
            workers.push(self.spawn(
                &format!("write{i}"),
                rw_worker(lock.clone(), true, self.settings),
            )?);
        }
        self.finish(workers)
    }

    /// Two threads taking the same pair of locks in opposite orders.
    ///
    /// With fail-fast on, the second thread's out-of-order request ends the
    /// process. With `unsafe_order` the violation is only logged and each
    /// lock admits a single caller, so a thread that would have to wait is
    /// turned away instead.
    pub fn deadlock(&self, unsafe_order: bool) -> Result<()> {
        let lock1 = self.registry.create_mutex("lock1")?;
        let lock2 = self.registry.create_mutex("lock2")?;
        if unsafe_order {
            self.registry.set_fail_fast(false);
            lock1.set_deadlock_threshold(1);
            lock2.set_deadlock_threshold(1);
        }

        let workers = vec![
            self.spawn(
                "th1",
                pair_worker(lock1.clone(), lock2.clone(), self.settings),
            )?,
            self.spawn("th2", pair_worker(lock2, lock1, self.settings))?,
        ];
        self.finish(workers)
    }

    pub fn logging(&self) -> Result<()> {
        let lock = self.registry.create_mutex("simpleton")?;
        let once = Settings {
            iterations: 1,
            ..self.settings
        };
        let worker = self.spawn("basic1", basic_worker(lock.clone(), once))?;
        join(worker)?;

        self.registry.set_trace(true);
        let worker = self.spawn("basic1", basic_worker(lock, once))?;
        join(worker)?;
        self.registry.remove_all();
        Ok(())
    }

    fn spawn<F>(&self, name: &str, f: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        thread::Builder::new()
            .name(name.to_owned())
            .spawn(f)
            .with_context(|| format!("failed to spawn {name}"))
    }

    fn show_locks(&self) {
        for _ in 0..self.settings.show_rounds {
            self.registry.show_all();
            thread::sleep(self.settings.show_interval);
        }
    }

    fn finish(&self, workers: Vec<JoinHandle<()>>) -> Result<()> {
        self.show_locks();
        for w in workers {
            join(w)?;
        }
        self.registry.show_all();
        let removed = self.registry.remove_all();
        info!(removed, stats = ?self.registry.stats(), "scenario finished");
        Ok(())
    }
}

fn join(handle: JoinHandle<()>) -> Result<()> {
    let name = handle.thread().name().unwrap_or("worker").to_owned();
    handle
        .join()
        .map_err(|_| anyhow!("worker thread {name} panicked"))
}

fn close(session: Session) {
    // a refusal here has already been logged by the session
    let _ = session.close();
}

fn basic_worker(lock: Arc<Lock>, settings: Settings) -> impl FnOnce() + Send + 'static {
    move || {
        let mut session = Session::new();
        for ix in 0..settings.iterations {
            if session.lock(&lock).is_ok() {
                println!("Doing some stuff with basic lock {ix}");
                thread::sleep(settings.hold);
                let _ = session.unlock(&lock);
            }
        }
        close(session);
    }
}

// Re-enters the lock four times per round, which a recursive lock allows as
// long as it is released as many times.
fn recursive_worker(lock: Arc<Lock>, settings: Settings) -> impl FnOnce() + Send + 'static {
    move || {
        let mut session = Session::new();
        for ix in 0..settings.iterations {
            let taken = (0..4).filter(|_| session.lock(&lock).is_ok()).count();
            println!("Doing some stuff with recursive lock {ix}");
            thread::sleep(settings.hold);
            for _ in 0..taken {
                let _ = session.unlock(&lock);
            }
        }
        close(session);
    }
}

fn rw_worker(lock: Arc<Lock>, write: bool, settings: Settings) -> impl FnOnce() + Send + 'static {
    move || {
        // let the monitor print an idle lock first
        thread::sleep(settings.show_interval);
        let mut session = Session::new();
        let what = if write { "write" } else { "read" };
        for ix in 0..settings.iterations {
            let acquired = if write {
                session.write(&lock)
            } else {
                session.read(&lock)
            };
            if acquired.is_ok() {
                println!("Doing some stuff with ({what}) rw lock {ix}");
                thread::sleep(settings.hold);
                let _ = if write {
                    session.release_write(&lock)
                } else {
                    session.release_read(&lock)
                };
            }
        }
        close(session);
    }
}

fn pair_worker(
    first: Arc<Lock>,
    second: Arc<Lock>,
    settings: Settings,
) -> impl FnOnce() + Send + 'static {
    move || {
        let mut session = Session::new();
        for ix in 0..settings.iterations {
            if session.lock(&first).is_ok() {
                if session.lock(&second).is_ok() {
                    println!(
                        "Doing some stuff with basic {}, {} {ix}",
                        first.name(),
                        second.name()
                    );
                    thread::sleep(settings.hold);
                    let _ = session.unlock(&second);
                }
                let _ = session.unlock(&first);
            }
        }
        close(session);
    }
}
