//! Background job pool.
//!
//! The main thread owns all editor state; work that would block it
//! (highlighting, autosuggestion probes) runs here. The contract is strict
//! one-way traffic in each direction:
//!
//! * main -> worker: a closure owning its snapshot. Nothing borrowed from
//!   the live editor crosses this boundary.
//! * worker -> main: the completion value on a channel, plus one byte on a
//!   self-pipe so the reader's poll set wakes. The main thread drains
//!   completions without ever blocking.
//!
//! There is no cancellation. Workers run to completion and must be free of
//! side effects beyond their return value; staleness is decided at merge
//! time by the generation check, not here.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::Ordering::Relaxed;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use tracing::{trace, warn};

use crate::{JOBS_COMPLETED, JOBS_SUBMITTED};

type Job<C> = Box<dyn FnOnce() -> C + Send + 'static>;

/// Fixed-size worker pool producing completions of type `C`.
pub struct JobPool<C: Send + 'static> {
    job_tx: Option<Sender<Job<C>>>,
    done_rx: Receiver<C>,
    notify_read: OwnedFd,
    workers: Vec<JoinHandle<()>>,
}

impl<C: Send + 'static> JobPool<C> {
    /// Spawn `threads` workers (clamped to at least 1).
    pub fn spawn(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let (job_tx, job_rx) = unbounded::<Job<C>>();
        let (done_tx, done_rx) = unbounded::<C>();
        let (notify_read, notify_write) =
            pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC).context("job completion pipe")?;

        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let notify_write = notify_write.try_clone().context("clone notify fd")?;
            let handle = std::thread::Builder::new()
                .name(format!("dl-job-{id}"))
                .spawn(move || worker_main(id, job_rx, done_tx, notify_write))
                .context("spawn worker thread")?;
            workers.push(handle);
        }

        Ok(Self {
            job_tx: Some(job_tx),
            done_rx,
            notify_read,
            workers,
        })
    }

    /// Queue a job. The closure owns everything it needs.
    pub fn submit(&self, job: impl FnOnce() -> C + Send + 'static) {
        JOBS_SUBMITTED.fetch_add(1, Relaxed);
        if let Some(tx) = &self.job_tx
            && tx.send(Box::new(job)).is_err()
        {
            warn!(target: "jobs.pool", "job submitted after pool shutdown");
        }
    }

    /// Fd that becomes readable when at least one completion is waiting.
    /// Registered in the char queue's poll set.
    pub fn notify_fd(&self) -> RawFd {
        self.notify_read.as_raw_fd()
    }

    /// Drain all currently completed jobs without blocking. Also drains the
    /// wakeup pipe so poll does not spin on an already-seen edge.
    pub fn drain(&self) -> Vec<C> {
        let mut scratch = [0u8; 64];
        loop {
            match nix::unistd::read(self.notify_read.as_raw_fd(), &mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(_) => break, // EAGAIN: pipe empty
            }
        }
        let done: Vec<C> = self.done_rx.try_iter().collect();
        if !done.is_empty() {
            JOBS_COMPLETED.fetch_add(done.len() as u64, Relaxed);
            trace!(target: "jobs.pool", completed = done.len(), "drained");
        }
        done
    }
}

impl<C: Send + 'static> Drop for JobPool<C> {
    fn drop(&mut self) {
        // Closing the job channel lets every worker fall out of its recv
        // loop; join so worker panics are not silently lost on shutdown.
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_main<C: Send + 'static>(
    id: usize,
    job_rx: Receiver<Job<C>>,
    done_tx: Sender<C>,
    notify_write: OwnedFd,
) {
    while let Ok(job) = job_rx.recv() {
        let result = job();
        if done_tx.send(result).is_err() {
            break;
        }
        // A full pipe still means the reader will wake; EAGAIN is fine.
        match nix::unistd::write(&notify_write, &[1u8]) {
            Ok(_) | Err(nix::errno::Errno::EAGAIN) => {}
            Err(err) => {
                warn!(target: "jobs.pool", worker = id, %err, "completion wakeup write failed");
            }
        }
    }
    trace!(target: "jobs.pool", worker = id, "worker exit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn drain_until<C: Send + 'static>(pool: &JobPool<C>, want: usize) -> Vec<C> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut got = Vec::new();
        while got.len() < want {
            assert!(Instant::now() < deadline, "timed out waiting for jobs");
            got.extend(pool.drain());
            std::thread::sleep(Duration::from_millis(1));
        }
        got
    }

    #[test]
    fn completions_arrive_and_wake_the_pipe() {
        let pool: JobPool<u32> = JobPool::spawn(2).unwrap();
        for n in 0..8u32 {
            pool.submit(move || n * n);
        }
        let mut got = drain_until(&pool, 8);
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 4, 9, 16, 25, 36, 49]);
    }

    #[test]
    fn notify_fd_becomes_readable() {
        let pool: JobPool<&'static str> = JobPool::spawn(1).unwrap();
        pool.submit(|| "done");
        let got = drain_until(&pool, 1);
        assert_eq!(got, vec!["done"]);
        // After draining, the pipe is empty again.
        let mut buf = [0u8; 8];
        assert!(nix::unistd::read(pool.notify_fd(), &mut buf).is_err());
    }

    #[test]
    fn single_worker_preserves_submission_order() {
        let pool: JobPool<usize> = JobPool::spawn(1).unwrap();
        for n in 0..16 {
            pool.submit(move || n);
        }
        let got = drain_until(&pool, 16);
        assert_eq!(got, (0..16).collect::<Vec<_>>());
    }
}
