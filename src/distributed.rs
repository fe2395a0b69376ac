// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Message passing between the ranks of a distributed render.
//!
//! A rank only ever needs four things from its group: who it is, how
//! big the group is, a barrier, and a way to move a block of rows to
//! rank 0.  `Communicator` captures that, and there are two groups
//! implementing it:
//!
//! * `LocalComm`, where the ranks are threads of one process joined by
//!   channels.  Each rank still keeps a private frame buffer, so this
//!   behaves like the real thing without leaving the process.
//! * `ProcessRoot` and `ProcessWorker`, where the ranks are separate
//!   processes.  Rank 0 starts the others by re-running its own binary
//!   with `MANDELBROT_RANK` and `MANDELBROT_SIZE` in the environment,
//!   and talks to each of them over the child's stdin and stdout.
//!
//! On the pipes, the barrier is one `A` byte from every worker followed
//! by one `R` byte from the root to every worker.  A block of rows is
//! three little-endian `u64`s (first row, end row, cell count) followed
//! by that many little-endian `u32` escape counts.

use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Barrier};

use crate::error::{Error, Result};
use crate::partition::RowRange;

/// Environment variable carrying a worker's rank.
pub const RANK_VAR: &str = "MANDELBROT_RANK";
/// Environment variable carrying the group size.
pub const SIZE_VAR: &str = "MANDELBROT_SIZE";

const BARRIER_ARRIVE: u8 = b'A';
const BARRIER_RELEASE: u8 = b'R';

/// What happens to the other ranks' rows once everyone is done.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GatherMode {
    /// Ship every block to rank 0, which assembles the whole image.
    Gather,
    /// Rank 0 keeps only its own rows.  Matches the historical
    /// single-rank output, with zeroes where the other rows would be.
    RootOnly,
}

impl Default for GatherMode {
    fn default() -> Self {
        GatherMode::Gather
    }
}

/// One rank's view of its group.
pub trait Communicator {
    /// This rank, `0..size`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Returns once every rank of the group has called it.
    fn barrier(&mut self) -> Result<()>;

    /// Sends a block of rows to rank 0.  Only non-root ranks send.
    fn send_rows(&mut self, range: RowRange, cells: &[u32]) -> Result<()>;

    /// Receives the block sent by rank `from`, which must hold exactly
    /// `cells` counts.  Only rank 0 receives.
    fn receive_rows(&mut self, from: usize, cells: usize) -> Result<(RowRange, Vec<u32>)>;
}

fn check_cells(from: usize, expected: usize, got: usize) -> Result<()> {
    if got != expected {
        return Err(Error::Protocol(format!(
            "rank {} sent {} cells, expected {}",
            from, got, expected
        )));
    }
    Ok(())
}

fn check_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::Configuration(
            "process count must be at least 1".to_string(),
        ));
    }
    Ok(())
}

type Envelope = (usize, RowRange, Vec<u32>);

/// A rank living on a thread of the current process.
pub struct LocalComm {
    rank: usize,
    size: usize,
    barrier: Arc<Barrier>,
    outbox: Option<Sender<Envelope>>,
    inbox: Option<Receiver<Envelope>>,
    early: HashMap<usize, (RowRange, Vec<u32>)>,
}

/// Builds a group of `size` in-process ranks, in rank order.
pub fn local_group(size: usize) -> Result<Vec<LocalComm>> {
    check_size(size)?;
    let barrier = Arc::new(Barrier::new(size));
    let (sender, receiver) = unbounded();
    let mut inbox = Some(receiver);
    Ok((0..size)
        .map(|rank| LocalComm {
            rank,
            size,
            barrier: barrier.clone(),
            // Rank 0 holds no sender, so its inbox closes once every
            // other rank is gone.
            outbox: if rank == 0 { None } else { Some(sender.clone()) },
            inbox: if rank == 0 { inbox.take() } else { None },
            early: HashMap::new(),
        })
        .collect())
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&mut self) -> Result<()> {
        self.barrier.wait();
        Ok(())
    }

    fn send_rows(&mut self, range: RowRange, cells: &[u32]) -> Result<()> {
        let outbox = self
            .outbox
            .as_ref()
            .ok_or_else(|| Error::Protocol("rank 0 does not send rows".to_string()))?;
        outbox
            .send((self.rank, range, cells.to_vec()))
            .map_err(|_| Error::Protocol("rank 0 stopped listening".to_string()))
    }

    fn receive_rows(&mut self, from: usize, cells: usize) -> Result<(RowRange, Vec<u32>)> {
        if let Some(block) = self.early.remove(&from) {
            check_cells(from, cells, block.1.len())?;
            return Ok(block);
        }
        let inbox = self
            .inbox
            .as_ref()
            .ok_or_else(|| Error::Protocol(format!("rank {} does not receive rows", self.rank)))?;
        loop {
            let (sender, range, block) = inbox.recv().map_err(|_| Error::Worker {
                rank: from,
                reason: "left the group without sending its rows".to_string(),
            })?;
            if sender == from {
                check_cells(from, cells, block.len())?;
                return Ok((range, block));
            }
            self.early.insert(sender, (range, block));
        }
    }
}

/// Writes one block of rows in the pipe format.
pub fn write_rows<W: Write>(out: &mut W, range: RowRange, cells: &[u32]) -> io::Result<()> {
    out.write_all(&(range.start as u64).to_le_bytes())?;
    out.write_all(&(range.end as u64).to_le_bytes())?;
    out.write_all(&(cells.len() as u64).to_le_bytes())?;
    for cell in cells {
        out.write_all(&cell.to_le_bytes())?;
    }
    Ok(())
}

fn read_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut bytes = [0u8; 8];
    input.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn to_usize(value: u64) -> Result<usize> {
    if value > usize::max_value() as u64 {
        return Err(Error::Protocol(format!("{} does not fit in memory", value)));
    }
    Ok(value as usize)
}

/// Reads one block of rows in the pipe format.  The block must carry
/// exactly `expected` cells; anything else is refused before a buffer
/// is allocated for it.
pub fn read_rows<R: Read>(input: &mut R, expected: usize) -> Result<(RowRange, Vec<u32>)> {
    let start = to_usize(read_u64(input)?)?;
    let end = to_usize(read_u64(input)?)?;
    let len = to_usize(read_u64(input)?)?;
    let range = RowRange::new(start, end).map_err(|_| {
        Error::Protocol(format!("received inverted row range {}..{}", start, end))
    })?;
    if len != expected {
        return Err(Error::Protocol(format!(
            "block {} carries {} cells, expected {}",
            range, len, expected
        )));
    }

    let mut cells = Vec::new();
    cells
        .try_reserve_exact(len)
        .map_err(|_| Error::Protocol(format!("block of {} cells is too large", len)))?;
    let mut bytes = [0u8; 4];
    for _ in 0..len {
        input.read_exact(&mut bytes)?;
        cells.push(u32::from_le_bytes(bytes));
    }
    Ok((range, cells))
}

fn read_byte<R: Read>(input: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    match input.read_exact(&mut byte) {
        Ok(()) => Ok(Some(byte[0])),
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_var(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::Configuration(format!("{}: {}", name, e))),
        Ok(value) => value.trim().parse().map(Some).map_err(|_| {
            Error::Configuration(format!("{} must be a number, got '{}'", name, value))
        }),
    }
}

/// The group size requested by the launch environment, if any.
pub fn size_from_env() -> Result<Option<usize>> {
    match parse_var(SIZE_VAR)? {
        Some(0) => Err(Error::Configuration(format!(
            "{} must be at least 1",
            SIZE_VAR
        ))),
        size => Ok(size),
    }
}

struct WorkerPipe {
    rank: usize,
    child: Child,
    input: BufWriter<ChildStdin>,
    output: BufReader<ChildStdout>,
}

/// Rank 0 of a multi-process group.  Owns the worker processes.
pub struct ProcessRoot {
    size: usize,
    workers: Vec<WorkerPipe>,
}

impl ProcessRoot {
    /// Starts ranks `1..size` as child processes running `program` with
    /// `args`.  A group of one starts nothing.
    pub fn launch(size: usize, program: &Path, args: &[OsString]) -> Result<ProcessRoot> {
        check_size(size)?;
        let mut workers = Vec::with_capacity(size - 1);
        for rank in 1..size {
            let spawn_error = |reason: String| Error::Worker { rank, reason };
            let mut child = Command::new(program)
                .args(args)
                .env(RANK_VAR, rank.to_string())
                .env(SIZE_VAR, size.to_string())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|e| spawn_error(format!("could not start {}: {}", program.display(), e)))?;
            let input = child
                .stdin
                .take()
                .ok_or_else(|| spawn_error("no stdin pipe".to_string()))?;
            let output = child
                .stdout
                .take()
                .ok_or_else(|| spawn_error("no stdout pipe".to_string()))?;
            debug!("started rank {} as pid {}", rank, child.id());
            workers.push(WorkerPipe {
                rank,
                child,
                input: BufWriter::new(input),
                output: BufReader::new(output),
            });
        }
        Ok(ProcessRoot { size, workers })
    }

    fn worker(&mut self, rank: usize) -> Result<&mut WorkerPipe> {
        if rank == 0 || rank >= self.size {
            return Err(Error::Protocol(format!(
                "no rank {} in a group of {}",
                rank, self.size
            )));
        }
        Ok(&mut self.workers[rank - 1])
    }

    /// Closes the pipes and waits for every worker to exit.  Any worker
    /// that did not exit cleanly fails the run.
    pub fn finish(self) -> Result<()> {
        let mut failure = None;
        for worker in self.workers {
            let WorkerPipe {
                rank,
                mut child,
                input,
                output,
            } = worker;
            drop(input);
            drop(output);
            let status = child.wait()?;
            if !status.success() {
                warn!("rank {} exited with {}", rank, status);
                if failure.is_none() {
                    failure = Some(Error::Worker {
                        rank,
                        reason: format!("exited with {}", status),
                    });
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Communicator for ProcessRoot {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&mut self) -> Result<()> {
        for worker in &mut self.workers {
            match read_byte(&mut worker.output)? {
                Some(BARRIER_ARRIVE) => {}
                Some(other) => {
                    return Err(Error::Protocol(format!(
                        "rank {} sent byte {:#04x} at the barrier",
                        worker.rank, other
                    )))
                }
                None => {
                    return Err(Error::Worker {
                        rank: worker.rank,
                        reason: "exited before reaching the barrier".to_string(),
                    })
                }
            }
        }
        for worker in &mut self.workers {
            worker.input.write_all(&[BARRIER_RELEASE])?;
            worker.input.flush()?;
        }
        Ok(())
    }

    fn send_rows(&mut self, _range: RowRange, _cells: &[u32]) -> Result<()> {
        Err(Error::Protocol("rank 0 does not send rows".to_string()))
    }

    fn receive_rows(&mut self, from: usize, cells: usize) -> Result<(RowRange, Vec<u32>)> {
        let worker = self.worker(from)?;
        read_rows(&mut worker.output, cells)
    }
}

/// A rank started by `ProcessRoot`, talking to it over stdin/stdout.
pub struct ProcessWorker {
    rank: usize,
    size: usize,
    input: io::Stdin,
    output: BufWriter<io::Stdout>,
}

impl ProcessWorker {
    /// Recognises a worker process by its environment.  Returns `None`
    /// when this process was not started by a `ProcessRoot`.
    pub fn from_env() -> Result<Option<ProcessWorker>> {
        let rank = match parse_var(RANK_VAR)? {
            None => return Ok(None),
            Some(rank) => rank,
        };
        let size = parse_var(SIZE_VAR)?.ok_or_else(|| {
            Error::Configuration(format!("{} is set but {} is not", RANK_VAR, SIZE_VAR))
        })?;
        if rank == 0 || rank >= size {
            return Err(Error::Configuration(format!(
                "worker rank {} is outside 1..{}",
                rank, size
            )));
        }
        Ok(Some(ProcessWorker {
            rank,
            size,
            input: io::stdin(),
            output: BufWriter::new(io::stdout()),
        }))
    }
}

impl Communicator for ProcessWorker {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&mut self) -> Result<()> {
        self.output.write_all(&[BARRIER_ARRIVE])?;
        self.output.flush()?;
        match read_byte(&mut self.input)? {
            Some(BARRIER_RELEASE) => Ok(()),
            Some(other) => Err(Error::Protocol(format!(
                "root sent byte {:#04x} at the barrier",
                other
            ))),
            None => Err(Error::Protocol(
                "root went away before releasing the barrier".to_string(),
            )),
        }
    }

    fn send_rows(&mut self, range: RowRange, cells: &[u32]) -> Result<()> {
        write_rows(&mut self.output, range, cells)?;
        self.output.flush()?;
        Ok(())
    }

    fn receive_rows(&mut self, _from: usize, _cells: usize) -> Result<(RowRange, Vec<u32>)> {
        Err(Error::Protocol(format!(
            "rank {} does not receive rows",
            self.rank
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rows_survive_the_pipe_format() {
        let range = RowRange::new(3, 5).unwrap();
        let cells = vec![0, 1, 999, 1000, 7, u32::max_value()];
        let mut wire = Vec::new();
        write_rows(&mut wire, range, &cells).unwrap();
        assert_eq!(wire.len(), 24 + 4 * cells.len());
        let (got_range, got_cells) = read_rows(&mut Cursor::new(wire), cells.len()).unwrap();
        assert_eq!(got_range, range);
        assert_eq!(got_cells, cells);
    }

    #[test]
    fn truncated_block_is_an_error() {
        let mut wire = Vec::new();
        write_rows(&mut wire, RowRange::new(0, 1).unwrap(), &[1, 2, 3]).unwrap();
        wire.truncate(wire.len() - 2);
        assert!(read_rows(&mut Cursor::new(wire), 3).is_err());
    }

    #[test]
    fn inverted_range_on_the_wire_is_refused() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&9u64.to_le_bytes());
        wire.extend_from_slice(&2u64.to_le_bytes());
        wire.extend_from_slice(&0u64.to_le_bytes());
        match read_rows(&mut Cursor::new(wire), 0) {
            Err(Error::Protocol(_)) => {}
            other => panic!("expected a protocol error, got {:?}", other.map(|b| b.0)),
        }
    }

    #[test]
    fn empty_group_is_refused() {
        assert!(local_group(0).is_err());
        assert!(ProcessRoot::launch(0, Path::new("unused"), &[]).is_err());
    }

    #[test]
    fn single_process_group_starts_nothing() {
        let mut root = ProcessRoot::launch(1, Path::new("does-not-exist"), &[]).unwrap();
        assert_eq!(root.size(), 1);
        root.barrier().unwrap();
        root.finish().unwrap();
    }

    #[test]
    fn local_root_receives_out_of_order_senders() {
        let mut comms = local_group(3).unwrap();
        let mut two = comms.pop().unwrap();
        let mut one = comms.pop().unwrap();
        let mut root = comms.pop().unwrap();
        two.send_rows(RowRange::new(2, 3).unwrap(), &[2, 2]).unwrap();
        one.send_rows(RowRange::new(1, 2).unwrap(), &[1, 1]).unwrap();
        assert_eq!(root.receive_rows(1, 2).unwrap().1, vec![1, 1]);
        assert_eq!(root.receive_rows(2, 2).unwrap().1, vec![2, 2]);
        assert!(root.send_rows(RowRange::new(0, 1).unwrap(), &[0]).is_err());
        assert!(one.receive_rows(0, 2).is_err());
    }

    #[test]
    fn local_root_notices_a_silent_peer() {
        let mut comms = local_group(2).unwrap();
        let peer = comms.pop().unwrap();
        let mut root = comms.pop().unwrap();
        drop(peer);
        assert!(root.receive_rows(1, 2).is_err());
    }

    #[test]
    fn oversized_block_is_refused_before_reading_it() {
        // Claims u64::MAX cells but carries none.
        let mut wire = Vec::new();
        wire.extend_from_slice(&0u64.to_le_bytes());
        wire.extend_from_slice(&1u64.to_le_bytes());
        wire.extend_from_slice(&u64::max_value().to_le_bytes());
        match read_rows(&mut Cursor::new(wire), 4) {
            Err(Error::Protocol(msg)) => assert!(msg.contains("expected 4")),
            other => panic!("expected a protocol error, got {:?}", other.map(|b| b.0)),
        }
    }

    #[test]
    fn short_block_is_refused_by_the_local_root() {
        let mut comms = local_group(2).unwrap();
        let mut peer = comms.pop().unwrap();
        let mut root = comms.pop().unwrap();
        peer.send_rows(RowRange::new(1, 2).unwrap(), &[1]).unwrap();
        match root.receive_rows(1, 2) {
            Err(Error::Protocol(_)) => {}
            other => panic!("expected a protocol error, got {:?}", other.map(|b| b.0)),
        }
    }

    #[test]
    #[cfg(unix)]
    fn dead_worker_process_fails_the_barrier_and_the_exit() {
        // Each worker exits at once with status 1, without a word.
        let mut root = ProcessRoot::launch(3, Path::new("/bin/false"), &[]).unwrap();
        match root.barrier() {
            Err(Error::Worker { rank, reason }) => {
                assert_eq!(rank, 1);
                assert!(reason.contains("barrier"));
            }
            other => panic!("expected a worker error, got {:?}", other),
        }
        match root.finish() {
            Err(Error::Worker { rank, reason }) => {
                assert_eq!(rank, 1);
                assert!(reason.contains("exited"));
            }
            other => panic!("expected a worker error, got {:?}", other),
        }
    }
}
