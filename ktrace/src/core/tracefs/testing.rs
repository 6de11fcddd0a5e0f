//! In-memory control surface, recording every operation made on it.

use std::{
    collections::{HashMap, HashSet},
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
};

use super::*;

/// Operations performed on the fake surface. Reads are not recorded.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Op {
    Write(PathBuf, String),
    Append(PathBuf, String),
    Open(PathBuf),
}

pub(crate) struct FakeSurface {
    files: Mutex<HashMap<PathBuf, String>>,
    ops: Mutex<Vec<Op>>,
    failing: Mutex<HashSet<PathBuf>>,
    pipe: Mutex<Option<Sender<String>>>,
}

impl FakeSurface {
    /// Creates a surface reporting ftrace as available (or not).
    pub(crate) fn new(layout: &TracefsLayout, available: bool) -> FakeSurface {
        let mut files = HashMap::new();
        files.insert(
            layout.status_file().to_path_buf(),
            if available { "1\n" } else { "0\n" }.to_string(),
        );

        FakeSurface {
            files: Mutex::new(files),
            ops: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            pipe: Mutex::new(None),
        }
    }

    pub(crate) fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    /// Make all operations on a given path fail from now on.
    pub(crate) fn fail_on(&self, path: PathBuf) {
        self.failing.lock().unwrap().insert(path);
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Push a line to the last opened stream. Lines sent once its reader is
    /// gone are dropped.
    pub(crate) fn feed(&self, line: &str) {
        let _ = self
            .pipe
            .lock()
            .unwrap()
            .as_ref()
            .expect("no stream opened")
            .send(line.to_string());
    }

    /// Terminate the last opened stream, readers will see EOF.
    pub(crate) fn close_pipe(&self) {
        self.pipe.lock().unwrap().take();
    }

    fn check(&self, path: &Path) -> io::Result<()> {
        match self.failing.lock().unwrap().contains(path) {
            true => Err(io::Error::from(io::ErrorKind::PermissionDenied)),
            false => Ok(()),
        }
    }
}

impl ControlSurface for FakeSurface {
    fn read(&self, path: &Path) -> io::Result<String> {
        self.check(path)?;
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn write(&self, path: &Path, data: &str) -> io::Result<()> {
        self.check(path)?;
        self.ops
            .lock()
            .unwrap()
            .push(Op::Write(path.to_path_buf(), data.to_string()));
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), data.to_string());
        Ok(())
    }

    fn append(&self, path: &Path, data: &str) -> io::Result<()> {
        self.check(path)?;
        self.ops
            .lock()
            .unwrap()
            .push(Op::Append(path.to_path_buf(), data.to_string()));
        self.files
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default()
            .push_str(data);
        Ok(())
    }

    fn open_stream(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
        self.check(path)?;
        self.ops.lock().unwrap().push(Op::Open(path.to_path_buf()));

        let (tx, rx) = mpsc::channel();
        *self.pipe.lock().unwrap() = Some(tx);
        Ok(Box::new(BufReader::new(FakePipe {
            rx,
            buf: Vec::new(),
        })))
    }
}

/// Blocking reader fed line by line through a channel. Returns EOF once the
/// sending side is gone.
struct FakePipe {
    rx: Receiver<String>,
    buf: Vec<u8>,
}

impl Read for FakePipe {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.buf.is_empty() {
            match self.rx.recv() {
                Ok(line) => {
                    self.buf.extend_from_slice(line.as_bytes());
                    self.buf.push(b'\n');
                }
                Err(_) => return Ok(0),
            }
        }

        let len = out.len().min(self.buf.len());
        out[..len].copy_from_slice(&self.buf[..len]);
        self.buf.drain(..len);
        Ok(len)
    }
}
