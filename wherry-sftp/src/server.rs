use crate::handles::HandleTable;
use crate::long_name::long_name;
use crate::manager::{
    OrderedRequest, OrderedResponse, PacketManager, ResponseSink, RW_WORKER_COUNT,
};
use num_traits::FromPrimitive as _;
use std::fmt;
use std::io;
use std::marker::Unpin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use wherry_constants::logger::Logger;
use wherry_constants::{error, trace, Error};
use wherry_fs::{clean_path, Backend};
use wherry_proto::packet::peek_request_id;
use wherry_proto::{
    ExtendedRequest, FileAttr, NameEntry, PacketType, Request, Response, StatusCode, SymlinkOrder,
    MAX_DATA_PAYLOAD, MAX_READDIR_ENTRIES, PROTOCOL_VERSION,
};

#[derive(Debug)]
pub enum ServerError {
    InvalidSize,
    IOError(io::Error),
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> ServerError {
        ServerError::IOError(e)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::InvalidSize => write!(f, "invalid size"),
            Self::IOError(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

/// Per-connection server settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// SYMLINK path order; OpenSSH's reversed order is the interoperable
    /// default.
    pub symlink_order: SymlinkOrder,
    /// The largest frame the server will accept, capping attacker-chosen
    /// allocations.
    pub max_packet: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            symlink_order: SymlinkOrder::default(),
            max_packet: 256 * 1024,
        }
    }
}

/// An SFTP v3 server over one transport.
///
/// All state is per connection: the handle table, the order counter, and
/// the worker pool are created inside [`Server::run`] and torn down when the
/// transport reaches EOF or fails.
pub struct Server<B, R, W> {
    logger: Arc<dyn Logger + Send + Sync>,
    backend: Arc<B>,
    config: ServerConfig,
    rd: R,
    wr: W,
}

/// Consumes `transport` until EOF or error, serving SFTP requests against
/// `backend`.  The terminating error is returned; a clean client EOF is
/// `Ok(())`.
pub async fn serve<B, T>(
    logger: Arc<dyn Logger + Send + Sync>,
    backend: B,
    config: ServerConfig,
    transport: T,
) -> Result<(), ServerError>
where
    B: Backend + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (rd, wr) = tokio::io::split(transport);
    Server::new(logger, backend, config, rd, wr).run().await
}

impl<B, R, W> Server<B, R, W>
where
    B: Backend + 'static,
    R: AsyncReadExt + Unpin + Send,
    W: AsyncWriteExt + Unpin + Send + 'static,
{
    pub fn new(
        logger: Arc<dyn Logger + Send + Sync>,
        backend: B,
        config: ServerConfig,
        rd: R,
        wr: W,
    ) -> Server<B, R, W> {
        Server {
            logger,
            backend: Arc::new(backend),
            config,
            rd,
            wr,
        }
    }

    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            logger,
            backend,
            config,
            mut rd,
            wr,
        } = self;
        let handles = Arc::new(HandleTable::new());
        let mut mgr = PacketManager::new(logger.clone(), wr);
        let mut shutdown = mgr.shutdown_signal();

        let ctx = WorkerContext {
            logger: logger.clone(),
            backend,
            handles: handles.clone(),
        };
        let (rw_tx, rw_rx) = mpsc::channel::<OrderedRequest>(RW_WORKER_COUNT);
        let (serial_tx, serial_rx) = mpsc::channel::<OrderedRequest>(1);
        let shared_rw_rx = Arc::new(TokioMutex::new(rw_rx));
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        for _ in 0..RW_WORKER_COUNT {
            workers.push(tokio::spawn(pool_worker(
                shared_rw_rx.clone(),
                mgr.sink(),
                ctx.clone(),
            )));
        }
        workers.push(tokio::spawn(serial_worker(serial_rx, mgr.sink(), ctx)));

        let read_result = loop {
            let frame = tokio::select! {
                frame = read_frame(&mut rd, config.max_packet) => frame,
                _ = shutdown.changed() => break Ok(()),
            };
            let (kind_byte, body) = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            let decoded = match PacketType::from_u8(kind_byte) {
                Some(kind) => {
                    trace!(
                        logger,
                        "sftp: packet {:?} ({:02x}) len {}",
                        kind,
                        kind_byte,
                        body.len()
                    );
                    Request::decode(kind, &body, config.symlink_order)
                }
                None => {
                    trace!(logger, "sftp: unknown packet type {:02x}", kind_byte);
                    Err(Error::EOPNOTSUPP)
                }
            };
            match decoded {
                Ok(request) => {
                    let is_rw =
                        matches!(request, Request::Read { .. } | Request::Write { .. });
                    if matches!(request, Request::Close { .. }) {
                        // All admitted reads and writes must finish before a
                        // CLOSE is dispatched.
                        mgr.drain().await;
                    }
                    let ordered = mgr.admit(request);
                    let sent = if is_rw {
                        rw_tx.send(ordered).await
                    } else {
                        serial_tx.send(ordered).await
                    };
                    if sent.is_err() {
                        break Ok(());
                    }
                }
                Err(e) => {
                    // The packet is unusable, but the id at the front of the
                    // body lets the failure status land on the right request,
                    // and the slot keeps the pipeline ordered.
                    let id = peek_request_id(&body).unwrap_or(0);
                    trace!(
                        logger,
                        "sftp: undecodable packet type {:02x} id {}: {}",
                        kind_byte,
                        id,
                        e
                    );
                    let order_id = mgr.admit_slot();
                    mgr.sink().ready(OrderedResponse {
                        order_id,
                        response: Response::status_from_error(id, e),
                    });
                }
            }
        };

        drop(rw_tx);
        drop(serial_tx);
        for worker in workers {
            let _ = worker.await;
        }
        let write_result = mgr.finish().await;
        handles.close_all(&logger);
        read_result.and(write_result)
    }
}

/// Reads one `u32 length | u8 type | payload` frame.  A clean EOF at a frame
/// boundary yields `None`; EOF mid-frame is an error.
async fn read_frame<R: AsyncReadExt + Unpin>(
    rd: &mut R,
    max_packet: usize,
) -> Result<Option<(u8, Vec<u8>)>, ServerError> {
    let mut len_buf = [0u8; 4];
    match rd.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ServerError::IOError(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len < 1 || len > max_packet {
        return Err(ServerError::InvalidSize);
    }
    let mut body = vec![0u8; len];
    rd.read_exact(&mut body).await.map_err(ServerError::IOError)?;
    let payload = body.split_off(1);
    Ok(Some((body[0], payload)))
}

struct WorkerContext<B> {
    logger: Arc<dyn Logger + Send + Sync>,
    backend: Arc<B>,
    handles: Arc<HandleTable>,
}

impl<B> Clone for WorkerContext<B> {
    fn clone(&self) -> Self {
        WorkerContext {
            logger: self.logger.clone(),
            backend: self.backend.clone(),
            handles: self.handles.clone(),
        }
    }
}

/// One of the READ/WRITE pool workers; the pool shares a single queue.
async fn pool_worker<B: Backend + 'static>(
    rx: Arc<TokioMutex<mpsc::Receiver<OrderedRequest>>>,
    sink: ResponseSink,
    ctx: WorkerContext<B>,
) {
    loop {
        let next = { rx.lock().await.recv().await };
        match next {
            Some(pkt) => run_request(&ctx, &sink, pkt).await,
            None => break,
        }
    }
}

/// The single worker for everything that is not READ or WRITE, so metadata
/// operations observe each other in arrival order.
async fn serial_worker<B: Backend + 'static>(
    mut rx: mpsc::Receiver<OrderedRequest>,
    sink: ResponseSink,
    ctx: WorkerContext<B>,
) {
    while let Some(pkt) = rx.recv().await {
        run_request(&ctx, &sink, pkt).await;
    }
}

async fn run_request<B: Backend + 'static>(
    ctx: &WorkerContext<B>,
    sink: &ResponseSink,
    pkt: OrderedRequest,
) {
    let OrderedRequest { order_id, request } = pkt;
    let id = request.request_id().unwrap_or(0);
    let ctx2 = ctx.clone();
    // Backend I/O is synchronous; keep it off the async workers.
    let response = match tokio::task::spawn_blocking(move || {
        process_request(&ctx2.logger, &*ctx2.backend, &ctx2.handles, request)
    })
    .await
    {
        Ok(response) => response,
        Err(_) => {
            error!(ctx.logger, "sftp: request worker panicked");
            Response::status(id, StatusCode::Failure, "internal error")
        }
    };
    sink.ready(OrderedResponse { order_id, response });
}

/// Turns one decoded request into its response, funnelling every handler
/// error through the status-code mapping.  Never panics on handler errors.
fn process_request<B: Backend>(
    logger: &Arc<dyn Logger + Send + Sync>,
    backend: &B,
    handles: &HandleTable,
    request: Request,
) -> Response {
    trace!(
        logger,
        "sftp: processing {:?} id {:?}",
        request.kind(),
        request.request_id()
    );
    let id = request.request_id().unwrap_or(0);
    let result = match request {
        Request::Init { version, .. } => {
            trace!(logger, "sftp: client speaks version {}", version);
            Ok(Response::Version {
                version: PROTOCOL_VERSION,
                extensions: Vec::new(),
            })
        }
        Request::Open {
            id,
            path,
            pflags,
            attr,
        } => backend
            .open_file(&clean_path(&path), pflags, &attr)
            .map(|file| Response::Handle {
                id,
                handle: handles.register_file(file),
            }),
        Request::Opendir { id, path } => {
            backend
                .open_dir(&clean_path(&path))
                .map(|dir| Response::Handle {
                    id,
                    handle: handles.register_dir(dir),
                })
        }
        Request::Close { id, handle } => handles.close(&handle).map(|()| Response::ok(id)),
        Request::Read {
            id,
            handle,
            offset,
            len,
        } => read_file(handles, id, &handle, offset, len),
        Request::Write {
            id,
            handle,
            offset,
            data,
        } => write_file(handles, id, &handle, offset, &data),
        Request::Stat { id, path } => backend
            .stat(&clean_path(&path))
            .map(|attr| Response::Attrs { id, attr }),
        Request::Lstat { id, path } => backend
            .lstat(&clean_path(&path))
            .map(|attr| Response::Attrs { id, attr }),
        Request::Fstat { id, handle } => handles
            .get_file(&handle)
            .and_then(|file| file.stat())
            .map(|attr| Response::Attrs { id, attr }),
        Request::Setstat { id, path, attr } => backend
            .setstat(&clean_path(&path), &attr)
            .map(|()| Response::ok(id)),
        Request::Fsetstat { id, handle, attr } => handles
            .get_file(&handle)
            .and_then(|file| file.setstat(&attr))
            .map(|()| Response::ok(id)),
        Request::Readdir { id, handle } => read_dir(handles, id, &handle),
        Request::Remove { id, path } => backend
            .remove(&clean_path(&path))
            .map(|()| Response::ok(id)),
        Request::Mkdir { id, path, attr } => backend
            .mkdir(&clean_path(&path), &attr)
            .map(|()| Response::ok(id)),
        Request::Rmdir { id, path } => backend
            .rmdir(&clean_path(&path))
            .map(|()| Response::ok(id)),
        Request::Realpath { id, path } => real_path(backend, id, &path),
        Request::Rename {
            id,
            old_path,
            new_path,
        } => backend
            .rename(&clean_path(&old_path), &clean_path(&new_path))
            .map(|()| Response::ok(id)),
        Request::Readlink { id, path } => {
            backend.read_link(&clean_path(&path)).map(|target| {
                Response::Name {
                    id,
                    entries: vec![NameEntry {
                        name: target.clone(),
                        long_name: target,
                        attr: FileAttr::default(),
                    }],
                }
            })
        }
        // The link target is symlink content, not a lookup path, so it is
        // passed through uncleaned.
        Request::Symlink {
            id,
            link_path,
            target_path,
        } => backend
            .symlink(&clean_path(&link_path), &target_path)
            .map(|()| Response::ok(id)),
        Request::Extended { id, name, data } => extended(backend, id, &name, &data),
    };
    match result {
        Ok(response) => response,
        Err(e) => Response::status_from_error(id, e),
    }
}

fn read_file(
    handles: &HandleTable,
    id: u32,
    handle: &str,
    offset: u64,
    len: u32,
) -> Result<Response, Error> {
    let file = handles.get_file(handle)?;
    let len = len.min(MAX_DATA_PAYLOAD) as usize;
    let mut buf = vec![0u8; len];
    let n = file.read_at(&mut buf, offset)?;
    if n == 0 && len > 0 {
        return Ok(Response::status(
            id,
            StatusCode::Eof,
            StatusCode::Eof.message(),
        ));
    }
    buf.truncate(n);
    Ok(Response::Data { id, data: buf })
}

fn write_file(
    handles: &HandleTable,
    id: u32,
    handle: &str,
    offset: u64,
    data: &[u8],
) -> Result<Response, Error> {
    let file = handles.get_file(handle)?;
    let mut written = 0usize;
    while written < data.len() {
        let n = file.write_at(&data[written..], offset + written as u64)?;
        if n == 0 {
            return Err(Error::EIO);
        }
        written += n;
    }
    Ok(Response::ok(id))
}

fn read_dir(handles: &HandleTable, id: u32, handle: &str) -> Result<Response, Error> {
    let dir = handles.get_dir(handle)?;
    let mut reader = dir.lock().map_err(|_| Error::EIO)?;
    let mut entries = Vec::new();
    let exhausted = reader.read_entries(&mut entries, MAX_READDIR_ENTRIES)?;
    if entries.is_empty() && exhausted {
        return Ok(Response::status(
            id,
            StatusCode::Eof,
            StatusCode::Eof.message(),
        ));
    }
    let entries = entries
        .into_iter()
        .map(|entry| NameEntry {
            long_name: long_name(&entry.name, &entry.attr),
            name: entry.name,
            attr: entry.attr,
        })
        .collect();
    Ok(Response::Name { id, entries })
}

fn real_path<B: Backend>(backend: &B, id: u32, path: &str) -> Result<Response, Error> {
    // Absolute paths resolve in the core; relative ones go to the backend,
    // which may decline with EOPNOTSUPP.
    let resolved = if path.starts_with('/') {
        clean_path(path)
    } else {
        backend.real_path(path)?
    };
    Ok(Response::Name {
        id,
        entries: vec![NameEntry {
            name: resolved.clone(),
            long_name: resolved,
            attr: FileAttr::default(),
        }],
    })
}

fn extended<B: Backend>(backend: &B, id: u32, name: &str, data: &[u8]) -> Result<Response, Error> {
    match ExtendedRequest::parse(name, data)? {
        Some(ExtendedRequest::StatVfs { path }) => backend
            .statvfs(&clean_path(&path))
            .map(|vfs| Response::ExtendedReply {
                id,
                data: vfs.to_bytes(),
            }),
        Some(ExtendedRequest::PosixRename { old_path, new_path }) => backend
            .posix_rename(&clean_path(&old_path), &clean_path(&new_path))
            .map(|()| Response::ok(id)),
        None => Ok(Response::status(
            id,
            StatusCode::OpUnsupported,
            StatusCode::OpUnsupported.message(),
        )),
    }
}
