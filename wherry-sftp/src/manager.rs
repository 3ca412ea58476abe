use crate::server::ServerError;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use wherry_constants::logger::Logger;
use wherry_constants::{error, trace};
use wherry_proto::{Request, Response, StatusCode};

/// Parallel workers dedicated to READ and WRITE; these dominate throughput.
pub(crate) const RW_WORKER_COUNT: usize = 8;

/// A request tagged with its arrival order.
pub(crate) struct OrderedRequest {
    pub order_id: u64,
    pub request: Request,
}

/// A completed response tagged with the order id of its request.
pub(crate) struct OrderedResponse {
    pub order_id: u64,
    pub response: Response,
}

impl PartialEq for OrderedResponse {
    fn eq(&self, other: &Self) -> bool {
        self.order_id == other.order_id
    }
}

impl Eq for OrderedResponse {}

impl PartialOrd for OrderedResponse {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedResponse {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order_id.cmp(&other.order_id)
    }
}

/// A waitable count of requests admitted but not yet responded to.
#[derive(Clone)]
pub(crate) struct InFlight {
    tx: Arc<watch::Sender<u64>>,
    rx: watch::Receiver<u64>,
}

impl InFlight {
    fn new() -> InFlight {
        let (tx, rx) = watch::channel(0u64);
        InFlight {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn add(&self) {
        self.tx.send_modify(|n| *n += 1);
    }

    pub fn done(&self) {
        self.tx.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Completes once no admitted request is outstanding.
    pub async fn wait_idle(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Where workers hand in completed responses.
#[derive(Clone)]
pub(crate) struct ResponseSink {
    completed: mpsc::UnboundedSender<OrderedResponse>,
    in_flight: InFlight,
}

impl ResponseSink {
    pub fn ready(&self, response: OrderedResponse) {
        let _ = self.completed.send(response);
        self.in_flight.done();
    }
}

/// Enforces the protocol's ordering rule: replies go out in the same order
/// their requests arrived, regardless of which worker finished first.
///
/// The reader admits each request, which assigns it the next order id and
/// records it in flight.  A controller task owns the transport writer and
/// two queues: `incoming`, the admitted order ids in arrival order, and
/// `outgoing`, a min-heap of completed responses.  Whenever both heads
/// carry the same order id the head response is encoded and written.
pub(crate) struct PacketManager {
    admitted: mpsc::UnboundedSender<u64>,
    sink: ResponseSink,
    in_flight: InFlight,
    next_order: u64,
    shutdown: watch::Receiver<bool>,
    controller: JoinHandle<Result<(), ServerError>>,
}

impl PacketManager {
    pub fn new<W>(logger: Arc<dyn Logger + Send + Sync>, wr: W) -> PacketManager
    where
        W: AsyncWriteExt + Unpin + Send + 'static,
    {
        let (admitted_tx, admitted_rx) = mpsc::unbounded_channel();
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let in_flight = InFlight::new();
        let controller = tokio::spawn(controller_loop(
            logger,
            wr,
            admitted_rx,
            completed_rx,
            shutdown_tx,
        ));
        PacketManager {
            admitted: admitted_tx,
            sink: ResponseSink {
                completed: completed_tx,
                in_flight: in_flight.clone(),
            },
            in_flight,
            next_order: 0,
            shutdown: shutdown_rx,
            controller,
        }
    }

    pub fn sink(&self) -> ResponseSink {
        self.sink.clone()
    }

    /// Signalled when the controller hits a transport write error; the
    /// reader tears the connection down when it fires.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Admits a response slot: assigns the next order id and marks it in
    /// flight.  Every slot must eventually reach the sink.
    pub fn admit_slot(&mut self) -> u64 {
        let order_id = self.next_order;
        self.next_order += 1;
        self.in_flight.add();
        let _ = self.admitted.send(order_id);
        order_id
    }

    pub fn admit(&mut self, request: Request) -> OrderedRequest {
        OrderedRequest {
            order_id: self.admit_slot(),
            request,
        }
    }

    /// Blocks until every admitted request has produced its response.  The
    /// dispatcher calls this before admitting a CLOSE so all in-flight reads
    /// and writes on the handle have completed.
    pub async fn drain(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Closes the admission side and waits for the controller to flush and
    /// exit, returning any transport write error it hit.
    ///
    /// Workers must have finished first so their sink clones are gone.
    pub async fn finish(self) -> Result<(), ServerError> {
        drop(self.admitted);
        drop(self.sink);
        match self.controller.await {
            Ok(result) => result,
            Err(_) => Err(ServerError::IOError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "packet controller failed",
            ))),
        }
    }
}

async fn controller_loop<W>(
    logger: Arc<dyn Logger + Send + Sync>,
    mut wr: W,
    mut admitted_rx: mpsc::UnboundedReceiver<u64>,
    mut completed_rx: mpsc::UnboundedReceiver<OrderedResponse>,
    shutdown_tx: watch::Sender<bool>,
) -> Result<(), ServerError>
where
    W: AsyncWriteExt + Unpin + Send + 'static,
{
    let mut incoming: VecDeque<u64> = VecDeque::new();
    let mut outgoing: BinaryHeap<Reverse<OrderedResponse>> = BinaryHeap::new();
    let mut admitted_open = true;
    let mut completed_open = true;
    while admitted_open || completed_open {
        tokio::select! {
            admitted = admitted_rx.recv(), if admitted_open => match admitted {
                Some(order_id) => incoming.push_back(order_id),
                None => admitted_open = false,
            },
            completed = completed_rx.recv(), if completed_open => match completed {
                Some(response) => outgoing.push(Reverse(response)),
                None => completed_open = false,
            },
        }
        if let Err(e) = send_ready(&logger, &mut wr, &mut incoming, &mut outgoing).await {
            error!(logger, "sftp: transport write failed, tearing down");
            let _ = shutdown_tx.send(true);
            return Err(e);
        }
    }
    Ok(())
}

/// Emits as many responses as are ready: while the oldest admitted request
/// and the oldest completed response share an order id, that response is the
/// one the client expects next.
async fn send_ready<W>(
    logger: &Arc<dyn Logger + Send + Sync>,
    wr: &mut W,
    incoming: &mut VecDeque<u64>,
    outgoing: &mut BinaryHeap<Reverse<OrderedResponse>>,
) -> Result<(), ServerError>
where
    W: AsyncWriteExt + Unpin + Send,
{
    let mut wrote = false;
    loop {
        match (incoming.front(), outgoing.peek()) {
            (Some(head), Some(Reverse(response))) if *head == response.order_id => {}
            _ => break,
        }
        incoming.pop_front();
        let response = match outgoing.pop() {
            Some(Reverse(r)) => r,
            None => break,
        };
        trace!(
            logger,
            "sftp: sending response {:?} order {}",
            response.response.kind(),
            response.order_id
        );
        let frame = match response.response.encode() {
            Ok(frame) => frame,
            Err(e) => {
                // The slot is still consumed so the pipeline never stalls; a
                // generic failure goes out in the response's place.
                error!(logger, "sftp: failed to marshal response: {}", e);
                let id = response.response.request_id().unwrap_or(0);
                match Response::status(id, StatusCode::Failure, "failed to marshal response")
                    .encode()
                {
                    Ok(frame) => frame,
                    Err(_) => continue,
                }
            }
        };
        wr.write_all(&frame).await.map_err(ServerError::IOError)?;
        wrote = true;
    }
    if wrote {
        wr.flush().await.map_err(ServerError::IOError)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{InFlight, OrderedResponse, PacketManager};
    use std::convert::TryInto;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use wherry_constants::logger::NullLogger;
    use num_traits::FromPrimitive as _;
    use wherry_proto::{PacketType, Response, StatusCode};

    async fn read_response(rd: &mut (impl AsyncReadExt + Unpin)) -> Response {
        let mut len = [0u8; 4];
        rd.read_exact(&mut len).await.unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        rd.read_exact(&mut body).await.unwrap();
        let kind = PacketType::from_u8(body[0]).unwrap();
        Response::decode(kind, &body[1..]).unwrap()
    }

    #[tokio::test]
    async fn responses_are_reordered_to_arrival_order() {
        let (mut client, server) = tokio::io::duplex(1 << 16);
        let mut mgr = PacketManager::new(Arc::new(NullLogger), server);
        let sink = mgr.sink();

        let slots: Vec<u64> = (0..4).map(|_| mgr.admit_slot()).collect();
        // Complete in a scrambled order; request ids mirror order ids so the
        // wire order is observable.
        for &i in &[2usize, 0, 3, 1] {
            sink.ready(OrderedResponse {
                order_id: slots[i],
                response: Response::status(i as u32, StatusCode::Ok, "OK"),
            });
        }

        for want in 0u32..4 {
            let resp = read_response(&mut client).await;
            assert_eq!(resp.request_id(), Some(want));
        }

        drop(sink);
        mgr.finish().await.unwrap();
    }

    #[tokio::test]
    async fn a_missing_predecessor_holds_back_later_responses() {
        let (mut client, server) = tokio::io::duplex(1 << 16);
        let mut mgr = PacketManager::new(Arc::new(NullLogger), server);
        let sink = mgr.sink();

        let first = mgr.admit_slot();
        let second = mgr.admit_slot();
        sink.ready(OrderedResponse {
            order_id: second,
            response: Response::status(1, StatusCode::Ok, "OK"),
        });

        // Nothing may be written while the first response is outstanding.
        let mut buf = [0u8; 1];
        tokio::select! {
            _ = client.read(&mut buf) => panic!("response emitted out of order"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        sink.ready(OrderedResponse {
            order_id: first,
            response: Response::status(0, StatusCode::Ok, "OK"),
        });
        assert_eq!(read_response(&mut client).await.request_id(), Some(0));
        assert_eq!(read_response(&mut client).await.request_id(), Some(1));
        drop(sink);
        mgr.finish().await.unwrap();
    }

    #[tokio::test]
    async fn drain_waits_for_outstanding_work() {
        let (_client, server) = tokio::io::duplex(1 << 16);
        let mut mgr = PacketManager::new(Arc::new(NullLogger), server);
        let sink = mgr.sink();
        let slot = mgr.admit_slot();

        // drain must not complete while the slot is outstanding.
        tokio::select! {
            _ = mgr.drain() => panic!("drain returned with work in flight"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
        sink.ready(OrderedResponse {
            order_id: slot,
            response: Response::status(0, StatusCode::Ok, "OK"),
        });
        mgr.drain().await;
    }

    #[tokio::test]
    async fn in_flight_gauge_counts() {
        let gauge = InFlight::new();
        gauge.wait_idle().await;
        gauge.add();
        gauge.add();
        gauge.done();
        tokio::select! {
            _ = gauge.wait_idle() => panic!("idle with one outstanding"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }
        gauge.done();
        gauge.wait_idle().await;
    }

    #[tokio::test]
    async fn frames_carry_exact_length_prefixes() {
        let (mut client, server) = tokio::io::duplex(1 << 16);
        let mut mgr = PacketManager::new(Arc::new(NullLogger), server);
        let sink = mgr.sink();
        let slot = mgr.admit_slot();
        sink.ready(OrderedResponse {
            order_id: slot,
            response: Response::Handle {
                id: 1,
                handle: "ab".into(),
            },
        });
        drop(sink);
        mgr.finish().await.unwrap();

        let mut all = Vec::new();
        client.read_to_end(&mut all).await.unwrap();
        let len = u32::from_be_bytes(all[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, all.len() - 4);
    }
}
