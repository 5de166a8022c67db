//! Modbus TCP front end of the simulator
//!
//! Serves FC03 from the shared [`RegisterStore`] and answers everything else
//! with an exception response, the way a PLC would. Requests for any unit id
//! are answered and the response echoes the request's unit id.

use std::future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::Server;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use errors::{GcsError, GcsResult};

use crate::store::RegisterStore;

/// Largest FC03 read that fits in one PDU
pub const MAX_READ_REGISTERS: u16 = 125;

pub struct ModbusServer {
    store: Arc<RegisterStore>,
}

impl ModbusServer {
    pub fn new(store: Arc<RegisterStore>) -> Self {
        Self { store }
    }

    /// Bind `addr` and spawn the server task
    ///
    /// Returns the bound address (useful with port 0) and the task's handle,
    /// which finishes once `cancel` fires. Open client links are closed on
    /// their next request after cancellation.
    pub async fn start(
        self,
        addr: &str,
        cancel: CancellationToken,
    ) -> GcsResult<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GcsError::connection_failed(addr, e))?;
        let local_addr = listener.local_addr()?;
        info!("Modbus simulator listening on {}", local_addr);

        let store = self.store;
        let handle = tokio::spawn(async move {
            let server = Server::new(listener);
            let on_connected = |stream: TcpStream, peer: SocketAddr| {
                let service = RegisterService {
                    store: store.clone(),
                };
                let stream = CancellableStream {
                    inner: stream,
                    cancel: cancel.child_token(),
                };
                async move {
                    debug!("New connection from {}", peer);
                    Ok::<_, io::Error>(Some((service, stream)))
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {},
                result = server.serve(&on_connected, |err| debug!("Connection error: {}", err)) => {
                    if let Err(e) = result {
                        error!("Modbus server on {} failed: {}", local_addr, e);
                    }
                },
            }
            info!("Modbus simulator on {} stopped", local_addr);
        });

        Ok((local_addr, handle))
    }
}

/// FC03 service over the shared register block
struct RegisterService {
    store: Arc<RegisterStore>,
}

impl tokio_modbus::server::Service for RegisterService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(respond(&self.store, &req))
    }
}

/// Response for one decoded request
pub fn respond(store: &RegisterStore, request: &Request<'_>) -> Result<Response, ExceptionCode> {
    let (start, quantity) = match request {
        Request::ReadHoldingRegisters(start, quantity) => (*start, *quantity),
        other => {
            debug!("Unsupported request {:?}", other);
            return Err(ExceptionCode::IllegalFunction);
        },
    };
    if quantity == 0 || quantity > MAX_READ_REGISTERS {
        return Err(ExceptionCode::IllegalDataValue);
    }

    store
        .read(start, quantity)
        .map(Response::ReadHoldingRegisters)
        .ok_or(ExceptionCode::IllegalDataAddress)
}

/// Client stream that reads as closed once the server is cancelled
#[derive(Debug)]
struct CancellableStream {
    inner: TcpStream,
    cancel: CancellationToken,
}

impl AsyncRead for CancellableStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            // zero bytes read is end of stream
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CancellableStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
