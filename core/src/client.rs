//! The HTTP client and its three execution shapes.
//!
//! # Design
//! Every exchange runs as one task on a tokio runtime: register the request
//! in the pool, race the network call against cancellation, release the pool
//! entry, then decode and classify. The shapes differ only in how the result
//! reaches the caller:
//!
//! - [`HttpClient::execute`] returns an [`Exchange`] future (or a one-item
//!   stream via [`Exchange::into_stream`]).
//! - [`HttpClient::execute_with_callback`] hands the result to the client's
//!   [`DeliveryContext`].
//! - [`HttpClient::execute_blocking`] parks the calling thread on a one-shot
//!   channel until the task reports back.
//!
//! # Blocking and deadlock
//! The blocking shape waits for a task that needs a runtime worker to make
//! progress. Called from a thread that is the only driver of that runtime it
//! would wait forever. Calls from inside a current-thread runtime are refused
//! with [`TransportError::BlockingWouldDeadlock`]; inside a multi-thread
//! runtime the wait goes through `block_in_place`. A client built on a
//! borrowed current-thread runtime handle still needs that runtime to be
//! driven by some other thread while a blocking call waits.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::mpsc;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures::future::FusedFuture;
use futures::FutureExt;
use futures::stream::{self, Stream};
use tokio::runtime::{self, Handle, Runtime, RuntimeFlavor};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::decoder::{DecoderChain, ResponseBody};
use crate::delivery::{DeliveryContext, DeliveryQueue};
use crate::error::{classify, HttpError, HttpResult, ResponseError, TransportError};
use crate::http::Request;
use crate::network::{Network, RawResponse, ReqwestNetwork};
use crate::pool::{ChallengeHandler, CredentialResolver, RequestPool};
use crate::response::Response;

/// Cancels one exchange. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state: Arc::new(state) }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_canceled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver.wait_for(|canceled| *canceled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything an exchange task needs. Tasks hold a clone of this rather than
/// the client, so dropping the last client handle is never blocked on them.
#[derive(Clone)]
struct Engine {
    network: Arc<dyn Network>,
    pool: Arc<RequestPool>,
    resolver: Arc<CredentialResolver>,
    decoders: DecoderChain,
}

impl Engine {
    async fn exchange<T: ResponseBody>(self, request: Request, cancel: CancelHandle) -> HttpResult<T> {
        let request = Arc::new(request);
        let wire = request.to_wire();
        let url = wire.url.clone();
        let guard = self.pool.insert(Arc::clone(&request));
        let exchange = guard.id();
        debug!(%exchange, method = %wire.method, %url, "exchange started");

        let challenges: Arc<dyn ChallengeHandler> = self.resolver.clone();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Canceled),
            result = self.network.send(wire, challenges) => result,
        };
        guard.release();

        let result = self.handle_response(url, outcome);
        match &result {
            Ok(response) => debug!(%exchange, status = response.status_code(), "exchange finished"),
            Err(error) => debug!(%exchange, %error, "exchange failed"),
        }
        result
    }

    /// [`exchange`](Self::exchange) for shapes that report through a channel
    /// or callback. A panic inside the task becomes [`TransportError::Aborted`]
    /// so the caller still hears back.
    async fn supervised<T: ResponseBody>(self, request: Request, cancel: CancelHandle) -> HttpResult<T> {
        match AssertUnwindSafe(self.exchange::<T>(request, cancel)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%message, "exchange task panicked");
                Err(TransportError::Aborted(message).into())
            }
        }
    }

    fn handle_response<T: ResponseBody>(
        &self,
        url: String,
        outcome: Result<RawResponse, TransportError>,
    ) -> HttpResult<T> {
        let raw = match outcome {
            Ok(raw) => raw,
            Err(TransportError::Canceled) => return Err(ResponseError::Canceled { url }.into()),
            Err(error) => return Err(error.into()),
        };
        let body_object = self.decoders.decode::<T>(&raw.body);
        let response = Response::new(
            raw.status_code,
            Some(raw.body),
            body_object,
            raw.headers,
            raw.url.or(Some(url)),
        );
        classify(response).map_err(HttpError::from)
    }
}

struct ClientRuntime {
    handle: Handle,
    owned: Option<Runtime>,
}

impl Drop for ClientRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}

struct ClientInner {
    engine: Engine,
    delivery: Arc<dyn DeliveryContext>,
    runtime: ClientRuntime,
}

/// Executes requests. Cheap to clone; clones share the pool, the runtime and
/// the delivery context.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    /// A client with the reqwest network, the standard decoders and a
    /// dedicated delivery thread.
    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Number of exchanges currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.engine.pool.len()
    }

    pub fn pool(&self) -> &Arc<RequestPool> {
        &self.inner.engine.pool
    }

    /// Start an exchange and return a future for its result.
    pub fn execute<T: ResponseBody>(&self, request: Request) -> Exchange<T> {
        let cancel = CancelHandle::new();
        let url = request.url().to_string();
        let task = self
            .inner
            .runtime
            .handle
            .spawn(self.inner.engine.clone().exchange(request, cancel.clone()));
        Exchange {
            task,
            cancel,
            url,
            terminated: false,
        }
    }

    /// Start an exchange and deliver its result to `callback` through the
    /// client's delivery context. The pool entry is gone before the callback
    /// runs. If the runtime shuts down first the callback never runs.
    pub fn execute_with_callback<T, F>(&self, request: Request, callback: F) -> CancelHandle
    where
        T: ResponseBody,
        F: FnOnce(HttpResult<T>) + Send + 'static,
    {
        let cancel = CancelHandle::new();
        let engine = self.inner.engine.clone();
        let delivery = Arc::clone(&self.inner.delivery);
        let task_cancel = cancel.clone();
        self.inner.runtime.handle.spawn(async move {
            let result = engine.supervised::<T>(request, task_cancel).await;
            delivery.deliver(Box::new(move || callback(result)));
        });
        cancel
    }

    /// Run an exchange to completion on the calling thread.
    pub fn execute_blocking<T: ResponseBody>(&self, request: Request) -> HttpResult<T> {
        self.execute_blocking_with(request, &CancelHandle::new())
    }

    /// Like [`execute_blocking`](Self::execute_blocking), cancellable from
    /// another thread through `cancel`.
    pub fn execute_blocking_with<T: ResponseBody>(&self, request: Request, cancel: &CancelHandle) -> HttpResult<T> {
        let flavor = Handle::try_current().ok().map(|handle| handle.runtime_flavor());
        if flavor == Some(RuntimeFlavor::CurrentThread) {
            warn!(url = request.url(), "refusing to block a current-thread runtime");
            return Err(TransportError::BlockingWouldDeadlock.into());
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        let engine = self.inner.engine.clone();
        let cancel = cancel.clone();
        self.inner.runtime.handle.spawn(async move {
            let result = engine.supervised::<T>(request, cancel).await;
            let _ = sender.send(result);
        });

        let wait = move || {
            receiver
                .recv()
                .map_err(|_| HttpError::from(TransportError::RuntimeShutdown))
                .and_then(|result| result)
        };
        match flavor {
            Some(_) => tokio::task::block_in_place(wait),
            None => wait(),
        }
    }

    pub fn get<T: ResponseBody>(&self, url: &str) -> Exchange<T> {
        self.execute(Request::get(url))
    }

    pub fn get_blocking<T: ResponseBody>(&self, url: &str) -> HttpResult<T> {
        self.execute_blocking(Request::get(url))
    }

    pub fn get_with_callback<T, F>(&self, url: &str, callback: F) -> CancelHandle
    where
        T: ResponseBody,
        F: FnOnce(HttpResult<T>) + Send + 'static,
    {
        self.execute_with_callback(Request::get(url), callback)
    }
}

/// Configures an [`HttpClient`].
#[derive(Default)]
pub struct HttpClientBuilder {
    network: Option<Arc<dyn Network>>,
    decoders: Option<DecoderChain>,
    delivery: Option<Arc<dyn DeliveryContext>>,
    runtime: Option<Handle>,
}

impl HttpClientBuilder {
    pub fn network<N: Network>(mut self, network: N) -> Self {
        self.network = Some(Arc::new(network));
        self
    }

    pub fn decoders(mut self, decoders: DecoderChain) -> Self {
        self.decoders = Some(decoders);
        self
    }

    pub fn delivery<D: DeliveryContext + 'static>(mut self, delivery: D) -> Self {
        self.delivery = Some(Arc::new(delivery));
        self
    }

    /// Run exchanges on an existing runtime. Without this the ambient runtime
    /// is used, or a private one is started when there is none.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<HttpClient, TransportError> {
        let network = match self.network {
            Some(network) => network,
            None => Arc::new(ReqwestNetwork::new()?),
        };
        let delivery = match self.delivery {
            Some(delivery) => delivery,
            None => Arc::new(DeliveryQueue::spawn("courier-delivery").map_err(TransportError::Runtime)?),
        };
        let runtime = match self.runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => ClientRuntime { handle, owned: None },
            None => {
                let owned = runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .thread_name("courier-worker")
                    .enable_all()
                    .build()
                    .map_err(TransportError::Runtime)?;
                ClientRuntime {
                    handle: owned.handle().clone(),
                    owned: Some(owned),
                }
            }
        };

        let pool = Arc::new(RequestPool::new());
        let resolver = Arc::new(CredentialResolver::new(Arc::clone(&pool)));
        Ok(HttpClient {
            inner: Arc::new(ClientInner {
                engine: Engine {
                    network,
                    pool,
                    resolver,
                    decoders: self.decoders.unwrap_or_else(DecoderChain::standard),
                },
                delivery,
                runtime,
            }),
        })
    }
}

/// An in-flight exchange.
///
/// Completes exactly once. Polling again after completion stays pending.
/// Dropping an unfinished exchange cancels it.
pub struct Exchange<T> {
    task: JoinHandle<HttpResult<T>>,
    cancel: CancelHandle,
    url: String,
    terminated: bool,
}

impl<T> Exchange<T> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl<T: ResponseBody> Exchange<T> {
    /// A stream that yields the result once and then ends.
    pub fn into_stream(self) -> impl Stream<Item = HttpResult<T>> {
        stream::once(self)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_owned()
    }
}

impl<T: ResponseBody> Future for Exchange<T> {
    type Output = HttpResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.terminated {
            return Poll::Pending;
        }
        let joined = ready!(Pin::new(&mut self.task).poll(cx));
        self.terminated = true;
        Poll::Ready(match joined {
            Ok(result) => result,
            Err(error) if error.is_cancelled() => Err(ResponseError::Canceled { url: self.url.clone() }.into()),
            Err(error) => Err(TransportError::Aborted(error.to_string()).into()),
        })
    }
}

impl<T: ResponseBody> FusedFuture for Exchange<T> {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<T> Drop for Exchange<T> {
    fn drop(&mut self) {
        if !self.terminated {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::{self, BoxFuture};
    use futures::StreamExt;
    use serde_json::{Map, Value};

    use super::*;
    use crate::decoder::{BodyKind, Decoded, ResponseDecoder};
    use crate::delivery::Inline;
    use crate::http::{HeaderFields, WireRequest};

    struct Canned {
        status: u16,
        body: &'static [u8],
    }

    impl Network for Canned {
        fn send(
            &self,
            request: WireRequest,
            _challenges: Arc<dyn ChallengeHandler>,
        ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
            let raw = RawResponse {
                status_code: self.status,
                headers: HeaderFields::new(),
                body: self.body.to_vec(),
                url: Some(request.url),
            };
            Box::pin(future::ready(Ok(raw)))
        }
    }

    struct Stalled;

    impl Network for Stalled {
        fn send(
            &self,
            _request: WireRequest,
            _challenges: Arc<dyn ChallengeHandler>,
        ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
            Box::pin(future::pending())
        }
    }

    fn client<N: Network>(network: N) -> HttpClient {
        HttpClient::builder().network(network).delivery(Inline).build().unwrap()
    }

    struct Exploding;

    impl ResponseDecoder for Exploding {
        fn kinds(&self) -> &'static [BodyKind] {
            &[BodyKind::Text]
        }

        fn decode(&self, _kind: BodyKind, _data: &[u8]) -> Option<Decoded> {
            panic!("decoder exploded");
        }
    }

    fn exploding_client() -> HttpClient {
        HttpClient::builder()
            .network(Canned { status: 200, body: b"boom" })
            .decoders(DecoderChain::new().with(Exploding))
            .delivery(Inline)
            .build()
            .unwrap()
    }

    fn is_aborted_by_decoder<T>(result: &HttpResult<T>) -> bool {
        matches!(result, Err(HttpError::Transport(TransportError::Aborted(message))) if message == "decoder exploded")
    }

    #[tokio::test]
    async fn future_shape_decodes_and_empties_pool() {
        let client = client(Canned {
            status: 200,
            body: br#"{"ok":true}"#,
        });
        let response = client.get::<Map<String, Value>>("http://local.test/ok").await.unwrap();
        assert_eq!(response.body_object().unwrap()["ok"], true);
        assert_eq!(response.url(), Some("http://local.test/ok"));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn non_success_status_is_classified() {
        let client = client(Canned { status: 404, body: b"" });
        let error = client.get::<()>("http://local.test/missing").await.unwrap_err();
        assert!(matches!(error, HttpError::Response(ResponseError::NotFound(_))));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn canceling_surfaces_the_canceled_variant() {
        let client = client(Stalled);
        let exchange = client.get::<()>("http://local.test/slow");
        exchange.cancel();
        let error = exchange.await.unwrap_err();
        assert!(error.is_canceled());
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn dropping_an_exchange_releases_its_pool_entry() {
        let client = client(Stalled);
        let exchange = client.get::<()>("http://local.test/slow");
        tokio::task::yield_now().await;
        drop(exchange);
        for _ in 0..100 {
            if client.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn stream_yields_exactly_one_item() {
        let client = client(Canned { status: 200, body: b"hi" });
        let items: Vec<_> = client.get::<String>("http://local.test/text").into_stream().collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().body_object().map(String::as_str), Some("hi"));
    }

    #[tokio::test]
    async fn blocking_inside_current_thread_runtime_is_refused() {
        let client = client(Canned { status: 200, body: b"" });
        let error = client.get_blocking::<()>("http://local.test/ok").unwrap_err();
        assert!(matches!(error, HttpError::Transport(TransportError::BlockingWouldDeadlock)));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_inside_multi_thread_runtime_completes() {
        let client = client(Canned { status: 200, body: b"done" });
        let response = client.get_blocking::<String>("http://local.test/ok").unwrap();
        assert_eq!(response.body_object().map(String::as_str), Some("done"));
    }

    #[test]
    fn blocking_outside_a_runtime_uses_a_private_one() {
        let client = client(Canned { status: 201, body: b"" });
        let response = client.get_blocking::<()>("http://local.test/created").unwrap();
        assert_eq!(response.status_code(), 201);
        assert_eq!(client.in_flight(), 0);
    }

    #[test]
    fn blocking_cancel_from_another_thread() {
        let client = client(Stalled);
        let cancel = CancelHandle::new();
        let canceler = cancel.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceler.cancel();
        });
        let error = client
            .execute_blocking_with::<()>(Request::get("http://local.test/slow"), &cancel)
            .unwrap_err();
        thread.join().unwrap();
        assert!(error.is_canceled());
        assert_eq!(client.in_flight(), 0);
    }

    #[test]
    fn callback_runs_on_the_pumping_thread() {
        let (queue, pump) = DeliveryQueue::manual();
        let client = HttpClient::builder()
            .network(Canned {
                status: 503,
                body: b"",
            })
            .delivery(queue)
            .build()
            .unwrap();
        let (sender, receiver) = mpsc::channel();
        let pool = Arc::clone(client.pool());
        client.get_with_callback::<(), _>("http://local.test/down", move |result| {
            sender.send((result, pool.len(), std::thread::current().id())).unwrap();
        });

        assert!(pump.run_next(Duration::from_secs(5)));
        let (result, in_flight, thread) = receiver.recv().unwrap();
        assert!(matches!(
            result,
            Err(HttpError::Response(ResponseError::ServiceNotAvailable(_)))
        ));
        assert_eq!(in_flight, 0);
        assert_eq!(thread, std::thread::current().id());
    }

    #[test]
    fn callback_still_runs_when_the_exchange_panics() {
        let client = exploding_client();
        let (sender, receiver) = mpsc::channel();
        let pool = Arc::clone(client.pool());
        client.get_with_callback::<String, _>("http://local.test/text", move |result| {
            sender.send((is_aborted_by_decoder(&result), pool.len())).unwrap();
        });

        let (aborted, in_flight) = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(aborted);
        assert_eq!(in_flight, 0);
    }

    #[test]
    fn blocking_reports_a_panicking_exchange_as_aborted() {
        let client = exploding_client();
        let result = client.get_blocking::<String>("http://local.test/text");
        assert!(is_aborted_by_decoder(&result));
        assert_eq!(client.in_flight(), 0);
    }
}
