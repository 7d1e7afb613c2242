use hyper::{body::Bytes, server::conn::http1, service::service_fn, Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use http_body_util::Full;
use lb_core::Controller;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

/// Serve `/healthz` and `/metrics` until `stop` fires
pub async fn serve(addr: SocketAddr, controller: Controller, mut stop: watch::Receiver<bool>) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Health and metrics listening on {}", addr);

    loop {
        let (stream, peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = stop.changed() => return Ok(()),
        };
        let io = TokioIo::new(stream);
        let controller = controller.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let controller = controller.clone();
                async move { Ok::<_, hyper::Error>(handle_request(req, &controller)) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
            }
        });
    }
}

fn handle_request(req: Request<hyper::body::Incoming>, controller: &Controller) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/healthz" if controller.is_ready() => text(StatusCode::OK, "OK\n".to_string()),
        "/healthz" if controller.is_sync_disabled() => text(StatusCode::SERVICE_UNAVAILABLE, "sync disabled\n".to_string()),
        "/healthz" => text(StatusCode::SERVICE_UNAVAILABLE, "starting\n".to_string()),
        "/metrics" => match controller.metrics().gather() {
            Ok(body) => text(StatusCode::OK, body),
            Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to gather metrics: {}\n", e)),
        },
        _ => text(StatusCode::NOT_FOUND, "Not Found\n".to_string()),
    }
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert("Content-Type", hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"));
    response
}
