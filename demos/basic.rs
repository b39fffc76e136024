//! Minimal strata example: a pie endpoint behind a logger, a deadline and a
//! header stamper.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/pies/42
//!   curl -i http://localhost:3000/pies/slow     # 504 after 2 s
//!   curl -i http://localhost:3000/nope          # 404, body in the access log

use std::time::Duration;

use http::StatusCode;
use strata::middleware::{error_logger, on_timeout, TracingSink};
use strata::{Chain, Middleware, Server, handler_fn, plain_fn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Context-oblivious: runs first, then the chain carries on.
    let stamp = Middleware::plain(plain_fn(|resp, _req| Box::pin(async move {
        resp.headers_mut().insert("x-powered-by", http::HeaderValue::from_static("strata"));
    })));

    let gateway_timeout = handler_fn(|_ctx, resp, _req| Box::pin(async move {
        resp.write_status(StatusCode::GATEWAY_TIMEOUT);
        let _ = resp.write(b"took too long\n");
    }));

    let common = Chain::new([
        error_logger(TracingSink),
        on_timeout(Duration::from_secs(2), gateway_timeout),
    ]);
    let app = common.extend([stamp]).then_fn(|ctx, resp, req| Box::pin(async move {
        let Some(id) = req.uri().path().strip_prefix("/pies/") else {
            resp.write_status(StatusCode::NOT_FOUND);
            let _ = resp.write(b"no such route\n");
            return;
        };

        // The slow pie never arrives; stop as soon as the deadline passes
        // and let the timeout fallback answer.
        let bake = if id == "slow" { Duration::from_secs(60) } else { Duration::from_millis(20) };
        tokio::select! {
            () = ctx.done() => {}
            () = tokio::time::sleep(bake) => {
                let json = http::HeaderValue::from_static("application/json");
                resp.headers_mut().insert("content-type", json);
                let _ = resp.write(format!(r#"{{"id":"{id}","filling":"apple"}}"#).as_bytes());
            }
        }
    }));

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}
