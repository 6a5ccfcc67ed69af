//! Blob server - example of pass-through output.
//!
//! This example demonstrates:
//! - Streaming a response chunk by chunk with `HandlerOutput::stream`
//! - Returning pre-encoded bytes with `HandlerOutput::buffer`
//! - Per-method payload limits
//!
//! # Running
//!
//! ```sh
//! cargo run --example blob
//!
//! curl -N 'http://127.0.0.1:2584/xrpc/io.example.countdown?from=5'
//! curl -X POST -H 'content-type: text/plain' --data-binary @notes.txt \
//!      http://127.0.0.1:2584/xrpc/io.example.echoText
//! ```

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use xrpc_server::handler::byte_stream;
use xrpc_server::{
    HandlerContext, HandlerOutput, LexiconDoc, MethodConfig, PayloadLimits, ServerConfig,
    XrpcServerBuilder,
};

const LEXICONS: &str = r#"[
    {
        "lexicon": 1,
        "id": "io.example.countdown",
        "defs": {
            "main": {
                "type": "query",
                "parameters": {
                    "type": "params",
                    "required": ["from"],
                    "properties": { "from": { "type": "integer", "minimum": 1, "maximum": 60 } }
                },
                "output": { "encoding": "text/plain" }
            }
        }
    },
    {
        "lexicon": 1,
        "id": "io.example.echoText",
        "defs": {
            "main": {
                "type": "procedure",
                "input": { "encoding": "text/plain" },
                "output": { "encoding": "application/octet-stream" }
            }
        }
    }
]"#;

#[derive(Deserialize, Debug)]
struct CountdownParams {
    from: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let docs: Vec<LexiconDoc> = serde_json::from_str(LEXICONS)?;

    let echo = MethodConfig::new(|ctx: HandlerContext| async move {
        let text = ctx
            .input()
            .and_then(|input| input.body.as_str())
            .unwrap_or_default()
            .to_uppercase();
        Ok(HandlerOutput::buffer("application/octet-stream", text))
    })
    .with_limits(PayloadLimits {
        json: 1024,
        text: 1024 * 1024,
    });

    let server = XrpcServerBuilder::new(docs)?
        .config(ServerConfig::new().text_limit(4 * 1024))
        .typed_handler(
            "io.example.countdown",
            |params: CountdownParams, _input: (), _ctx: HandlerContext| async move {
                let ticks = futures::stream::iter((1..=params.from).rev()).then(|n| async move {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    Ok::<_, std::io::Error>(Bytes::from(format!("{n}\n")))
                });
                Ok(HandlerOutput::stream("text/plain", byte_stream(ticks))
                    .with_header("cache-control", "no-store"))
            },
        )
        .method("io.example.echoText", echo)
        .build();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:2584").await?;
    tracing::info!("Serving {:?} on {}", server.methods(), listener.local_addr()?);
    axum::serve(listener, server.router()).await?;

    Ok(())
}
