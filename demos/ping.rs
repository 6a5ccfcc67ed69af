//! Ping server - simple query and procedure example.
//!
//! This example demonstrates:
//! - Loading lexicon documents and building a server with the fluent API
//! - Registering a bare handler and a typed handler
//! - Gating a method behind a bearer-token verifier
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=xrpc_server=debug cargo run --example ping
//!
//! curl 'http://127.0.0.1:2583/xrpc/io.example.ping?message=hi'
//! curl -X POST -H 'content-type: application/json' \
//!      -H 'authorization: Bearer letmein' \
//!      -d '{"text":"hello"}' http://127.0.0.1:2583/xrpc/io.example.createPost
//! ```

use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use xrpc_server::{
    AuthContext, AuthResult, ErrorResult, HandlerContext, HandlerOutput, LexiconDoc,
    MethodConfig, XrpcServerBuilder,
};

const LEXICONS: &str = r#"[
    {
        "lexicon": 1,
        "id": "io.example.ping",
        "defs": {
            "main": {
                "type": "query",
                "parameters": {
                    "type": "params",
                    "properties": { "message": { "type": "string", "maxLength": 64 } }
                },
                "output": {
                    "encoding": "application/json",
                    "schema": {
                        "type": "object",
                        "required": ["message"],
                        "properties": { "message": { "type": "string" } }
                    }
                }
            }
        }
    },
    {
        "lexicon": 1,
        "id": "io.example.createPost",
        "defs": {
            "main": {
                "type": "procedure",
                "input": {
                    "encoding": "application/json",
                    "schema": {
                        "type": "object",
                        "required": ["text"],
                        "properties": { "text": { "type": "string", "maxLength": 300 } }
                    }
                },
                "output": {
                    "encoding": "application/json",
                    "schema": {
                        "type": "object",
                        "required": ["uri"],
                        "properties": { "uri": { "type": "string" } }
                    }
                }
            }
        }
    }
]"#;

/// Input structure for the createPost method.
#[derive(Deserialize, Debug)]
struct NewPost {
    text: String,
}

#[derive(Deserialize, Debug)]
struct NoParams {}

async fn bearer(ctx: AuthContext) -> Result<AuthResult, xrpc_server::HandlerError> {
    match ctx.bearer_token() {
        Some("letmein") => Ok(AuthResult::new("did:example:alice".to_string())),
        _ => Err(ErrorResult::new(401)
            .with_error("AuthMissing")
            .with_message("Authentication Required")
            .into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let docs: Vec<LexiconDoc> = serde_json::from_str(LEXICONS)?;

    let server = XrpcServerBuilder::new(docs)?
        .handler("io.example.ping", |ctx: HandlerContext| async move {
            let message = ctx.params().get("message").unwrap_or("pong").to_string();
            Ok(HandlerOutput::json(json!({ "message": message })))
        })
        .method(
            "io.example.createPost",
            MethodConfig::typed(|_params: NoParams, post: NewPost, ctx: HandlerContext| async move {
                let author = ctx
                    .auth()
                    .and_then(|auth| auth.credentials::<String>())
                    .cloned()
                    .unwrap_or_default();
                tracing::info!("{} posted {} bytes", author, post.text.len());
                Ok(HandlerOutput::json(json!({ "uri": format!("at://{author}/post/1") })))
            })
            .with_auth(bearer),
        )
        .build();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:2583").await?;
    tracing::info!("Serving {:?} on {}", server.methods(), listener.local_addr()?);
    axum::serve(listener, server.router()).await?;

    Ok(())
}
