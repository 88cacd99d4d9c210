//! Demo binary exercising the cache component end-to-end against a running
//! `object-store` instance. Not a FUSE mount — translating kernel requests
//! into `cache::component::Component` calls is the front-end's job and out
//! of scope for this crate, the same way the teacher's `main.rs` only
//! wired together its own filesystem and left argument parsing minimal.

use cache::cache::Cache;
use cache::component::{Component, CreateFileOptions, WriteFileOptions};
use cache::config::Config;
use clap::Parser;
use remote_store::HttpRemoteStore;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(about = "Exercises the local file cache against an object-store backend")]
struct Args {
    /// Local temp-root directory backing the shadow files.
    #[arg(long)]
    tmp_path: String,

    /// Base URL of the object-store backend.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    remote_url: String,

    /// Eviction policy: lru | lfu.
    #[arg(long, default_value = "lru")]
    policy: String,

    /// Logical path to create, write to, and flush as a smoke test.
    #[arg(long, default_value = "/hello.txt")]
    demo_path: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "cache_cli=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::default();
    config.tmp_path = args.tmp_path;
    config.policy = args.policy;

    let remote = Arc::new(HttpRemoteStore::new(args.remote_url));
    let cache = Cache::new(config.clone(), remote);

    if let Err(e) = cache.configure(config).await {
        eprintln!("configure failed: {e}");
        std::process::exit(1);
    }
    if let Err(e) = cache.start().await {
        eprintln!("start failed: {e}");
        std::process::exit(1);
    }

    let result = run_demo(&cache, &args.demo_path).await;

    if let Err(e) = cache.stop().await {
        eprintln!("stop failed: {e}");
    }

    if let Err(e) = result {
        eprintln!("demo failed: {e}");
        std::process::exit(1);
    }
}

async fn run_demo(cache: &Cache, path: &str) -> cache::error::Result<()> {
    let handle = cache
        .create_file(CreateFileOptions {
            name: path.to_string(),
            mode: 0o644,
        })
        .await?;

    cache
        .write_file(WriteFileOptions {
            handle,
            offset: 0,
            data: b"hello from cache-cli\n".to_vec(),
        })
        .await?;

    cache.flush_file(handle).await?;
    cache.close_file(handle).await?;

    tracing::info!(path, "wrote and flushed demo file");
    Ok(())
}
