use std::net::SocketAddr;

use loadr_testserver::{AppState, Behavior, TestServerOptions};
use tokio::net::TcpListener;

const USAGE: &str = "loadr-testserver\n\nUSAGE:\n  loadr-testserver [--bind 127.0.0.1:0] [--fail-all STATUS]\n\nOUTPUT:\n  Prints HTTP_URL=<url> to stdout once ready.";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut options = TestServerOptions::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:8080")
                })?;
                bind_addr = addr.parse()?;
            }
            "--fail-all" => {
                let status = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--fail-all requires a status code"))?;
                options.behavior = Behavior::FailAll(status.parse()?);
            }
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                return Ok(());
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    let app = loadr_testserver::router(AppState::new(options));

    println!("HTTP_URL=http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
