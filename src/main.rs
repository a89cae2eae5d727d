use intelparser::cli;

#[tokio::main]
async fn main() {
    let args = cli::parse_args();

    let default_filter = if args.debug_log {
        "debug,intelparser=debug"
    } else {
        "info,intelparser=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = cli::dispatch(args).await {
        tracing::error!(error = %err, "intelparser failed");
        std::process::exit(err.exit_code());
    }
}
