use hlrcon::{client::Client, server::MockServer, transport::UdpConnector};
use log::{error, info, LevelFilter, Metadata, Record};
use std::error::Error;
use tokio::signal;

const ADDRESS: &str = "127.0.0.1:27015";
const PASSWORD: &str = "p455w0rd";

/// Prints everything from this crate down to `trace`, other crates from `info`.
struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let limit = if metadata.target().starts_with("hlrcon") {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        };
        metadata.level() <= limit
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{:<5} {} - {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SimpleLogger = SimpleLogger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }

    let (addr, server) = MockServer::new(PASSWORD).start(ADDRESS).await?;
    info!("accepting rcon on {} with password {:?}", addr, PASSWORD);

    // talk to ourselves once so the client side shows up in the log
    let client = Client::connect(&addr.to_string(), PASSWORD, true, &UdpConnector).await?;
    match client.validate_credentials().await {
        Ok(()) => info!("self check passed"),
        Err(e) => error!("self check failed: {}", e),
    }
    client.disconnect().await?;

    tokio::select!(
        _ = server => {}
        _ = signal::ctrl_c() => {}
    );

    info!("bye");
    Ok(())
}
