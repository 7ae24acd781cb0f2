//! brickstream-server daemon
//!
//! Usage: brickstream-server [OPTIONS]
//!
//! Options:
//!   --config <FILE>    JSON configuration file
//!   --bind <ADDR>      Listen address, overrides the config (default: 0.0.0.0:4445)
//!   --data-dir <DIR>   Dataset directory, overrides the config (default: data)

use std::path::PathBuf;

use brickstream_server::{BrickServer, ServerConfig, ServerError};

struct Args {
    config: Option<PathBuf>,
    bind: Option<String>,
    data_dir: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        config: None,
        bind: None,
        data_dir: None,
    };

    while let Some(arg) = args.next() {
        let mut value = || args.next().ok_or_else(|| format!("{} needs a value", arg));
        match arg.as_str() {
            "-c" | "--config" => parsed.config = Some(PathBuf::from(value()?)),
            "-b" | "--bind" => parsed.bind = Some(value()?),
            "-d" | "--data-dir" => parsed.data_dir = Some(PathBuf::from(value()?)),
            "-h" | "--help" => {
                println!("Usage: brickstream-server [--config FILE] [--bind ADDR] [--data-dir DIR]");
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument {}", other)),
        }
    }
    Ok(parsed)
}

async fn serve(args: Args) -> Result<(), ServerError> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if !config.data_dir.is_dir() {
        return Err(ServerError::InvalidConfig(format!(
            "data directory {} does not exist",
            config.data_dir.display()
        )));
    }

    BrickServer::bind(config).await?.run().await
}

#[tokio::main]
async fn main() {
    brickstream::core::logging::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = serve(args).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
